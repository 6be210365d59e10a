mod cmd;
mod output;
mod root;

use clap::{Args, Parser, Subcommand};
use cmd::config::ConfigSubcommand;
use pedimentos_core::Config;
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "pedimentos",
    about = "Pedimento processing service with automatic follow-up services",
    version,
    propagate_version = true
)]
struct Cli {
    /// Working root holding pedimentos.yaml (default: auto-detect from cwd)
    #[arg(long, global = true, env = "PEDIMENTOS_ROOT")]
    root: Option<PathBuf>,

    /// Output as JSON
    #[arg(long, global = true, short = 'j')]
    json: bool,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    command: Commands,
}

/// Values that take precedence over pedimentos.yaml.
#[derive(Args, Debug, Default)]
pub struct Overrides {
    /// Customs REST API base URL
    #[arg(long, global = true, env = "PEDIMENTOS_API_URL")]
    api_url: Option<String>,

    /// Token sent as `Authorization: Token <token>`
    #[arg(long, global = true, env = "PEDIMENTOS_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Base URL of the partidas/remesas/acuse endpoints
    #[arg(long, global = true, env = "PEDIMENTOS_SERVICES_URL")]
    services_url: Option<String>,

    /// URL of the pedimento-completo processor
    #[arg(long, global = true, env = "PEDIMENTOS_PROCESSOR_URL")]
    processor_url: Option<String>,
}

impl Overrides {
    pub fn apply(self, config: &mut Config) {
        if let Some(url) = self.api_url {
            config.api.base_url = url;
        }
        if let Some(token) = self.api_token {
            config.api.token = token;
        }
        if let Some(url) = self.services_url {
            config.services.base_url = url;
        }
        if let Some(url) = self.processor_url {
            config.processor.url = url;
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP service
    Serve {
        /// Address to bind
        #[arg(long, env = "PEDIMENTOS_HOST")]
        host: Option<String>,
        /// Port to listen on
        #[arg(long, env = "PEDIMENTOS_PORT")]
        port: Option<u16>,
    },

    /// Show progress of a pedimento's services
    Status {
        /// Pedimento id
        pedimento: String,
        /// Organization id
        #[arg(long)]
        organizacion: String,
    },

    /// Inspect configuration
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

fn main() {
    let cli = Cli::parse();

    let default_level = match &cli.command {
        Commands::Serve { .. } => tracing::Level::INFO,
        _ => tracing::Level::WARN,
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let root = root::resolve_root(cli.root.as_deref());

    let result = match cli.command {
        Commands::Serve { host, port } => cmd::serve::run(&root, cli.overrides, host, port),
        Commands::Status {
            pedimento,
            organizacion,
        } => cmd::status::run(&root, cli.overrides, &pedimento, &organizacion, cli.json),
        Commands::Config { subcommand } => {
            cmd::config::run(&root, cli.overrides, subcommand, cli.json)
        }
    };

    if let Err(e) = result {
        // Print the full error chain (anyhow's alternate Display)
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}
