use crate::output::print_json;
use crate::Overrides;
use anyhow::Context;
use clap::Subcommand;
use pedimentos_core::config::{Config, WarnLevel};
use std::path::Path;

// ---------------------------------------------------------------------------
// Subcommand types
// ---------------------------------------------------------------------------

#[derive(Subcommand)]
pub enum ConfigSubcommand {
    /// Print the effective configuration (file, then flags/env)
    Show,

    /// Validate the config for common mistakes
    Validate,
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

pub fn run(
    root: &Path,
    overrides: Overrides,
    subcmd: ConfigSubcommand,
    json: bool,
) -> anyhow::Result<()> {
    let mut config = Config::load(root).context("failed to load config")?;
    overrides.apply(&mut config);
    match subcmd {
        ConfigSubcommand::Show => show(&config, json),
        ConfigSubcommand::Validate => validate(&config, json),
    }
}

fn show(config: &Config, json: bool) -> anyhow::Result<()> {
    let mut redacted = config.clone();
    if !redacted.api.token.is_empty() {
        redacted.api.token = "********".to_string();
    }
    if json {
        print_json(&redacted)
    } else {
        print!("{}", serde_yaml::to_string(&redacted)?);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// validate
// ---------------------------------------------------------------------------

fn validate(config: &Config, json: bool) -> anyhow::Result<()> {
    let warnings = config.validate();

    if json {
        let value = serde_json::json!({
            "warnings": warnings,
        });
        print_json(&value)?;
    } else if warnings.is_empty() {
        println!("Config is valid. No warnings.");
    } else {
        for w in &warnings {
            let prefix = match w.level {
                WarnLevel::Warning => "warning",
                WarnLevel::Error => "error",
            };
            println!("[{prefix}] {}", w.message);
        }
    }

    if warnings.iter().any(|w| w.level == WarnLevel::Error) {
        anyhow::bail!("config validation found errors");
    }
    Ok(())
}
