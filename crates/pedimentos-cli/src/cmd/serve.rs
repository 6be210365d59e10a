use anyhow::Context;
use pedimentos_core::Config;
use std::path::Path;

use crate::Overrides;

pub fn run(
    root: &Path,
    overrides: Overrides,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    let mut config = Config::load(root).context("failed to load config")?;
    overrides.apply(&mut config);
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    for w in config.validate() {
        tracing::warn!(level = ?w.level, "{}", w.message);
    }

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(pedimentos_server::serve(root, config))
}
