use anyhow::Context;
use pedimentos_core::{Config, PedimentoKey, StatusAggregator};
use std::path::Path;

use crate::output::{print_json, print_table};
use crate::Overrides;

pub fn run(
    root: &Path,
    overrides: Overrides,
    pedimento: &str,
    organizacion: &str,
    json: bool,
) -> anyhow::Result<()> {
    let mut config = Config::load(root).context("failed to load config")?;
    overrides.apply(&mut config);

    let key = PedimentoKey::new(organizacion.trim(), pedimento.trim());
    if key.organization_id.is_empty() || key.pedimento_id.is_empty() {
        anyhow::bail!("pedimento and --organizacion must not be empty");
    }

    let registry = pedimentos_server::state::registry_from_config(root, &config)?;
    let rt = tokio::runtime::Runtime::new()?;
    let report = rt
        .block_on(StatusAggregator::new(registry).snapshot(&key, None))
        .context("failed to read service records")?;

    if json {
        return print_json(&report);
    }

    let rows: Vec<Vec<String>> = report
        .services
        .iter()
        .map(|(kind, s)| {
            vec![
                kind.clone(),
                s.estado_nombre.clone().unwrap_or_else(|| "-".to_string()),
                s.service_id.clone().unwrap_or_else(|| "-".to_string()),
            ]
        })
        .collect();
    print_table(&["SERVICE", "STATE", "ID"], &rows);

    let summary = &report.summary;
    println!();
    println!(
        "{}/{} completed ({:.2}%), {} in progress, {} failed",
        summary.completed_services,
        summary.total_services,
        summary.completion_percentage,
        summary.in_progress_services,
        summary.error_services
    );
    Ok(())
}
