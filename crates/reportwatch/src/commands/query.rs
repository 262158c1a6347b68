//! One-shot commands that print JSON to stdout.

use reportwatch_core::{Config, ReportService};
use serde::Serialize;
use std::path::Path;

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// List every tabular file under the root.
pub async fn list_files(service: &ReportService) -> anyhow::Result<()> {
    for file in service.list_files().await? {
        println!("{}", file);
    }
    Ok(())
}

/// Search all files, or only `files` when given.
pub async fn search(service: &ReportService, query: &str, files: &[String]) -> anyhow::Result<()> {
    let scope = (!files.is_empty()).then_some(files);
    print_json(&service.search(query, scope).await?)
}

/// Search one file.
pub async fn details(service: &ReportService, file: &str, query: &str) -> anyhow::Result<()> {
    print_json(&service.details(file, query).await?)
}

/// Show the change history of one cell.
pub async fn history(
    service: &ReportService,
    file: &str,
    row: usize,
    column: &str,
) -> anyhow::Result<()> {
    print_json(&service.history(file, row, column).await?)
}

/// Set one cell and record the change.
pub async fn edit(
    service: &ReportService,
    file: &str,
    row: usize,
    column: &str,
    value: &str,
    by: &str,
) -> anyhow::Result<()> {
    let outcome = service.edit(file, row, column, value, by).await?;
    if !outcome.audit_recorded && outcome.event.is_some() {
        eprintln!("Warning: the edit was saved but could not be recorded in the audit trail");
    }
    print_json(&outcome)
}

/// Show the effective configuration and where it came from.
pub async fn show_config(cwd: &Path) -> anyhow::Result<()> {
    let (config, sources) = Config::load(Some(cwd)).await?;

    println!("Configuration sources:");
    if sources.is_empty() {
        println!("  (none)");
    } else {
        for source in &sources {
            println!("  {}", source.display());
        }
    }
    println!();

    println!("Reports directory: {}", config.reports_dir(cwd).display());
    println!("Audit data:        {}", config.data_dir(cwd).display());
    println!();

    println!("Current configuration:");
    println!("{}", serde_json::to_string_pretty(&config)?);

    Ok(())
}
