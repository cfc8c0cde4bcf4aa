//! Decision Trace Pipeline - Main Entry Point

use pipeline::{init_logging, run, Settings, CONFIG_ENV};
use std::path::PathBuf;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_path = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let settings = Settings::load(config_path.as_deref())?;
    init_logging(&settings.log_level, settings.json_logs);

    info!("=== Decision Trace Pipeline v{} ===", env!("CARGO_PKG_VERSION"));

    let report = run(&settings).await?;
    info!(
        "Pipeline finished: {} traces, {} skipped, {} recommendations",
        report.evaluated, report.skipped, report.recommendations
    );

    Ok(())
}
