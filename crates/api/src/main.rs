//! Credit Risk Scoring Service - Main Entry Point

use anyhow::Context;
use api::{init_logging, run_server, ServiceConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::load().context("failed to load service configuration")?;
    init_logging(&config.logging)
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {}", e))?;

    info!("=== Credit Risk Scoring Service v{} ===", env!("CARGO_PKG_VERSION"));

    run_server(config).await
}
