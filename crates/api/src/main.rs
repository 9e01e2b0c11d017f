//! Rice Leaf Disease Detection API - Main Entry Point

use anyhow::Context;
use api::{init_logging, run_server, ServiceConfig};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = ServiceConfig::load().context("failed to load configuration")?;
    init_logging(config.log_format)
        .map_err(|e| anyhow::anyhow!("failed to initialise logging: {}", e))?;

    info!("=== Rice Leaf Disease Detection API v{} ===", env!("CARGO_PKG_VERSION"));
    info!("Model path: {}", config.model_path.display());
    info!("Port: {}", config.port);
    info!("Preprocessing: {}", config.preprocessing);

    run_server(config).await
}
