//! Archiver process: stores every chat line from the `storage-q` work queue
//! and serves recent history to the gateways.

use anyhow::Result;
use tracing::info;

use stock_chat::config::Settings;
use stock_chat::startup::{shutdown_signal, Archiver};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    stock_chat::telemetry::init_tracing("archiver", settings.telemetry.json);

    info!(
        addr = %settings.archiver_addr(),
        environment = %settings.environment,
        "Configuration loaded"
    );

    let archiver = Archiver::build(settings).await?;
    archiver.run_until_stopped(shutdown_signal()).await?;

    Ok(())
}
