//! # Stock Chat Gateway
//!
//! Entry point of the gateway process. It initializes:
//! - Configuration loading
//! - Tracing/logging subsystem
//! - Database pool (channel list) and message bus
//! - Fan-out consumers and the presence logger
//! - HTTP/WebSocket server

use anyhow::Result;
use tracing::info;

use stock_chat::config::Settings;
use stock_chat::startup::{shutdown_signal, Gateway};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    stock_chat::telemetry::init_tracing("gateway", settings.telemetry.json);

    info!(
        addr = %settings.server_addr(),
        archiver = %settings.archiver.url,
        environment = %settings.environment,
        "Configuration loaded"
    );

    let gateway = Gateway::build(settings).await?;

    info!("Gateway ready to accept connections");
    gateway.run_until_stopped(shutdown_signal()).await?;

    Ok(())
}
