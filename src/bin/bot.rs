//! Bot worker process: answers `/stock=<code>` commands with a quote.

use anyhow::Result;
use tracing::info;

use stock_chat::config::Settings;
use stock_chat::startup::{shutdown_signal, BotProcess};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = Settings::load()?;
    stock_chat::telemetry::init_tracing("bot", settings.telemetry.json);

    info!(
        quote_source = %settings.quote.base_url,
        environment = %settings.environment,
        "Configuration loaded"
    );

    let bot = BotProcess::build(settings).await?;
    bot.run_until_stopped(shutdown_signal()).await?;

    Ok(())
}
