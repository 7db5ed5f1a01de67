//! Bot Worker
//!
//! Answers `/stock=<code>` commands. Bot workers share the `botrequest-q`
//! work queue, look the code up in the quote source and publish the answer as
//! a bot response every gateway broadcasts.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::domain::{BotCommand, BotResult};
use crate::infrastructure::bus::{
    Ack, BusError, BusEvent, EventHandler, MessageBus, QueueSpec, RoutingKey, Subscription,
    BOT_REQUEST_QUEUE,
};
use crate::infrastructure::metrics;
use crate::infrastructure::quote::QuoteSource;

pub struct BotWorker {
    quotes: Arc<dyn QuoteSource>,
    bus: Arc<dyn MessageBus>,
}

impl BotWorker {
    pub fn new(quotes: Arc<dyn QuoteSource>, bus: Arc<dyn MessageBus>) -> Self {
        Self { quotes, bus }
    }

    async fn answer(&self, command: &BotCommand) -> Ack {
        let quote = match self.quotes.quote(&command.command).await {
            Ok(quote) => quote,
            // Unknown codes get no answer in the channel.
            Err(e) if !e.is_transient() => {
                info!(code = %command.command, channel = %command.channel, error = %e, "Unknown stock code, no answer sent");
                metrics::record_bot_quote("invalid_code");
                return Ack::Accept;
            }
            Err(e) => {
                warn!(code = %command.command, error = %e, "Quote lookup failed, will retry");
                metrics::record_bot_quote("unavailable");
                return Ack::Retry;
            }
        };

        let result = BotResult::answering(command, quote.message());
        match self.bus.publish(&BusEvent::BotResponse(result)).await {
            Ok(()) => {
                info!(symbol = %quote.symbol, channel = %command.channel, "Quote published");
                metrics::record_bot_quote("published");
                Ack::Accept
            }
            Err(e) => {
                warn!(channel = %command.channel, error = %e, "Publishing bot response failed, will retry");
                metrics::record_bot_quote("publish_failed");
                Ack::Retry
            }
        }
    }
}

#[async_trait]
impl EventHandler for BotWorker {
    async fn handle(&self, event: BusEvent) -> Ack {
        match event {
            BusEvent::BotRequest(command) => self.answer(&command).await,
            other => {
                warn!(routing_key = %other.routing_key(), "Unexpected event on bot queue");
                Ack::Accept
            }
        }
    }
}

/// Bind a bot worker to the shared `botrequest-q` work queue.
pub async fn register_bot_worker(
    bus: &dyn MessageBus,
    worker: Arc<BotWorker>,
) -> Result<Subscription, BusError> {
    bus.subscribe(
        RoutingKey::BotRequest,
        QueueSpec::work_queue(BOT_REQUEST_QUEUE),
        worker,
    )
    .await
}
