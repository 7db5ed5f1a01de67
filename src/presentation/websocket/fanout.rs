//! Fan-out Consumers
//!
//! Broadcast subscriptions that turn bus events into writes on the local
//! connections of this gateway. Every gateway process runs its own set, so
//! every process sees every event.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::messages::{ChatPayload, OutboundFrame};
use super::registry::ConnectionRegistry;
use crate::application::services::ChannelService;
use crate::infrastructure::bus::{
    Ack, BusError, BusEvent, EventHandler, MessageBus, QueueSpec, RoutingKey, Subscription,
};

/// Routing keys the gateway fans out to its clients.
pub const FANOUT_KEYS: [RoutingKey; 3] = [
    RoutingKey::UserMessage,
    RoutingKey::BotResponse,
    RoutingKey::ChannelsUpdated,
];

pub struct FanoutConsumer {
    registry: Arc<ConnectionRegistry>,
    channels: Arc<dyn ChannelService>,
}

impl FanoutConsumer {
    pub fn new(registry: Arc<ConnectionRegistry>, channels: Arc<dyn ChannelService>) -> Self {
        Self { registry, channels }
    }

    /// Write a chat line to every local connection of `channel`.
    ///
    /// A channel with no local entry is not an error: another gateway serves it.
    fn deliver(&self, channel: &str, payload: ChatPayload) -> Ack {
        match self.registry.broadcast(channel, &OutboundFrame::Chat(payload)) {
            Some(report) => {
                debug!(
                    channel = %channel,
                    delivered = report.delivered,
                    failed = report.failed,
                    "Message fanned out"
                );
            }
            None => debug!(channel = %channel, "No local listeners"),
        }
        Ack::Accept
    }

    async fn refresh_channels(&self) -> Ack {
        let channels = match self.channels.list_channels().await {
            Ok(channels) => channels,
            Err(e) => {
                warn!(error = %e, "Cannot fetch channel list, will retry");
                return Ack::Retry;
            }
        };

        let added = channels
            .iter()
            .filter(|name| self.registry.add_channel(name))
            .count();
        let report = self.registry.broadcast_all(&OutboundFrame::ChannelListChanged);
        debug!(
            channels = channels.len(),
            added,
            notified = report.delivered,
            "Channel list refreshed"
        );
        Ack::Accept
    }
}

#[async_trait]
impl EventHandler for FanoutConsumer {
    async fn handle(&self, event: BusEvent) -> Ack {
        match event {
            BusEvent::UserMessage(message) => {
                self.deliver(message.channel(), ChatPayload::from(&message))
            }
            BusEvent::BotResponse(result) => self.deliver(&result.channel, ChatPayload::from(&result)),
            BusEvent::ChannelsUpdated => self.refresh_channels().await,
            BusEvent::BotRequest(_) => {
                warn!("Bot request reached a fan-out consumer, ignoring");
                Ack::Accept
            }
        }
    }
}

/// Subscribe one broadcast queue per fan-out routing key.
pub async fn register_fanout_consumers(
    bus: &dyn MessageBus,
    consumer: Arc<FanoutConsumer>,
) -> Result<Vec<Subscription>, BusError> {
    let mut subscriptions = Vec::with_capacity(FANOUT_KEYS.len());
    for key in FANOUT_KEYS {
        let handler: Arc<dyn EventHandler> = consumer.clone();
        subscriptions.push(bus.subscribe(key, QueueSpec::Broadcast, handler).await?);
    }
    Ok(subscriptions)
}
