//! Message Bus Module
//!
//! Topic-routed publish/subscribe between the gateway, bot and archiver
//! processes.
//!
//! This module provides:
//! - The [`MessageBus`] trait: publish a [`BusEvent`], subscribe a handler to a
//!   [`RoutingKey`] with a [`QueueSpec`]
//! - [`RedisStreamBus`]: production backend on Redis Streams
//! - [`InMemoryBus`]: single-process backend with the same delivery semantics
//! - The event codec: every routing key maps to exactly one payload schema
//!
//! # Delivery semantics
//!
//! ```text
//!                      +--> Broadcast (anonymous, auto-delete)  every gateway gets a copy
//!  publish(event) --> [routing key]
//!                      +--> WorkQueue("storage-q")              one archiver of the pool
//! ```
//!
//! Handlers answer [`Ack::Accept`] or [`Ack::Retry`]. A retried message is
//! delivered again (possibly to another consumer of a work queue) until the
//! broker's `max_deliveries` policy drops it, so handlers must tolerate
//! duplicates.

mod memory_bus;
mod redis_bus;

pub use memory_bus::InMemoryBus;
pub use redis_bus::{RedisStreamBus, BROADCAST_GROUP_PREFIX};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::domain::{BotCommand, BotResult, InboundMessage};
use crate::infrastructure::metrics;

/// Work queue the archiver's storage consumers share.
pub const STORAGE_QUEUE: &str = "storage-q";

/// Work queue the bot workers share.
pub const BOT_REQUEST_QUEUE: &str = "botrequest-q";

/// Topic tags the bus routes on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RoutingKey {
    /// Chat lines from clients
    UserMessage,
    /// Stock commands waiting for a bot worker
    BotRequest,
    /// Bot answers
    BotResponse,
    /// The channel list changed somewhere
    ChannelsUpdated,
}

impl RoutingKey {
    pub const ALL: [RoutingKey; 4] = [
        RoutingKey::UserMessage,
        RoutingKey::BotRequest,
        RoutingKey::BotResponse,
        RoutingKey::ChannelsUpdated,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoutingKey::UserMessage => "message-command",
            RoutingKey::BotRequest => "botrequest-command",
            RoutingKey::BotResponse => "botresponse-command",
            RoutingKey::ChannelsUpdated => "updatechannels-command",
        }
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a subscription's queue is bound to a routing key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueSpec {
    /// Anonymous, exclusive, auto-deleted: this consumer sees every message.
    Broadcast,
    /// Named and durable: consumers sharing the name compete for messages.
    WorkQueue(String),
}

impl QueueSpec {
    pub fn work_queue(name: impl Into<String>) -> Self {
        QueueSpec::WorkQueue(name.into())
    }

    pub fn label(&self) -> &str {
        match self {
            QueueSpec::Broadcast => "broadcast",
            QueueSpec::WorkQueue(name) => name,
        }
    }
}

/// Handler verdict for one delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Processed (or deliberately dropped); remove from the queue.
    Accept,
    /// Deliver the same message again.
    Retry,
}

impl Ack {
    pub fn as_str(&self) -> &'static str {
        match self {
            Ack::Accept => "accept",
            Ack::Retry => "retry",
        }
    }
}

/// Message bus errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum BusError {
    #[error("publish failed: {0}")]
    Publish(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("cannot decode {routing_key} payload: {reason}")]
    Decode {
        routing_key: RoutingKey,
        reason: String,
    },

    #[error("cannot encode {routing_key} payload: {reason}")]
    Encode {
        routing_key: RoutingKey,
        reason: String,
    },

    #[error("bus transport error: {0}")]
    Transport(String),
}

impl From<redis::RedisError> for BusError {
    fn from(e: redis::RedisError) -> Self {
        BusError::Transport(e.to_string())
    }
}

/// Every payload shape that travels on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BusEvent {
    UserMessage(InboundMessage),
    BotRequest(BotCommand),
    BotResponse(BotResult),
    /// Carries no body; the routing key alone is the signal.
    ChannelsUpdated,
}

impl BusEvent {
    pub fn routing_key(&self) -> RoutingKey {
        match self {
            BusEvent::UserMessage(_) => RoutingKey::UserMessage,
            BusEvent::BotRequest(_) => RoutingKey::BotRequest,
            BusEvent::BotResponse(_) => RoutingKey::BotResponse,
            BusEvent::ChannelsUpdated => RoutingKey::ChannelsUpdated,
        }
    }

    /// Serialize the payload (JSON, PascalCase field names).
    pub fn encode(&self) -> Result<Vec<u8>, BusError> {
        let encoded = match self {
            BusEvent::UserMessage(m) => serde_json::to_vec(m),
            BusEvent::BotRequest(c) => serde_json::to_vec(c),
            BusEvent::BotResponse(r) => serde_json::to_vec(r),
            BusEvent::ChannelsUpdated => Ok(Vec::new()),
        };
        encoded.map_err(|e| BusError::Encode {
            routing_key: self.routing_key(),
            reason: e.to_string(),
        })
    }

    /// Decode a payload with the one schema bound to `routing_key`.
    pub fn decode(routing_key: RoutingKey, payload: &[u8]) -> Result<Self, BusError> {
        let decode_err = |e: serde_json::Error| BusError::Decode {
            routing_key,
            reason: e.to_string(),
        };
        match routing_key {
            RoutingKey::UserMessage => serde_json::from_slice(payload)
                .map(BusEvent::UserMessage)
                .map_err(decode_err),
            RoutingKey::BotRequest => serde_json::from_slice(payload)
                .map(BusEvent::BotRequest)
                .map_err(decode_err),
            RoutingKey::BotResponse => serde_json::from_slice(payload)
                .map(BusEvent::BotResponse)
                .map_err(decode_err),
            RoutingKey::ChannelsUpdated => Ok(BusEvent::ChannelsUpdated),
        }
    }
}

/// Consumer callback bound by [`MessageBus::subscribe`].
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: BusEvent) -> Ack;
}

/// Publish/subscribe contract shared by all backends.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publish an event under its routing key. No retry is attempted here.
    async fn publish(&self, event: &BusEvent) -> Result<(), BusError>;

    /// Bind `handler` to `routing_key` through a queue described by `queue`.
    ///
    /// Queues are declared idempotently. The returned [`Subscription`] owns the
    /// consumer task.
    async fn subscribe(
        &self,
        routing_key: RoutingKey,
        queue: QueueSpec,
        handler: Arc<dyn EventHandler>,
    ) -> Result<Subscription, BusError>;
}

/// Decode and hand one delivery to a handler.
///
/// Undecodable payloads are accepted and dropped: redelivering them cannot help.
pub(crate) async fn dispatch(
    routing_key: RoutingKey,
    payload: &[u8],
    handler: &dyn EventHandler,
) -> Ack {
    let ack = match BusEvent::decode(routing_key, payload) {
        Ok(event) => handler.handle(event).await,
        Err(e) => {
            tracing::error!(routing_key = %routing_key, error = %e, "Dropping undecodable message");
            metrics::record_bus_delivery(routing_key.as_str(), "dropped");
            return Ack::Accept;
        }
    };
    metrics::record_bus_delivery(routing_key.as_str(), ack.as_str());
    ack
}

/// Best-effort cleanup run when a subscription is dropped without
/// [`Subscription::shutdown`].
pub(crate) type DropCleanup = Box<dyn FnOnce() + Send + Sync>;

/// Handle to a running consumer.
///
/// [`Subscription::shutdown`] stops it gracefully so the backend can delete
/// anonymous queues. Dropping it aborts the consumer and runs the backend's
/// drop cleanup, if any.
pub struct Subscription {
    routing_key: RoutingKey,
    queue: QueueSpec,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    on_drop: Option<DropCleanup>,
}

impl Subscription {
    pub(crate) fn new(
        routing_key: RoutingKey,
        queue: QueueSpec,
        stop: oneshot::Sender<()>,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            routing_key,
            queue,
            stop: Some(stop),
            task: Some(task),
            on_drop: None,
        }
    }

    pub(crate) fn with_drop_cleanup(mut self, cleanup: DropCleanup) -> Self {
        self.on_drop = Some(cleanup);
        self
    }

    pub fn routing_key(&self) -> RoutingKey {
        self.routing_key
    }

    pub fn queue(&self) -> &QueueSpec {
        &self.queue
    }

    /// Signal the consumer to stop and wait for it to clean up.
    pub async fn shutdown(mut self) {
        // The consumer cleans up after itself on a graceful stop.
        self.on_drop = None;
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(routing_key = %self.routing_key, error = %e, "Consumer task failed");
            }
        }
        tracing::debug!(
            routing_key = %self.routing_key,
            queue = %self.queue.label(),
            "Subscription stopped"
        );
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(cleanup) = self.on_drop.take() {
            cleanup();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("routing_key", &self.routing_key)
            .field("queue", &self.queue)
            .finish_non_exhaustive()
    }
}
