//! Archive Service
//!
//! Persists every chat line published on the bus and serves channel history.
//! Runs in the archiver process; any number of archivers share the
//! `storage-q` work queue so each message is stored by exactly one of them
//! (modulo redelivery).

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::config::MAX_HISTORY_MESSAGES;
use crate::domain::{InboundMessage, MessageRepository, StoredMessage};
use crate::infrastructure::bus::{
    Ack, BusError, BusEvent, EventHandler, MessageBus, QueueSpec, RoutingKey, Subscription,
    STORAGE_QUEUE,
};
use crate::shared::error::AppError;

/// Archive service errors
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("storage failure: {0}")]
    Storage(#[from] AppError),
}

pub struct ArchiveService<M>
where
    M: MessageRepository + ?Sized,
{
    message_repo: Arc<M>,
}

impl<M> ArchiveService<M>
where
    M: MessageRepository + ?Sized,
{
    pub fn new(message_repo: Arc<M>) -> Self {
        Self { message_repo }
    }

    pub async fn save(&self, message: &InboundMessage) -> Result<(), ArchiveError> {
        self.message_repo.save(&StoredMessage::from(message)).await?;
        Ok(())
    }

    /// Most recent messages of a channel, oldest first. `limit` is capped at
    /// [`MAX_HISTORY_MESSAGES`].
    pub async fn recent(&self, channel: &str, limit: usize) -> Result<Vec<StoredMessage>, ArchiveError> {
        let limit = limit.min(MAX_HISTORY_MESSAGES);
        if limit == 0 {
            return Ok(Vec::new());
        }
        Ok(self.message_repo.find_recent(channel, limit).await?)
    }
}

/// Work-queue consumer storing user messages.
pub struct StorageConsumer<M>
where
    M: MessageRepository + ?Sized,
{
    service: Arc<ArchiveService<M>>,
}

impl<M> StorageConsumer<M>
where
    M: MessageRepository + ?Sized,
{
    pub fn new(service: Arc<ArchiveService<M>>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl<M> EventHandler for StorageConsumer<M>
where
    M: MessageRepository + ?Sized + 'static,
{
    async fn handle(&self, event: BusEvent) -> Ack {
        let BusEvent::UserMessage(message) = event else {
            warn!(routing_key = %event.routing_key(), "Unexpected event on storage queue");
            return Ack::Accept;
        };

        match self.service.save(&message).await {
            Ok(()) => {
                debug!(channel = %message.channel(), user = %message.username(), "Message archived");
                Ack::Accept
            }
            Err(e) => {
                warn!(channel = %message.channel(), error = %e, "Archiving failed, will retry");
                Ack::Retry
            }
        }
    }
}

/// Bind a storage consumer to the shared `storage-q` work queue.
pub async fn register_storage_consumer<M>(
    bus: &dyn MessageBus,
    service: Arc<ArchiveService<M>>,
) -> Result<Subscription, BusError>
where
    M: MessageRepository + ?Sized + 'static,
{
    bus.subscribe(
        RoutingKey::UserMessage,
        QueueSpec::work_queue(STORAGE_QUEUE),
        Arc::new(StorageConsumer::new(service)),
    )
    .await
}
