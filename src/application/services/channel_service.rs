//! Channel Service
//!
//! Owns the authoritative channel list. Creating a channel persists it and
//! announces the change on the bus so every gateway refreshes its registry.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::domain::{validate_channel_name, ChannelNameError, ChannelRepository};
use crate::infrastructure::bus::{BusError, BusEvent, MessageBus};

/// Channel service trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelService: Send + Sync {
    /// All channel names
    async fn list_channels(&self) -> Result<Vec<String>, ChannelError>;

    /// Validate, persist and announce a new channel
    async fn create_channel(&self, name: &str) -> Result<(), ChannelError>;
}

/// Channel service errors
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error(transparent)]
    Validation(#[from] ChannelNameError),

    #[error("channel already exists")]
    AlreadyExists,

    /// The channel was saved but other gateways were not told.
    #[error("channel saved but not announced: {0}")]
    Announce(#[from] BusError),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// ChannelService implementation
pub struct ChannelServiceImpl<C>
where
    C: ChannelRepository,
{
    channel_repo: Arc<C>,
    bus: Arc<dyn MessageBus>,
}

impl<C> ChannelServiceImpl<C>
where
    C: ChannelRepository,
{
    pub fn new(channel_repo: Arc<C>, bus: Arc<dyn MessageBus>) -> Self {
        Self { channel_repo, bus }
    }
}

#[async_trait]
impl<C> ChannelService for ChannelServiceImpl<C>
where
    C: ChannelRepository + 'static,
{
    async fn list_channels(&self) -> Result<Vec<String>, ChannelError> {
        self.channel_repo
            .list()
            .await
            .map_err(|e| ChannelError::Internal(e.to_string()))
    }

    async fn create_channel(&self, name: &str) -> Result<(), ChannelError> {
        validate_channel_name(name)?;

        let exists = self
            .channel_repo
            .exists(name)
            .await
            .map_err(|e| ChannelError::Internal(e.to_string()))?;
        if exists {
            return Err(ChannelError::AlreadyExists);
        }

        // A concurrent insert of the same name loses here.
        let created = self
            .channel_repo
            .create(name)
            .await
            .map_err(|e| ChannelError::Internal(e.to_string()))?;
        if !created {
            return Err(ChannelError::AlreadyExists);
        }

        info!(channel = %name, "Channel created");
        self.bus.publish(&BusEvent::ChannelsUpdated).await?;
        Ok(())
    }
}
