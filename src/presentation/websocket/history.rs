//! History Bridge
//!
//! Fetches recent channel history from the archiver when a user joins and
//! writes it to that user's connection as one frame.

use std::sync::Arc;

use tokio::task::JoinHandle;

use super::messages::{ChatPayload, OutboundFrame};
use super::registry::{ConnectionClosed, ConnectionRegistry};
use crate::infrastructure::archive_client::{ArchiveClient, ArchiveClientError};

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error(transparent)]
    Archive(#[from] ArchiveClientError),

    #[error("user {user} is not connected to {channel}")]
    NotConnected { channel: String, user: String },

    #[error(transparent)]
    Closed(#[from] ConnectionClosed),
}

#[derive(Clone)]
pub struct HistoryBridge {
    archive: Arc<dyn ArchiveClient>,
    registry: Arc<ConnectionRegistry>,
    limit: usize,
}

impl HistoryBridge {
    pub fn new(
        archive: Arc<dyn ArchiveClient>,
        registry: Arc<ConnectionRegistry>,
        limit: usize,
    ) -> Self {
        Self {
            archive,
            registry,
            limit,
        }
    }

    /// Send the history of `channel` to `user`. Returns the number of
    /// messages sent.
    ///
    /// The connection is looked up after the fetch, so a reconnect during the
    /// fetch receives the history on its new connection.
    pub async fn deliver(&self, channel: &str, user: &str) -> Result<usize, HistoryError> {
        let messages = self.archive.get_recent_messages(channel, self.limit).await?;

        let handle = self
            .registry
            .lookup(channel, user)
            .ok_or_else(|| HistoryError::NotConnected {
                channel: channel.to_string(),
                user: user.to_string(),
            })?;

        let count = messages.len();
        let payloads = messages.iter().map(ChatPayload::from).collect();
        handle.send(OutboundFrame::History(payloads))?;
        Ok(count)
    }

    /// Run [`deliver`](Self::deliver) in the background. Failures are logged
    /// and never affect the connection.
    pub fn spawn(&self, channel: String, user: String) -> JoinHandle<()> {
        let bridge = self.clone();
        tokio::spawn(async move {
            match bridge.deliver(&channel, &user).await {
                Ok(count) => {
                    tracing::debug!(channel = %channel, user = %user, count, "History delivered")
                }
                Err(e) => {
                    tracing::warn!(channel = %channel, user = %user, error = %e, "History unavailable")
                }
            }
        })
    }
}
