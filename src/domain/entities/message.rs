//! Chat message payloads and the archive repository trait.
//!
//! `InboundMessage` is what a gateway publishes for every frame a client sends;
//! `StoredMessage` is the archived form served back as history.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::shared::error::AppError;

/// A chat line as received from a client, stamped by the gateway.
///
/// Serialized verbatim onto the bus as
/// `{"Username": .., "Channel": .., "Message": .., "Time": ..}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct InboundMessage {
    username: String,
    channel: String,
    message: String,
    time: DateTime<Utc>,
}

impl InboundMessage {
    pub fn new(
        username: impl Into<String>,
        channel: impl Into<String>,
        message: impl Into<String>,
        time: DateTime<Utc>,
    ) -> Self {
        Self {
            username: username.into(),
            channel: channel.into(),
            message: message.into(),
            time,
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn time(&self) -> DateTime<Utc> {
        self.time
    }
}

/// An archived chat line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub channel: String,
    pub user: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl From<&InboundMessage> for StoredMessage {
    fn from(message: &InboundMessage) -> Self {
        Self {
            channel: message.channel.clone(),
            user: message.username.clone(),
            text: message.message.clone(),
            timestamp: message.time,
        }
    }
}

/// Repository trait for archived messages.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MessageRepository: Send + Sync {
    /// Persist one message. Saving an identical message again is a no-op,
    /// so redeliveries never duplicate the archive.
    async fn save(&self, message: &StoredMessage) -> Result<(), AppError>;

    /// The newest `limit` messages of a channel, returned oldest first.
    async fn find_recent(&self, channel: &str, limit: usize) -> Result<Vec<StoredMessage>, AppError>;
}
