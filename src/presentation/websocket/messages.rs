//! WebSocket Message Types
//!
//! Frames the gateway writes to clients. Clients send plain text; every text
//! frame they send is one chat line.

use axum::extract::ws::{Message, Utf8Bytes};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{BotResult, InboundMessage, StoredMessage, BOT_USERNAME};

/// Literal text pushed to every connection when the channel list changes.
pub const CHANNEL_LIST_UPDATE: &str = "[channel_list_update]";

/// One chat line as clients see it: `{"Username", "Msg", "IsBot", "Time"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPayload {
    #[serde(rename = "Username")]
    pub username: String,
    #[serde(rename = "Msg")]
    pub msg: String,
    #[serde(rename = "IsBot")]
    pub is_bot: bool,
    #[serde(rename = "Time")]
    pub time: DateTime<Utc>,
}

impl From<&InboundMessage> for ChatPayload {
    fn from(message: &InboundMessage) -> Self {
        Self {
            username: message.username().to_string(),
            msg: message.message().to_string(),
            is_bot: false,
            time: message.time(),
        }
    }
}

impl From<&BotResult> for ChatPayload {
    fn from(result: &BotResult) -> Self {
        Self {
            username: BOT_USERNAME.to_string(),
            msg: result.generated_message.clone(),
            is_bot: true,
            time: result.time,
        }
    }
}

impl From<&StoredMessage> for ChatPayload {
    fn from(stored: &StoredMessage) -> Self {
        Self {
            username: stored.user.clone(),
            msg: stored.text.clone(),
            is_bot: false,
            time: stored.timestamp,
        }
    }
}

/// Everything the writer task of a connection can be asked to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundFrame {
    Chat(ChatPayload),
    /// Channel history, oldest first, as one JSON array
    History(Vec<ChatPayload>),
    ChannelListChanged,
    /// Close the connection; sent to a handle displaced by a reconnect
    Close,
}

impl OutboundFrame {
    /// Render as a WebSocket message.
    pub fn to_message(&self) -> Result<Message, serde_json::Error> {
        let text = match self {
            OutboundFrame::Chat(payload) => serde_json::to_string(payload)?,
            OutboundFrame::History(payloads) => serde_json::to_string(payloads)?,
            OutboundFrame::ChannelListChanged => CHANNEL_LIST_UPDATE.to_string(),
            OutboundFrame::Close => return Ok(Message::Close(None)),
        };
        Ok(Message::Text(Utf8Bytes::from(text)))
    }
}
