//! Bot command payloads.
//!
//! A `/stock=<code>` token inside a chat line becomes a [`BotCommand`]; the bot
//! worker answers with a [`BotResult`] broadcast under the [`BOT_USERNAME`] sender.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::message::InboundMessage;

/// Sender name attached to bot results when they are broadcast.
pub const BOT_USERNAME: &str = "BOT";

/// Code is everything after `=` up to the first whitespace, case preserved.
static STOCK_COMMAND: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/stock=(\S+)").expect("stock command pattern is valid"));

/// Extract the stock code of the first `/stock=<code>` token in `text`.
pub fn parse_stock_command(text: &str) -> Option<&str> {
    STOCK_COMMAND
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map(|code| code.as_str())
}

/// Request for the bot worker, `{"Command": .., "Channel": .., "Time": ..}` on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BotCommand {
    pub command: String,
    pub channel: String,
    pub time: DateTime<Utc>,
}

impl BotCommand {
    /// Build a command when the message text carries a `/stock=` token.
    pub fn from_message(message: &InboundMessage) -> Option<Self> {
        parse_stock_command(message.message()).map(|code| Self {
            command: code.to_string(),
            channel: message.channel().to_string(),
            time: message.time(),
        })
    }
}

/// Bot answer, `{"GeneratedMessage": .., "Channel": .., "Time": ..}` on the wire.
///
/// Carries the channel and timestamp of the request it answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BotResult {
    pub generated_message: String,
    pub channel: String,
    pub time: DateTime<Utc>,
}

impl BotResult {
    pub fn answering(command: &BotCommand, generated_message: impl Into<String>) -> Self {
        Self {
            generated_message: generated_message.into(),
            channel: command.channel.clone(),
            time: command.time,
        }
    }
}
