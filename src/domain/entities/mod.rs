//! # Domain Entities
//!
//! Payloads that travel over the message bus and the records the archiver keeps.
//!
//! - **InboundMessage**: a chat line stamped with sender, channel and time
//! - **BotCommand** / **BotResult**: stock quote request and answer
//! - **StoredMessage**: an archived chat line served back as history
//!
//! ## Repository Traits
//!
//! Channel and message persistence are described by traits implemented in the
//! infrastructure layer.

mod channel;
mod command;
mod message;

pub use channel::{
    validate_channel_name, ChannelNameError, ChannelRepository, CHANNEL_NAME_MAX_LEN,
    CHANNEL_NAME_MIN_LEN,
};
pub use command::{parse_stock_command, BotCommand, BotResult, BOT_USERNAME};
pub use message::{InboundMessage, MessageRepository, StoredMessage};

#[cfg(test)]
pub use channel::MockChannelRepository;
#[cfg(test)]
pub use message::MockMessageRepository;
