//! Application Services
//!
//! Business logic services that coordinate domain operations.
//!
//! ## Available Services
//!
//! - **ChannelService**: channel listing and creation, announces changes on the bus
//! - **ArchiveService**: message persistence and history, plus the `storage-q` consumer
//! - **BotWorker**: stock quote answers for `/stock=` commands

pub mod archive_service;
pub mod bot_service;
pub mod channel_service;

pub use archive_service::{register_storage_consumer, ArchiveError, ArchiveService, StorageConsumer};
pub use bot_service::{register_bot_worker, BotWorker};
pub use channel_service::{ChannelError, ChannelService, ChannelServiceImpl};

#[cfg(test)]
pub use channel_service::MockChannelService;
