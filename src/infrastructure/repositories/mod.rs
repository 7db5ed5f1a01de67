//! Repository Implementations
//!
//! PostgreSQL implementations of domain repository traits.
//!
//! - **PgChannelRepository** - channel names, used by the gateway's channel service
//! - **PgMessageRepository** - archived chat lines, used by the archiver

pub mod channel_repository;
pub mod message_repository;

pub use channel_repository::PgChannelRepository;
pub use message_repository::PgMessageRepository;
