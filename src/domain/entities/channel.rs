//! Channel naming rules and repository trait.
//!
//! Maps to the `channels` table in the database schema.

use async_trait::async_trait;

use crate::shared::error::AppError;

pub const CHANNEL_NAME_MIN_LEN: usize = 3;
pub const CHANNEL_NAME_MAX_LEN: usize = 100;

/// Reasons a proposed channel name is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChannelNameError {
    #[error("invalid channel name: needs to have at least {CHANNEL_NAME_MIN_LEN} characters")]
    TooShort,

    #[error("invalid channel name: exceed the max amount of {CHANNEL_NAME_MAX_LEN} characters")]
    TooLong,

    #[error("invalid channel name: only letters and numbers are allowed")]
    InvalidCharacters,
}

/// Channel names are 3-100 ASCII letters or digits.
pub fn validate_channel_name(name: &str) -> Result<(), ChannelNameError> {
    if name.len() < CHANNEL_NAME_MIN_LEN {
        return Err(ChannelNameError::TooShort);
    }
    if name.len() > CHANNEL_NAME_MAX_LEN {
        return Err(ChannelNameError::TooLong);
    }
    if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ChannelNameError::InvalidCharacters);
    }
    Ok(())
}

/// Repository trait for channel persistence.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChannelRepository: Send + Sync {
    /// All channel names.
    async fn list(&self) -> Result<Vec<String>, AppError>;

    /// Whether a channel with this name exists.
    async fn exists(&self, name: &str) -> Result<bool, AppError>;

    /// Insert a channel. Returns `false` if the name was already taken.
    async fn create(&self, name: &str) -> Result<bool, AppError>;
}
