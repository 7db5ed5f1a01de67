//! Response DTOs
//!
//! Data structures for API response bodies.

use serde::Serialize;

/// Channel list response
#[derive(Debug, Serialize)]
pub struct ChannelListResponse {
    pub channels: Vec<String>,
}

/// Plain confirmation message
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}
