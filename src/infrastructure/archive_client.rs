//! Archive RPC client.
//!
//! The archiver serves `GetRecentMessages` as JSON over HTTP:
//! `POST {archiver.url}/rpc/GetRecentMessages` with [`RecentMessagesRequest`],
//! answered by [`RecentMessagesResponse`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::instrument;

use crate::config::ArchiverSettings;
use crate::domain::StoredMessage;

/// Path of the history RPC on the archiver.
pub const GET_RECENT_MESSAGES_PATH: &str = "/rpc/GetRecentMessages";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecentMessagesRequest {
    pub channel: String,
    pub max_messages: usize,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecentMessagesResponse {
    pub messages: Vec<StoredMessage>,
}

#[derive(Debug, thiserror::Error)]
pub enum ArchiveClientError {
    #[error("archive request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("archive answered with status {0}")]
    Status(u16),
}

/// Source of channel history.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ArchiveClient: Send + Sync {
    /// Up to `limit` most recent messages of `channel`, oldest first.
    async fn get_recent_messages(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, ArchiveClientError>;
}

/// [`ArchiveClient`] talking to the archiver over HTTP.
#[derive(Clone)]
pub struct HttpArchiveClient {
    client: reqwest::Client,
    base_url: String,
}

impl HttpArchiveClient {
    pub fn new(settings: &ArchiverSettings) -> Result<Self, ArchiveClientError> {
        let client = reqwest::Client::builder()
            .timeout(settings.timeout())
            .build()?;
        Ok(Self {
            client,
            base_url: settings.url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl ArchiveClient for HttpArchiveClient {
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    async fn get_recent_messages(
        &self,
        channel: &str,
        limit: usize,
    ) -> Result<Vec<StoredMessage>, ArchiveClientError> {
        let request = RecentMessagesRequest {
            channel: channel.to_string(),
            max_messages: limit,
        };

        let response = self
            .client
            .post(format!("{}{}", self.base_url, GET_RECENT_MESSAGES_PATH))
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ArchiveClientError::Status(response.status().as_u16()));
        }

        let body = response.json::<RecentMessagesResponse>().await?;
        Ok(body.messages)
    }
}
