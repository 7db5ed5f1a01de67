//! Archive RPC Handler
//!
//! Serves `GetRecentMessages` for the gateways' history bridge.

use axum::{extract::State, Json};

use crate::application::services::ArchiveError;
use crate::infrastructure::archive_client::{RecentMessagesRequest, RecentMessagesResponse};
use crate::shared::error::AppError;
use crate::startup::ArchiverState;

impl From<ArchiveError> for AppError {
    fn from(error: ArchiveError) -> Self {
        match error {
            ArchiveError::Storage(e) => e,
        }
    }
}

/// `POST /rpc/GetRecentMessages`
pub async fn get_recent_messages(
    State(state): State<ArchiverState>,
    Json(request): Json<RecentMessagesRequest>,
) -> Result<Json<RecentMessagesResponse>, AppError> {
    let messages = state
        .archive
        .recent(&request.channel, request.max_messages)
        .await?;

    tracing::debug!(
        channel = %request.channel,
        requested = request.max_messages,
        returned = messages.len(),
        "History served"
    );
    Ok(Json(RecentMessagesResponse { messages }))
}
