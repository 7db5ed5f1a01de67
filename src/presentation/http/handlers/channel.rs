//! Channel Handlers

use axum::{extract::State, http::StatusCode, Json};
use validator::Validate;

use crate::application::dto::{ChannelListResponse, CreateChannelRequest, MessageResponse};
use crate::application::services::ChannelError;
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::startup::AppState;

impl From<ChannelError> for AppError {
    fn from(error: ChannelError) -> Self {
        match error {
            ChannelError::Validation(e) => AppError::Validation(e.to_string()),
            ChannelError::AlreadyExists => AppError::Conflict("Channel already exists".into()),
            ChannelError::Announce(e) => AppError::Bus(e),
            ChannelError::Internal(msg) => AppError::Internal(msg),
        }
    }
}

/// List all channels
pub async fn list_channels(
    State(state): State<AppState>,
    _user: AuthUser,
) -> Result<Json<ChannelListResponse>, AppError> {
    let channels = state.channels.list_channels().await?;
    Ok(Json(ChannelListResponse { channels }))
}

/// Create a channel and announce it to every gateway
pub async fn create_channel(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<CreateChannelRequest>,
) -> Result<(StatusCode, Json<MessageResponse>), AppError> {
    body.validate()?;

    let name = body.name.as_str();
    state.channels.create_channel(name).await?;

    tracing::info!(channel = %name, user = %user.username, "Channel created");
    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new(format!("channel {name} created"))),
    ))
}
