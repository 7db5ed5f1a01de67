//! WebSocket Connection Handler
//!
//! Upgrades `GET /ws/{channel}` and runs one connection: a writer task that
//! drains the connection's outbound queue, history delivery, and the ingress
//! loop reading client frames until the connection closes.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::Response,
};
use futures::{stream::SplitSink, SinkExt, StreamExt};
use tokio::sync::mpsc;

use super::ingress::IngressLoop;
use super::messages::OutboundFrame;
use super::registry::ConnectionHandle;
use super::session::CloseReason;
use crate::domain::validate_channel_name;
use crate::presentation::middleware::AuthUser;
use crate::shared::error::AppError;
use crate::startup::AppState;

/// WebSocket upgrade handler
pub async fn ws_handler(
    user: AuthUser,
    Path(channel): Path<String>,
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Result<Response, AppError> {
    validate_channel_name(&channel).map_err(|e| AppError::Validation(e.to_string()))?;

    let limits = &state.settings.websocket;
    let ws = ws
        .max_message_size(limits.max_message_size)
        .max_frame_size(limits.max_frame_size);

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, channel, user.username)))
}

/// Forward queued frames to the socket until the queue closes, a write fails
/// or a close frame has been sent.
async fn write_frames(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<OutboundFrame>,
) {
    while let Some(frame) = rx.recv().await {
        let message = match frame.to_message() {
            Ok(message) => message,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize frame");
                continue;
            }
        };
        let closing = matches!(message, Message::Close(_));
        if sink.send(message).await.is_err() || closing {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn handle_socket(socket: WebSocket, state: AppState, channel: String, username: String) {
    let (sink, mut stream) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel();
    let handle = ConnectionHandle::new(tx);
    let connection_id = handle.id();

    let mut writer = tokio::spawn(write_frames(sink, rx));

    state.registry.join(&channel, &username, handle);
    state.history.spawn(channel.clone(), username.clone());

    let mut ingress = IngressLoop::new(state.bus.clone(), channel.clone(), username.clone());
    let reason = tokio::select! {
        reason = ingress.run(&mut stream) => reason,
        _ = &mut writer => CloseReason::WriterClosed,
    };

    state.registry.release(&channel, &username, connection_id);
    writer.abort();

    let session = ingress.session();
    tracing::info!(
        channel = %channel,
        user = %username,
        reason = reason.as_str(),
        frames = session.frames_received(),
        connected_secs = session.connected_for().as_secs(),
        "Connection closed"
    );
}
