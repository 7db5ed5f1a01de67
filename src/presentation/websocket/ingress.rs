//! Ingress Loop
//!
//! Reads frames from one client connection and turns each one into bus
//! events: always a user message, plus a bot request when the text carries a
//! `/stock=<code>` command.

use std::sync::Arc;

use axum::extract::ws::Message;
use chrono::Utc;
use futures::{Stream, StreamExt};

use super::session::{CloseReason, SessionState};
use crate::domain::{BotCommand, InboundMessage};
use crate::infrastructure::bus::{BusEvent, MessageBus};

pub struct IngressLoop {
    bus: Arc<dyn MessageBus>,
    channel: String,
    username: String,
    session: SessionState,
}

impl IngressLoop {
    pub fn new(bus: Arc<dyn MessageBus>, channel: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            bus,
            channel: channel.into(),
            username: username.into(),
            session: SessionState::new(),
        }
    }

    pub fn session(&self) -> &SessionState {
        &self.session
    }

    /// Publish the events for one chat line. Returns how many were published.
    ///
    /// Failures are logged; the caller keeps reading either way.
    pub async fn on_frame(&mut self, text: &str) -> usize {
        self.session.record_frame();
        let message = InboundMessage::new(&self.username, &self.channel, text, Utc::now());
        let command = BotCommand::from_message(&message);

        let mut published = 0;
        match self.bus.publish(&BusEvent::UserMessage(message)).await {
            Ok(()) => published += 1,
            Err(e) => tracing::error!(
                channel = %self.channel,
                user = %self.username,
                error = %e,
                "Failed to publish user message"
            ),
        }

        if let Some(command) = command {
            tracing::debug!(channel = %self.channel, code = %command.command, "Stock command detected");
            match self.bus.publish(&BusEvent::BotRequest(command)).await {
                Ok(()) => published += 1,
                Err(e) => tracing::error!(
                    channel = %self.channel,
                    user = %self.username,
                    error = %e,
                    "Failed to publish bot request"
                ),
            }
        }

        published
    }

    /// Read until the connection closes.
    pub async fn run<S>(&mut self, stream: &mut S) -> CloseReason
    where
        S: Stream<Item = Result<Message, axum::Error>> + Unpin,
    {
        self.session.start_reading();

        loop {
            let reason = match stream.next().await {
                Some(Ok(Message::Text(text))) => {
                    self.on_frame(text.as_str()).await;
                    continue;
                }
                Some(Ok(Message::Binary(bytes))) => {
                    match std::str::from_utf8(&bytes) {
                        Ok(text) => {
                            let text = text.to_owned();
                            self.on_frame(&text).await;
                        }
                        Err(_) => tracing::debug!(
                            channel = %self.channel,
                            user = %self.username,
                            "Ignoring non UTF-8 binary frame"
                        ),
                    }
                    continue;
                }
                Some(Ok(Message::Close(_))) => CloseReason::ClientClosed,
                Some(Ok(_)) => continue,
                Some(Err(e)) => CloseReason::ReadError(e.to_string()),
                None => CloseReason::StreamEnded,
            };
            return self.session.close(reason);
        }
    }
}
