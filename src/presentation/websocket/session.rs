//! WebSocket Session State

use std::time::{Duration, Instant};

/// Why a connection stopped reading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The client sent a close frame
    ClientClosed,
    /// The transport ended without a close frame
    StreamEnded,
    ReadError(String),
    /// The write side ended: a reconnect displaced this connection or the
    /// socket stopped accepting writes
    WriterClosed,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::ClientClosed => "client_closed",
            CloseReason::StreamEnded => "stream_ended",
            CloseReason::ReadError(_) => "read_error",
            CloseReason::WriterClosed => "writer_closed",
        }
    }
}

/// Lifecycle of one connection: `Connected -> Reading -> Closed(reason)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Connected,
    Reading,
    Closed(CloseReason),
}

/// Per-connection bookkeeping owned by the ingress loop.
#[derive(Debug)]
pub struct SessionState {
    state: ConnectionState,
    frames_received: u64,
    connected_at: Instant,
}

impl SessionState {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Connected,
            frames_received: 0,
            connected_at: Instant::now(),
        }
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub fn start_reading(&mut self) {
        if self.state == ConnectionState::Connected {
            self.state = ConnectionState::Reading;
        }
    }

    pub fn record_frame(&mut self) {
        self.frames_received += 1;
    }

    /// Move to `Closed`. The first reason wins.
    pub fn close(&mut self, reason: CloseReason) -> CloseReason {
        if let ConnectionState::Closed(existing) = &self.state {
            return existing.clone();
        }
        self.state = ConnectionState::Closed(reason.clone());
        reason
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, ConnectionState::Closed(_))
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn connected_for(&self) -> Duration {
        self.connected_at.elapsed()
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::new()
    }
}
