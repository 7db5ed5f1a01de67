//! WebSocket Gateway
//!
//! Client connections, the local connection registry and the bus consumers
//! that fan events out to it.

pub mod fanout;
pub mod handler;
pub mod history;
pub mod ingress;
pub mod messages;
pub mod presence;
pub mod registry;
pub mod session;

pub use fanout::{register_fanout_consumers, FanoutConsumer, FANOUT_KEYS};
pub use handler::ws_handler;
pub use history::{HistoryBridge, HistoryError};
pub use ingress::IngressLoop;
pub use messages::{ChatPayload, OutboundFrame, CHANNEL_LIST_UPDATE};
pub use presence::{log_online_users, spawn_presence_logger};
pub use registry::{ConnectionClosed, ConnectionHandle, ConnectionRegistry, DeliveryReport};
pub use session::{CloseReason, ConnectionState, SessionState};
