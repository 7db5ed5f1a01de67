//! Middleware
//!
//! Tower middleware for request processing.

pub mod auth;
pub mod cors;
pub mod logging;

pub use auth::{issue_token, AuthUser, Claims, JwtVerifier, TOKEN_COOKIE};
pub use cors::create_cors_layer;
pub use logging::{create_trace_layer, track_http_metrics};
