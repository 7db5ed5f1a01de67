//! HTTP Handlers
//!
//! Request handlers for the gateway API and the archiver RPC surface.

pub mod archive;
pub mod channel;
pub mod health;
