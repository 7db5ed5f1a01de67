//! HTTP Surface
//!
//! Routers for the gateway and archiver processes.

pub mod handlers;
pub mod routes;

pub use routes::{archiver_router, gateway_router};
