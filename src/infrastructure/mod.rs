//! Infrastructure Layer
//!
//! Contains implementations for external services including:
//! - Message bus backends (Redis Streams, in-process)
//! - Database repositories (PostgreSQL)
//! - Archive RPC and stock quote HTTP clients
//! - Prometheus metrics

pub mod archive_client;
pub mod bus;
pub mod database;
pub mod metrics;
pub mod quote;
pub mod repositories;
