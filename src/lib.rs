//! # Stock Chat Library
//!
//! This crate provides the real-time fan-out and event pipeline of a chat
//! platform split across three processes:
//! - **Gateway**: terminates WebSocket connections, publishes inbound messages
//!   and fans bus events out to its locally connected users
//! - **Bot worker**: answers `/stock=<code>` commands from a quote source
//! - **Archiver**: persists every message and serves recent history over RPC
//!
//! The processes never talk to each other directly; they agree on who receives
//! what through a message bus (Redis Streams in production).
//!
//! ## Architecture
//!
//! The crate follows Clean Architecture principles:
//!
//! - **Domain Layer**: Bus payloads, archive records and repository traits
//! - **Application Layer**: Channel, archive and bot services plus DTOs
//! - **Infrastructure Layer**: Message bus, database, RPC and quote clients
//! - **Presentation Layer**: HTTP handlers, connection registry and WebSocket gateway
//!
//! ## Module Structure
//!
//! ```text
//! stock_chat/
//! +-- config/         Configuration management
//! +-- domain/         Bus payloads, archive records, repository traits
//! +-- application/    Application services and DTOs
//! +-- infrastructure/ Bus, database, metrics, outbound clients
//! +-- presentation/   HTTP routes, middleware, WebSocket gateway
//! +-- shared/         Common utilities (errors)
//! ```

// Configuration module
pub mod config;

// Domain layer - Core business logic
pub mod domain;

// Application layer - Business services
pub mod application;

// Infrastructure layer - External implementations
pub mod infrastructure;

// Presentation layer - HTTP and WebSocket handlers
pub mod presentation;

// Shared utilities
pub mod shared;

// Process startup and state management
pub mod startup;

// Telemetry and observability
pub mod telemetry;
