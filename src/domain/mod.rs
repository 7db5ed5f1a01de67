//! # Domain Layer
//!
//! The domain layer holds the data that flows through the pipeline and the
//! contracts for persisting it. It is independent of the bus, database and
//! transport implementations.
//!
//! ## Design Principles
//!
//! - No dependencies on infrastructure or presentation layers
//! - Bus payloads keep their wire field names stable
//! - Repository traits define data access contracts

pub mod entities;

// Re-export commonly used types
pub use entities::*;
