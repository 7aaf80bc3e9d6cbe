//! Reverie - long-term semantic memory for conversational agents
//!
//! Persists typed memory records with embeddings in SQLite, scores their
//! importance, and serves relevance-ranked retrieval with graceful
//! degradation when subsystems fail.

pub mod backup;
pub mod degradation;
pub mod embedding;
pub mod error;
pub mod lifecycle;
pub mod retrieval;
pub mod scoring;
pub mod service;
pub mod store;
pub mod types;

pub use error::{MemoryError, Result};
pub use service::{HealthReport, MemoryService, ServiceConfig};
pub use store::Store;
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
