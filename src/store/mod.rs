//! Similarity store: durable records plus vectors
//!
//! SQLite-backed. Metadata filtering is evaluated conjunctively with
//! similarity; records survive process restart; corruption is detected
//! at open time.

mod connection;
mod filter;
mod migrations;
pub mod queries;

pub use connection::{Store, StoreConfig};
pub use filter::FilterSql;
pub use migrations::{run_migrations, SCHEMA_VERSION};
