//! Database connection management
//!
//! A single explicitly constructed store handle replaces any process-wide
//! connection state. All mutation is serialized through the connection
//! mutex; concurrent writers to the same id resolve last-write-wins.

use parking_lot::Mutex;
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::migrations::run_migrations;
use crate::error::{MemoryError, Result};

/// Similarity store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Database path, or ":memory:" for tests
    pub db_path: String,
    /// Fixed vector dimensionality for this deployment
    pub dimensions: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: ":memory:".to_string(),
            dimensions: 384,
        }
    }
}

/// Storage engine wrapping SQLite
pub struct Store {
    config: StoreConfig,
    conn: Arc<Mutex<Connection>>,
}

impl Store {
    /// Open or create a database. Corruption is detected here, at open
    /// time, and surfaces as `StoreCorrupted` - never as partial results.
    pub fn open(config: StoreConfig) -> Result<Self> {
        let conn = Self::create_connection(&config)?;
        Self::verify_integrity(&conn, &config.db_path)?;
        run_migrations(&conn)?;

        Ok(Self {
            config,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory store (useful for testing)
    pub fn open_in_memory() -> Result<Self> {
        Self::open(StoreConfig::default())
    }

    fn create_connection(config: &StoreConfig) -> Result<Connection> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let conn = if config.db_path == ":memory:" {
            Connection::open_in_memory()
                .map_err(|e| MemoryError::store("open", e))?
        } else {
            if let Some(parent) = Path::new(&config.db_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open_with_flags(&config.db_path, flags)
                .map_err(|e| Self::classify_open_error(&config.db_path, e))?
        };

        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            PRAGMA synchronous=NORMAL;
            PRAGMA busy_timeout=30000;
            PRAGMA cache_size=-32000;
            PRAGMA temp_store=MEMORY;
            PRAGMA foreign_keys=ON;
            "#,
        )
        .map_err(|e| Self::classify_open_error(&config.db_path, e))?;

        Ok(conn)
    }

    /// An unreadable file is corruption, not unavailability
    fn classify_open_error(db_path: &str, e: rusqlite::Error) -> MemoryError {
        if let rusqlite::Error::SqliteFailure(err, ref msg) = e {
            if matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseCorrupt | rusqlite::ErrorCode::NotADatabase
            ) {
                return MemoryError::StoreCorrupted {
                    db_path: db_path.to_string(),
                    detail: msg.clone().unwrap_or_else(|| err.to_string()),
                };
            }
        }
        MemoryError::store("open", e)
    }

    fn verify_integrity(conn: &Connection, db_path: &str) -> Result<()> {
        let verdict: String = conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))
            .map_err(|e| Self::classify_open_error(db_path, e))?;

        if verdict != "ok" {
            return Err(MemoryError::StoreCorrupted {
                db_path: db_path.to_string(),
                detail: verdict,
            });
        }
        Ok(())
    }

    /// Execute a function with the connection
    pub fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a function inside a transaction
    pub fn with_transaction<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let tx = conn
            .transaction()
            .map_err(|e| MemoryError::store("begin transaction", e))?;
        let result = f(&tx)?;
        tx.commit()
            .map_err(|e| MemoryError::store("commit", e))?;
        Ok(result)
    }

    pub fn db_path(&self) -> &str {
        &self.config.db_path
    }

    pub fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Cheap liveness probe for health checks
    pub fn ping(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| MemoryError::store("ping", e))?;
            Ok(())
        })
    }

    /// Checkpoint the WAL file
    pub fn checkpoint(&self) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")
                .map_err(|e| MemoryError::store("checkpoint", e))?;
            Ok(())
        })
    }
}

impl Clone for Store {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            conn: self.conn.clone(),
        }
    }
}
