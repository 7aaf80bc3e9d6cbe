//! Database migrations for the memory store

use rusqlite::Connection;

use crate::error::{MemoryError, Result};

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .map_err(|e| MemoryError::store("migrate", e))?;

    let current_version: i32 = conn
        .query_row(
            "SELECT COALESCE(MAX(version), 0) FROM schema_version",
            [],
            |row| row.get(0),
        )
        .unwrap_or(0);

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

/// Initial schema (v1)
fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        -- Records table: metadata supports conjunctive filtering by
        -- kind, owners and timestamp range independent of similarity
        CREATE TABLE IF NOT EXISTS records (
            id TEXT PRIMARY KEY,
            kind TEXT NOT NULL,
            content TEXT NOT NULL,
            attributes TEXT NOT NULL DEFAULT '{}',
            importance REAL NOT NULL DEFAULT 0.5,
            created_at TEXT NOT NULL,
            has_embedding INTEGER NOT NULL DEFAULT 0,
            owner_user_id TEXT,
            owner_world_id TEXT
        );

        -- Vectors live alongside, keyed by record id; immutable once set
        CREATE TABLE IF NOT EXISTS embeddings (
            record_id TEXT PRIMARY KEY,
            embedding BLOB NOT NULL,
            model TEXT NOT NULL,
            dimensions INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            FOREIGN KEY (record_id) REFERENCES records(id) ON DELETE CASCADE
        );

        -- Queue for async embedding computation
        CREATE TABLE IF NOT EXISTS embedding_queue (
            record_id TEXT PRIMARY KEY,
            status TEXT NOT NULL DEFAULT 'pending',
            queued_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
            started_at TEXT,
            completed_at TEXT,
            error TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            FOREIGN KEY (record_id) REFERENCES records(id) ON DELETE CASCADE
        );

        CREATE INDEX IF NOT EXISTS idx_records_kind ON records(kind);
        CREATE INDEX IF NOT EXISTS idx_records_created_at ON records(created_at);
        CREATE INDEX IF NOT EXISTS idx_records_importance ON records(importance);
        CREATE INDEX IF NOT EXISTS idx_records_owner_user ON records(owner_user_id);
        CREATE INDEX IF NOT EXISTS idx_records_owner_world ON records(owner_world_id);
        CREATE INDEX IF NOT EXISTS idx_embedding_queue_status ON embedding_queue(status);

        INSERT INTO schema_version (version) VALUES (1);
        "#,
    )
    .map_err(|e| MemoryError::store("migrate v1", e))?;

    Ok(())
}
