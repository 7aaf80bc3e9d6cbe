//! Snapshot backup and restore
//!
//! Periodic snapshots of the store go to an external directory via
//! `VACUUM INTO`. Restore rebuilds from the most recent snapshot that
//! passes an integrity check; with no valid snapshot the store starts
//! empty rather than refusing to start.

use std::path::{Path, PathBuf};

use chrono::Utc;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::error::{MemoryError, Result};
use crate::store::{queries, Store, StoreConfig};

/// Backup configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Directory snapshots are written to
    pub dir: String,
    /// How many snapshots to keep; older ones are deleted after a backup
    pub retention: usize,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            dir: "backups".to_string(),
            retention: 5,
        }
    }
}

/// Manages snapshots for one store
pub struct BackupManager {
    config: BackupConfig,
}

impl BackupManager {
    pub fn new(config: BackupConfig) -> Self {
        Self { config }
    }

    /// Write a snapshot of the live store. Returns the snapshot path.
    pub fn backup(&self, store: &Store) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.config.dir)?;

        // Nanosecond timestamps sort lexicographically and never collide
        let name = format!("snapshot-{}.db", Utc::now().format("%Y%m%dT%H%M%S%f"));
        let path = Path::new(&self.config.dir).join(name);

        store.with_connection(|conn| {
            conn.execute(
                "VACUUM INTO ?",
                [path.to_string_lossy().to_string()],
            )
            .map_err(|e| MemoryError::store("backup", e))?;
            Ok(())
        })?;

        self.enforce_retention()?;
        tracing::info!(path = %path.display(), "wrote store snapshot");
        Ok(path)
    }

    fn enforce_retention(&self) -> Result<()> {
        let mut snapshots = self.list_snapshots()?;
        while snapshots.len() > self.config.retention {
            // list is newest-first; pop removes the oldest
            if let Some(old) = snapshots.pop() {
                std::fs::remove_file(&old)?;
            }
        }
        Ok(())
    }

    /// Snapshot paths, newest first
    pub fn list_snapshots(&self) -> Result<Vec<PathBuf>> {
        let dir = Path::new(&self.config.dir);
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut snapshots: Vec<PathBuf> = std::fs::read_dir(dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.file_name()
                    .and_then(|n| n.to_str())
                    .map(|n| n.starts_with("snapshot-") && n.ends_with(".db"))
                    .unwrap_or(false)
            })
            .collect();

        snapshots.sort();
        snapshots.reverse();
        Ok(snapshots)
    }

    fn snapshot_is_valid(path: &Path) -> bool {
        let Ok(conn) = Connection::open_with_flags(
            path,
            rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
        ) else {
            return false;
        };

        let verdict: std::result::Result<String, _> =
            conn.query_row("PRAGMA integrity_check", [], |row| row.get(0));
        if verdict.as_deref() != Ok("ok") {
            return false;
        }

        // The snapshot must actually contain a records table
        conn.query_row("SELECT COUNT(*) FROM records", [], |row| row.get::<_, i64>(0))
            .is_ok()
    }

    /// Rebuild the live store from the newest valid snapshot. With no
    /// valid snapshot the store is emptied instead. Returns the number of
    /// records in the store afterwards.
    pub fn restore(&self, store: &Store) -> Result<usize> {
        let snapshot = self
            .list_snapshots()?
            .into_iter()
            .find(|path| Self::snapshot_is_valid(path));

        store.with_connection(|conn| {
            conn.execute_batch(
                "DELETE FROM embedding_queue;
                 DELETE FROM embeddings;
                 DELETE FROM records;",
            )
            .map_err(|e| MemoryError::store("restore", e))?;
            Ok(())
        })?;

        let Some(snapshot) = snapshot else {
            tracing::warn!("no valid snapshot found; store restored empty");
            return Ok(0);
        };

        store.with_connection(|conn| {
            conn.execute(
                "ATTACH DATABASE ? AS snap",
                [snapshot.to_string_lossy().to_string()],
            )
            .map_err(|e| MemoryError::store("restore", e))?;

            let copy = conn.execute_batch(
                "INSERT INTO records SELECT * FROM snap.records;
                 INSERT INTO embeddings SELECT * FROM snap.embeddings;",
            );
            let detach = conn.execute_batch("DETACH DATABASE snap");

            copy.and(detach)
                .map_err(|e| MemoryError::store("restore", e))?;

            // A record snapshotted before its vector landed would stay
            // unsearchable forever; put it back in line for embedding
            conn.execute(
                "INSERT INTO embedding_queue (record_id, status, queued_at)
                 SELECT id, 'pending', ? FROM records WHERE has_embedding = 0",
                [Utc::now().to_rfc3339()],
            )
            .map_err(|e| MemoryError::store("restore", e))?;
            Ok(())
        })?;

        let count = store.with_connection(queries::count_records)?;
        tracing::info!(snapshot = %snapshot.display(), records = count, "restored store from snapshot");
        Ok(count)
    }

    /// Open a store, recovering from corruption. A corrupt database file
    /// is moved aside, the newest valid snapshot (if any) takes its
    /// place, and the store is reopened - empty when nothing valid
    /// exists. Returns the store and whether recovery happened.
    pub fn open_with_recovery(&self, config: StoreConfig) -> Result<(Store, bool)> {
        match Store::open(config.clone()) {
            Ok(store) => Ok((store, false)),
            Err(MemoryError::StoreCorrupted { db_path, detail }) => {
                tracing::error!(db_path = %db_path, detail = %detail, "store corrupted, recovering");

                let quarantine =
                    format!("{}.corrupt-{}", db_path, Utc::now().format("%Y%m%dT%H%M%S"));
                std::fs::rename(&db_path, &quarantine)?;

                if let Some(snapshot) = self
                    .list_snapshots()?
                    .into_iter()
                    .find(|path| Self::snapshot_is_valid(path))
                {
                    std::fs::copy(&snapshot, &db_path)?;
                    tracing::info!(snapshot = %snapshot.display(), "recovered from snapshot");
                }

                let store = Store::open(config)?;
                Ok((store, true))
            }
            Err(e) => Err(e),
        }
    }
}
