//! Database queries for memory record operations

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::collections::HashMap;

use crate::error::{MemoryError, Result};
use crate::types::{MemoryFilter, MemoryRecord, RecordId};

use super::filter::FilterSql;

const RECORD_COLUMNS: &str = "id, kind, content, attributes, importance, \
     created_at, has_embedding, owner_user_id, owner_world_id";

/// Parse a memory record from a database row. Stored bytes that no
/// longer parse are reported, never papered over with defaults; see
/// [`classify_row_error`].
pub fn record_from_row(row: &Row) -> rusqlite::Result<MemoryRecord> {
    let id: String = row.get("id")?;
    let kind_str: String = row.get("kind")?;
    let content: String = row.get("content")?;
    let attributes_str: String = row.get("attributes")?;
    let importance: f32 = row.get("importance")?;
    let created_at: String = row.get("created_at")?;
    let has_embedding: i32 = row.get("has_embedding")?;
    let owner_user_id: Option<String> = row.get("owner_user_id")?;
    let owner_world_id: Option<String> = row.get("owner_world_id")?;

    let kind = kind_str
        .parse()
        .map_err(|e: String| bad_column(1, &id, e))?;
    let attributes: HashMap<String, serde_json::Value> = serde_json::from_str(&attributes_str)
        .map_err(|e| bad_column(3, &id, format!("attributes are not valid json: {}", e)))?;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| bad_column(5, &id, format!("unparseable created_at: {}", e)))?;

    Ok(MemoryRecord {
        id,
        kind,
        content,
        attributes,
        importance,
        created_at,
        has_embedding: has_embedding != 0,
        owner_user_id,
        owner_world_id,
    })
}

fn bad_column(index: usize, record_id: &str, detail: impl std::fmt::Display) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        index,
        rusqlite::types::Type::Text,
        format!("record {}: {}", record_id, detail).into(),
    )
}

/// A conversion failure inside a row means stored bytes we can no longer
/// parse. That is corruption, not unavailability, so it is never retried
/// and instead routes to restore-from-backup.
fn classify_row_error(conn: &Connection, operation: &str, e: rusqlite::Error) -> MemoryError {
    match e {
        rusqlite::Error::FromSqlConversionFailure(..) => MemoryError::StoreCorrupted {
            db_path: conn.path().unwrap_or(":memory:").to_string(),
            detail: format!("{}: {}", operation, e),
        },
        other => MemoryError::store(operation, other),
    }
}

fn encode_embedding(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

fn decode_embedding(bytes: &[u8], dimensions: usize, record_id: &str) -> Result<Vec<f32>> {
    let expected_len = dimensions.checked_mul(4).ok_or_else(|| {
        MemoryError::validation("dimensions", "embedding dimensions too large")
    })?;
    if bytes.len() != expected_len {
        return Err(MemoryError::DimensionMismatch {
            expected: dimensions,
            actual: bytes.len() / 4,
            record_id: Some(record_id.to_string()),
        });
    }

    let embedding = bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect();
    Ok(embedding)
}

fn check_dimensions(
    embedding: &[f32],
    expected: usize,
    record_id: Option<&str>,
) -> Result<()> {
    if embedding.len() != expected {
        return Err(MemoryError::DimensionMismatch {
            expected,
            actual: embedding.len(),
            record_id: record_id.map(|s| s.to_string()),
        });
    }
    Ok(())
}

/// Insert or replace a record by id. Replacing an id drops its old
/// embedding: "updating a memory" is delete + insert, never an edit.
pub fn put_record(
    conn: &Connection,
    record: &MemoryRecord,
    embedding: Option<&[f32]>,
    model: &str,
    expected_dims: usize,
) -> Result<()> {
    if let Some(vector) = embedding {
        check_dimensions(vector, expected_dims, Some(&record.id))?;
    }

    let attributes = serde_json::to_string(&record.attributes)?;

    conn.execute(
        "INSERT OR REPLACE INTO records
         (id, kind, content, attributes, importance, created_at,
          has_embedding, owner_user_id, owner_world_id)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        params![
            record.id,
            record.kind.as_str(),
            record.content,
            attributes,
            record.importance.clamp(0.0, 1.0),
            record.created_at.to_rfc3339(),
            embedding.is_some() as i32,
            record.owner_user_id,
            record.owner_world_id,
        ],
    )
    .map_err(|e| MemoryError::store("put", e))?;

    // A replaced row keeps no stale vector
    conn.execute(
        "DELETE FROM embeddings WHERE record_id = ?",
        params![record.id],
    )
    .map_err(|e| MemoryError::store("put", e))?;

    if let Some(vector) = embedding {
        conn.execute(
            "INSERT INTO embeddings (record_id, embedding, model, dimensions)
             VALUES (?, ?, ?, ?)",
            params![
                record.id,
                encode_embedding(vector),
                model,
                vector.len() as i64
            ],
        )
        .map_err(|e| MemoryError::store("put", e))?;
    }

    Ok(())
}

/// Attach a vector to an already stored record. Returns false if the
/// record no longer exists or already carries an embedding (vectors are
/// immutable once set).
pub fn set_embedding(
    conn: &Connection,
    id: &str,
    embedding: &[f32],
    model: &str,
    expected_dims: usize,
) -> Result<bool> {
    check_dimensions(embedding, expected_dims, Some(id))?;

    let inserted = conn
        .execute(
            "INSERT INTO embeddings (record_id, embedding, model, dimensions)
             SELECT ?, ?, ?, ?
             WHERE EXISTS (SELECT 1 FROM records WHERE id = ?1)
             ON CONFLICT(record_id) DO NOTHING",
            params![id, encode_embedding(embedding), model, embedding.len() as i64],
        )
        .map_err(|e| MemoryError::store("set_embedding", e))?;

    if inserted > 0 {
        conn.execute(
            "UPDATE records SET has_embedding = 1 WHERE id = ?",
            params![id],
        )
        .map_err(|e| MemoryError::store("set_embedding", e))?;
    }

    Ok(inserted > 0)
}

/// Point lookup by id
pub fn get_record(conn: &Connection, id: &str) -> Result<Option<MemoryRecord>> {
    let mut stmt = conn
        .prepare_cached(&format!(
            "SELECT {} FROM records WHERE id = ?",
            RECORD_COLUMNS
        ))
        .map_err(|e| MemoryError::store("get", e))?;

    match stmt.query_row(params![id], record_from_row) {
        Ok(record) => Ok(Some(record)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(classify_row_error(conn, "get", e)),
    }
}

/// Fetch the stored vector for a record, if computed
pub fn get_embedding(conn: &Connection, id: &str) -> Result<Option<Vec<f32>>> {
    let row = conn.query_row(
        "SELECT embedding, dimensions FROM embeddings WHERE record_id = ?",
        params![id],
        |row| {
            let bytes: Vec<u8> = row.get(0)?;
            let dimensions: i64 = row.get(1)?;
            Ok((bytes, dimensions as usize))
        },
    );

    match row {
        Ok((bytes, dimensions)) => decode_embedding(&bytes, dimensions, id).map(Some),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(MemoryError::store("get_embedding", e)),
    }
}

/// Delete a record. Idempotent: a missing id is not an error.
pub fn delete_record(conn: &Connection, id: &str) -> Result<bool> {
    let deleted = conn
        .execute("DELETE FROM records WHERE id = ?", params![id])
        .map_err(|e| MemoryError::store("delete", e))?;
    Ok(deleted > 0)
}

/// Delete every record matching the filter. Returns affected count.
pub fn delete_many(conn: &Connection, filter: &MemoryFilter) -> Result<usize> {
    let mut sql = String::from("DELETE FROM records WHERE 1=1");
    let filter_sql = FilterSql::build(filter);
    filter_sql.append_to(&mut sql);

    let deleted = conn
        .execute(&sql, filter_sql.param_refs().as_slice())
        .map_err(|e| MemoryError::store("delete_many", e))?;
    Ok(deleted)
}

/// Batched deletion by explicit ids; one statement, one atomic step
pub fn delete_ids(conn: &Connection, ids: &[RecordId]) -> Result<usize> {
    if ids.is_empty() {
        return Ok(0);
    }

    let placeholders: Vec<&str> = ids.iter().map(|_| "?").collect();
    let sql = format!(
        "DELETE FROM records WHERE id IN ({})",
        placeholders.join(", ")
    );
    let params: Vec<&dyn rusqlite::ToSql> =
        ids.iter().map(|id| id as &dyn rusqlite::ToSql).collect();

    let deleted = conn
        .execute(&sql, params.as_slice())
        .map_err(|e| MemoryError::store("delete_ids", e))?;
    Ok(deleted)
}

/// Approximate-nearest-neighbor query: brute-force cosine over embedded
/// rows matching the conjunctive filter. Returns `(record, similarity)`
/// ordered by descending similarity, ties broken by newer `created_at`.
/// An empty result is not an error.
pub fn query_similar(
    conn: &Connection,
    query_vector: &[f32],
    filter: &MemoryFilter,
    limit: usize,
    expected_dims: usize,
) -> Result<Vec<(MemoryRecord, f32)>> {
    check_dimensions(query_vector, expected_dims, None)?;

    let mut sql = format!(
        "SELECT {}, (SELECT embedding FROM embeddings e WHERE e.record_id = records.id) AS vec
         FROM records WHERE has_embedding = 1",
        RECORD_COLUMNS
    );
    let filter_sql = FilterSql::build(filter);
    filter_sql.append_to(&mut sql);

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| MemoryError::store("query", e))?;

    let rows = stmt
        .query_map(filter_sql.param_refs().as_slice(), |row| {
            let record = record_from_row(row)?;
            let bytes: Option<Vec<u8>> = row.get("vec")?;
            Ok((record, bytes))
        })
        .map_err(|e| MemoryError::store("query", e))?;

    let mut scored: Vec<(MemoryRecord, f32)> = Vec::new();
    for row in rows {
        let (record, bytes) = row.map_err(|e| classify_row_error(conn, "query", e))?;
        let Some(bytes) = bytes else { continue };
        let embedding = decode_embedding(&bytes, expected_dims, &record.id)?;
        let similarity = crate::embedding::cosine_similarity(query_vector, &embedding);
        scored.push((record, similarity));
    }

    scored.sort_by(|a, b| {
        b.1.partial_cmp(&a.1)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| b.0.created_at.cmp(&a.0.created_at))
    });
    scored.truncate(limit);

    Ok(scored)
}

/// Metadata/time-range scan independent of similarity, newest first.
/// Used for recency-only retrieval when semantic ranking is degraded.
pub fn get_recent(
    conn: &Connection,
    filter: &MemoryFilter,
    since: Option<chrono::Duration>,
    limit: usize,
) -> Result<Vec<MemoryRecord>> {
    let mut sql = format!("SELECT {} FROM records WHERE 1=1", RECORD_COLUMNS);
    let mut filter_sql = FilterSql::build(filter);

    if let Some(window) = since {
        let cutoff = Utc::now() - window;
        filter_sql.conditions.push("created_at >= ?".to_string());
        filter_sql.params.push(Box::new(cutoff.to_rfc3339()));
    }

    filter_sql.append_to(&mut sql);
    sql.push_str(" ORDER BY created_at DESC LIMIT ?");

    let mut params = filter_sql.param_refs();
    let limit = limit as i64;
    params.push(&limit);

    let mut stmt = conn
        .prepare(&sql)
        .map_err(|e| MemoryError::store("get_recent", e))?;
    let rows = stmt
        .query_map(params.as_slice(), record_from_row)
        .map_err(|e| MemoryError::store("get_recent", e))?;

    let mut records = Vec::new();
    for row in rows {
        records.push(row.map_err(|e| classify_row_error(conn, "get_recent", e))?);
    }
    Ok(records)
}

/// Total record count
pub fn count_records(conn: &Connection) -> Result<usize> {
    let count: i64 = conn
        .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))
        .map_err(|e| MemoryError::store("count", e))?;
    Ok(count as usize)
}

/// Ids of records whose importance fell below the threshold (prune set)
pub fn ids_below_importance(conn: &Connection, threshold: f32) -> Result<Vec<RecordId>> {
    let mut stmt = conn
        .prepare("SELECT id FROM records WHERE importance < ?")
        .map_err(|e| MemoryError::store("prune scan", e))?;
    let ids = stmt
        .query_map(params![threshold], |row| row.get(0))
        .map_err(|e| MemoryError::store("prune scan", e))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| MemoryError::store("prune scan", e))?;
    Ok(ids)
}

/// Ids past the cap when records are ranked by importance descending,
/// ties broken by newer `created_at` (compaction overflow set)
pub fn overflow_ids(conn: &Connection, max_records: usize) -> Result<Vec<RecordId>> {
    let mut stmt = conn
        .prepare(
            "SELECT id FROM records
             ORDER BY importance DESC, created_at DESC
             LIMIT -1 OFFSET ?",
        )
        .map_err(|e| MemoryError::store("compact scan", e))?;
    let ids = stmt
        .query_map(params![max_records as i64], |row| row.get(0))
        .map_err(|e| MemoryError::store("compact scan", e))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| MemoryError::store("compact scan", e))?;
    Ok(ids)
}

/// Overwrite the stored importance (re-scoring path), clamped to [0, 1]
pub fn set_importance(conn: &Connection, id: &str, importance: f32) -> Result<()> {
    conn.execute(
        "UPDATE records SET importance = ? WHERE id = ?",
        params![importance.clamp(0.0, 1.0), id],
    )
    .map_err(|e| MemoryError::store("set_importance", e))?;
    Ok(())
}

/// Multiply every record's importance by a decay factor, clamped at a
/// floor. Returns the number of records touched.
pub fn decay_importance(conn: &Connection, factor: f32, floor: f32) -> Result<usize> {
    let changed = conn
        .execute(
            "UPDATE records SET importance = MAX(?, importance * ?) WHERE importance > ?",
            params![floor, factor, floor],
        )
        .map_err(|e| MemoryError::store("decay", e))?;
    Ok(changed)
}

// --- embedding queue bookkeeping ---

pub fn enqueue_embedding(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "INSERT OR REPLACE INTO embedding_queue (record_id, status, queued_at)
         VALUES (?, 'pending', ?)",
        params![id, Utc::now().to_rfc3339()],
    )
    .map_err(|e| MemoryError::store("enqueue", e))?;
    Ok(())
}

pub fn mark_embedding_processing(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "UPDATE embedding_queue SET status = 'processing', started_at = ? WHERE record_id = ?",
        params![Utc::now().to_rfc3339(), id],
    )
    .map_err(|e| MemoryError::store("queue update", e))?;
    Ok(())
}

pub fn mark_embedding_complete(conn: &Connection, id: &str) -> Result<()> {
    conn.execute(
        "UPDATE embedding_queue SET status = 'complete', completed_at = ? WHERE record_id = ?",
        params![Utc::now().to_rfc3339(), id],
    )
    .map_err(|e| MemoryError::store("queue update", e))?;
    Ok(())
}

pub fn mark_embedding_failed(conn: &Connection, id: &str, error: &str) -> Result<()> {
    conn.execute(
        "UPDATE embedding_queue
         SET status = 'failed', error = ?, retry_count = retry_count + 1
         WHERE record_id = ?",
        params![error, id],
    )
    .map_err(|e| MemoryError::store("queue update", e))?;
    Ok(())
}

/// Pending or retryable queue entries, for requeueing after restart
pub fn pending_embeddings(conn: &Connection, max_retries: i32) -> Result<Vec<(RecordId, String)>> {
    let mut stmt = conn
        .prepare(
            "SELECT q.record_id, r.content FROM embedding_queue q
             JOIN records r ON q.record_id = r.id
             WHERE q.status = 'pending'
                OR (q.status = 'failed' AND q.retry_count < ?)",
        )
        .map_err(|e| MemoryError::store("queue scan", e))?;

    let entries = stmt
        .query_map(params![max_retries], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(|e| MemoryError::store("queue scan", e))?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(|e| MemoryError::store("queue scan", e))?;
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::types::{CreateMemoryInput, MemoryKind};
    use serde_json::json;

    fn sample_record(content: &str, importance: f32) -> MemoryRecord {
        let mut record = CreateMemoryInput {
            kind: MemoryKind::WorldEvent,
            content: content.to_string(),
            attributes: HashMap::from([("event_type".to_string(), json!("test"))]),
            owner_user_id: None,
            owner_world_id: None,
        }
        .into_record()
        .unwrap();
        record.importance = importance;
        record
    }

    #[test]
    fn test_round_trip_by_id() {
        let store = Store::open_in_memory().unwrap();
        let record = sample_record("hello there", 0.6);
        let id = record.id.clone();

        store
            .with_transaction(|conn| put_record(conn, &record, None, "hashing", 384))
            .unwrap();

        let fetched = store
            .with_connection(|conn| get_record(conn, &id))
            .unwrap()
            .unwrap();
        assert_eq!(fetched.content, record.content);
        assert_eq!(fetched.kind, record.kind);
        assert_eq!(fetched.attributes, record.attributes);
        assert!(!fetched.has_embedding);
    }

    #[test]
    fn test_put_rejects_dimension_mismatch() {
        let store = Store::open_in_memory().unwrap();
        let record = sample_record("short vector", 0.5);

        let err = store
            .with_transaction(|conn| put_record(conn, &record, Some(&[0.1, 0.2]), "hashing", 384))
            .unwrap_err();
        assert!(matches!(err, MemoryError::DimensionMismatch { expected: 384, actual: 2, .. }));
    }

    #[test]
    fn test_embedding_immutable_once_set() {
        let store = Store::open_in_memory().unwrap();
        let record = sample_record("stable vector", 0.5);
        let id = record.id.clone();

        store
            .with_transaction(|conn| {
                put_record(conn, &record, None, "hashing", 3)?;
                assert!(set_embedding(conn, &id, &[1.0, 0.0, 0.0], "hashing", 3)?);
                // Second write is a no-op
                assert!(!set_embedding(conn, &id, &[0.0, 1.0, 0.0], "hashing", 3)?);
                Ok(())
            })
            .unwrap();

        let vector = store
            .with_connection(|conn| get_embedding(conn, &id))
            .unwrap()
            .unwrap();
        assert_eq!(vector, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_garbage_attributes_surface_as_corruption() {
        let store = Store::open_in_memory().unwrap();
        let record = sample_record("rotted in place", 0.5);
        let id = record.id.clone();

        store
            .with_transaction(|conn| {
                put_record(conn, &record, None, "hashing", 384)?;
                conn.execute(
                    "UPDATE records SET attributes = 'not json at all' WHERE id = ?",
                    params![id],
                )
                .map_err(|e| MemoryError::store("test", e))?;
                Ok(())
            })
            .unwrap();

        let err = store
            .with_connection(|conn| get_record(conn, &id))
            .unwrap_err();
        assert!(matches!(err, MemoryError::StoreCorrupted { .. }), "{err}");

        // Scans report the bad row instead of silently dropping it
        let err = store
            .with_connection(|conn| get_recent(conn, &MemoryFilter::default(), None, 10))
            .unwrap_err();
        assert!(matches!(err, MemoryError::StoreCorrupted { .. }), "{err}");
    }

    #[test]
    fn test_garbage_timestamp_surfaces_as_corruption() {
        let store = Store::open_in_memory().unwrap();
        let record = sample_record("when was this", 0.5);
        let id = record.id.clone();

        store
            .with_transaction(|conn| {
                put_record(conn, &record, None, "hashing", 384)?;
                conn.execute(
                    "UPDATE records SET created_at = 'a while back' WHERE id = ?",
                    params![id],
                )
                .map_err(|e| MemoryError::store("test", e))?;
                Ok(())
            })
            .unwrap();

        let err = store
            .with_connection(|conn| get_record(conn, &id))
            .unwrap_err();
        assert!(matches!(err, MemoryError::StoreCorrupted { .. }), "{err}");
    }

    #[test]
    fn test_delete_is_idempotent() {
        let store = Store::open_in_memory().unwrap();
        let record = sample_record("to delete", 0.5);
        let id = record.id.clone();

        store
            .with_transaction(|conn| put_record(conn, &record, None, "hashing", 384))
            .unwrap();

        store
            .with_transaction(|conn| {
                assert!(delete_record(conn, &id)?);
                assert!(!delete_record(conn, &id)?);
                assert!(!delete_record(conn, "no-such-id")?);
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_query_similar_skips_unembedded_rows() {
        let store = Store::open_in_memory().unwrap();
        let embedded = sample_record("with vector", 0.5);
        let pending = sample_record("without vector", 0.5);

        store
            .with_transaction(|conn| {
                put_record(conn, &embedded, Some(&[1.0, 0.0, 0.0]), "hashing", 3)?;
                put_record(conn, &pending, None, "hashing", 3)?;
                Ok(())
            })
            .unwrap();

        let hits = store
            .with_connection(|conn| {
                query_similar(conn, &[1.0, 0.0, 0.0], &MemoryFilter::default(), 10, 3)
            })
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, embedded.id);

        // The pending record is still reachable via the recency scan
        let recent = store
            .with_connection(|conn| get_recent(conn, &MemoryFilter::default(), None, 10))
            .unwrap();
        assert_eq!(recent.len(), 2);
    }

    #[test]
    fn test_query_similar_orders_by_similarity() {
        let store = Store::open_in_memory().unwrap();
        let close = sample_record("close", 0.5);
        let far = sample_record("far", 0.5);

        store
            .with_transaction(|conn| {
                put_record(conn, &close, Some(&[1.0, 0.0, 0.0]), "hashing", 3)?;
                put_record(conn, &far, Some(&[0.0, 1.0, 0.0]), "hashing", 3)?;
                Ok(())
            })
            .unwrap();

        let hits = store
            .with_connection(|conn| {
                query_similar(conn, &[0.9, 0.1, 0.0], &MemoryFilter::default(), 10, 3)
            })
            .unwrap();
        assert_eq!(hits[0].0.id, close.id);
        assert!(hits[0].1 > hits[1].1);
    }

    #[test]
    fn test_filtered_query_is_conjunctive() {
        let store = Store::open_in_memory().unwrap();
        let mut mine = sample_record("mine", 0.5);
        mine.owner_user_id = Some("u1".to_string());
        let theirs = sample_record("theirs", 0.5);

        store
            .with_transaction(|conn| {
                put_record(conn, &mine, Some(&[1.0, 0.0]), "hashing", 2)?;
                put_record(conn, &theirs, Some(&[1.0, 0.0]), "hashing", 2)?;
                Ok(())
            })
            .unwrap();

        let filter = MemoryFilter {
            owner_user_id: Some("u1".to_string()),
            ..Default::default()
        };
        let hits = store
            .with_connection(|conn| query_similar(conn, &[1.0, 0.0], &filter, 10, 2))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].0.id, mine.id);
    }

    #[test]
    fn test_overflow_ids_keep_highest_importance() {
        let store = Store::open_in_memory().unwrap();
        let low = sample_record("low", 0.1);
        let mid = sample_record("mid", 0.5);
        let high = sample_record("high", 0.9);

        store
            .with_transaction(|conn| {
                for r in [&low, &mid, &high] {
                    put_record(conn, r, None, "hashing", 384)?;
                }
                Ok(())
            })
            .unwrap();

        let overflow = store
            .with_connection(|conn| overflow_ids(conn, 2))
            .unwrap();
        assert_eq!(overflow, vec![low.id.clone()]);
    }

    #[test]
    fn test_decay_respects_floor() {
        let store = Store::open_in_memory().unwrap();
        let record = sample_record("fading", 0.11);
        let id = record.id.clone();

        store
            .with_transaction(|conn| put_record(conn, &record, None, "hashing", 384))
            .unwrap();
        store
            .with_transaction(|conn| {
                decay_importance(conn, 0.5, 0.1)?;
                decay_importance(conn, 0.5, 0.1)?;
                Ok(())
            })
            .unwrap();

        let fetched = store
            .with_connection(|conn| get_record(conn, &id))
            .unwrap()
            .unwrap();
        assert!((fetched.importance - 0.1).abs() < 1e-6);
    }
}
