//! Error types for the memory subsystem

use thiserror::Error;

/// Result type alias for memory operations
pub type Result<T> = std::result::Result<T, MemoryError>;

/// Closed failure taxonomy for the memory subsystem.
///
/// Transient variants (`EmbeddingUnavailable`, `StoreUnavailable`) are
/// retried internally and converted into degradation steps; structural
/// variants surface to the caller with enough context to diagnose.
#[derive(Error, Debug)]
pub enum MemoryError {
    /// Embedding model load or inference failure. Retryable.
    #[error("embedding unavailable during {operation}: {message}")]
    EmbeddingUnavailable { operation: String, message: String },

    /// Backing medium cannot be reached. Retryable with backoff.
    #[error("store unavailable during {operation}: {source}")]
    StoreUnavailable {
        operation: String,
        #[source]
        source: rusqlite::Error,
    },

    /// Index unreadable or inconsistent. Not retryable in place;
    /// triggers restore-from-backup or empty reinitialization.
    #[error("store corrupted at {db_path}: {detail}")]
    StoreCorrupted { db_path: String, detail: String },

    /// Embedding length disagrees with the store's fixed dimensionality.
    /// Programmer/config error, never retried.
    #[error("dimension mismatch for record {record_id:?}: expected {expected}, got {actual}")]
    DimensionMismatch {
        expected: usize,
        actual: usize,
        record_id: Option<String>,
    },

    /// Malformed record rejected at construction. No partial write.
    #[error("validation failed for {field}: {message}")]
    Validation { field: String, message: String },

    /// Operation exceeded its wall-clock budget. Not retried in place;
    /// counts against the degradation controller instead.
    #[error("{operation} exceeded its {budget_ms}ms budget")]
    Timeout { operation: String, budget_ms: u64 },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl MemoryError {
    /// Whether internal retry with backoff is worthwhile before
    /// stepping the degradation level.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            MemoryError::EmbeddingUnavailable { .. } | MemoryError::StoreUnavailable { .. }
        )
    }

    pub fn embedding(operation: impl Into<String>, message: impl Into<String>) -> Self {
        MemoryError::EmbeddingUnavailable {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        MemoryError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Wrap a database error, keeping the operation that hit it.
    pub fn store(operation: impl Into<String>, source: rusqlite::Error) -> Self {
        MemoryError::StoreUnavailable {
            operation: operation.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_retryable() {
        assert!(MemoryError::embedding("retrieve", "model not loaded").is_retryable());
        assert!(MemoryError::store("put", rusqlite::Error::InvalidQuery).is_retryable());
    }

    #[test]
    fn structural_errors_are_not_retryable() {
        let corrupt = MemoryError::StoreCorrupted {
            db_path: "/tmp/x.db".into(),
            detail: "integrity_check failed".into(),
        };
        assert!(!corrupt.is_retryable());

        let mismatch = MemoryError::DimensionMismatch {
            expected: 384,
            actual: 128,
            record_id: None,
        };
        assert!(!mismatch.is_retryable());
        assert!(!MemoryError::validation("tone", "missing").is_retryable());
    }
}
