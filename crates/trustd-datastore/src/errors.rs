//! Datastore error taxonomy.
//!
//! Every underlying storage error is classified into exactly one variant
//! before it reaches a caller; no storage-engine error type escapes this
//! crate.

use thiserror::Error;
use trustd_storage::StorageError;

/// Datastore errors
#[derive(Debug, Error)]
pub enum DataStoreError {
    /// Record not found
    #[error("record not found: {0}")]
    NotFound(String),

    /// Unique key collision
    #[error("record already exists: {0}")]
    AlreadyExists(String),

    /// Stale revision or losing a promotion race
    #[error("stale revision for entry {entry_id}: expected {expected}, stored {stored}")]
    Conflict {
        entry_id: String,
        expected: u64,
        stored: u64,
    },

    /// Malformed or contradictory input
    #[error("invalid argument: {0}")]
    Invalid(String),

    /// Dangling reference or broken ownership invariant
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),

    /// Storage connectivity or timeout; safe for the caller to retry
    #[error("transient storage failure: {0}")]
    Transient(String),

    /// Unrecoverable condition, e.g. schema version mismatch at startup
    #[error("fatal: {0}")]
    Fatal(String),
}

impl DataStoreError {
    /// Whether the caller may safely retry the failed operation
    pub fn is_retryable(&self) -> bool {
        matches!(self, DataStoreError::Transient(_))
    }
}

impl From<StorageError> for DataStoreError {
    fn from(err: StorageError) -> Self {
        match err {
            // Engine-level failures are assumed recoverable on retry
            StorageError::Database(msg) => DataStoreError::Transient(msg),
            StorageError::IoError(e) => DataStoreError::Transient(e.to_string()),
            // Codec and mapping failures indicate a code/schema defect
            StorageError::Serialization(msg)
            | StorageError::Deserialization(msg)
            | StorageError::InvalidColumnFamily(msg) => DataStoreError::Fatal(msg),
        }
    }
}

/// Result type for datastore operations
pub type Result<T> = std::result::Result<T, DataStoreError>;
