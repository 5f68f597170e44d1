//! Error types for the store module.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database error from SQLite.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Record serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A sealed record could not be opened.
    #[error("record decryption failed")]
    Decryption,

    /// The storage key does not match the one the database was created with.
    #[error("storage key does not match this database")]
    WrongKey,

    /// The epoch index is not the next one for this identity.
    #[error("epoch index out of order: expected {expected}, got {got}")]
    EpochIndex { expected: u64, got: u64 },

    /// A breadcrumb named by an epoch is missing or already published.
    #[error("breadcrumb {0} is not pending")]
    NotPending(String),

    /// An epoch with this hash is already stored.
    #[error("epoch already stored: {0}")]
    DuplicateEpoch(String),

    /// Invalid data in storage.
    #[error("invalid data: {0}")]
    InvalidData(String),

    /// Migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// A lock guarding in-memory state was poisoned.
    #[error("lock poisoned: {0}")]
    Lock(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
