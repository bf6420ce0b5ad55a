//! Error types for the storage crate.

use thiserror::Error;

/// Errors raised by store handles.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StorageError {
    /// The store could not be reached. Fatal at startup.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A statement or transaction failed; the transaction was rolled back.
    #[error("Database error: {0}")]
    Database(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Invalid query: {0}")]
    InvalidQuery(String),
}

impl StorageError {
    /// Whether retrying the whole operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StorageError::Database(_))
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
