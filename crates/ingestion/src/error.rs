//! Error types for the ingestion crate.

use std::path::PathBuf;
use thiserror::Error;

use storage::StorageError;

/// Errors raised while decoding a scan file.
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid header: {0}")]
    Header(String),

    #[error("Line {line}: {message}")]
    Record { line: usize, message: String },
}

/// Errors that can occur during ingestion.
#[derive(Error, Debug)]
pub enum IngestionError {
    /// The file could not be decoded. It stays unmarked and is retried on
    /// the next run.
    #[error("Failed to decode scan: {0}")]
    Decode(#[from] DecodeError),

    /// The store rejected the commit. The transaction was rolled back.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A worker task panicked or was cancelled.
    #[error("Ingestion task failed: {0}")]
    Task(String),
}

/// Result type for ingestion operations.
pub type Result<T> = std::result::Result<T, IngestionError>;
