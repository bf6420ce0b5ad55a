//! Error types for the query crate.

use std::time::Duration;
use thiserror::Error;

use emissions_common::EmissionsError;
use storage::StorageError;

/// Errors returned to the transport layer.
#[derive(Error, Debug)]
pub enum QueryError {
    /// Caller input was rejected. Never retried.
    #[error("{0}")]
    Parameter(#[from] EmissionsError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// The computation exceeded the request timeout. Nothing was cached.
    #[error("Query timed out after {0:?}")]
    Timeout(Duration),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl QueryError {
    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            QueryError::Parameter(e) => e.http_status_code(),
            QueryError::Storage(_) => 500,
            QueryError::Timeout(_) => 504,
            QueryError::Serialization(_) => 500,
        }
    }
}

impl From<serde_json::Error> for QueryError {
    fn from(err: serde_json::Error) -> Self {
        QueryError::Serialization(err.to_string())
    }
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameter_errors_are_client_errors() {
        let err: QueryError =
            EmissionsError::ConflictingParameters("point, polygon".to_string()).into();
        assert_eq!(err.http_status_code(), 400);

        let err: QueryError = EmissionsError::UnknownProduct("so2".to_string()).into();
        assert_eq!(err.http_status_code(), 404);
    }

    #[test]
    fn test_infrastructure_errors() {
        let err: QueryError = StorageError::Database("deadlock".to_string()).into();
        assert_eq!(err.http_status_code(), 500);
        assert_eq!(QueryError::Timeout(Duration::from_secs(1)).http_status_code(), 504);
    }
}
