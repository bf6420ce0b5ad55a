//! Error types shared by the emissions crates.

use thiserror::Error;

/// Result type alias using EmissionsError.
pub type EmissionsResult<T> = Result<T, EmissionsError>;

/// Primary error type for request-facing operations.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum EmissionsError {
    // === Parameter Errors ===
    #[error("Invalid parameter value for '{param}': {message}")]
    InvalidParameter { param: String, message: String },

    #[error("Parameters {0} are mutually exclusive")]
    ConflictingParameters(String),

    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("Invalid time value: {0}")]
    InvalidTime(String),

    #[error("Unknown region code: {0}")]
    UnknownRegion(String),

    #[error("Unknown product: {0}")]
    UnknownProduct(String),

    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    // === Infrastructure Errors ===
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl EmissionsError {
    pub fn invalid_parameter(param: impl Into<String>, message: impl Into<String>) -> Self {
        EmissionsError::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    /// Whether this error was caused by caller input.
    pub fn is_parameter_error(&self) -> bool {
        !matches!(self, EmissionsError::InternalError(_))
    }

    /// Get the HTTP status code for this error.
    pub fn http_status_code(&self) -> u16 {
        match self {
            EmissionsError::InvalidParameter { .. }
            | EmissionsError::ConflictingParameters(_)
            | EmissionsError::InvalidGeometry(_)
            | EmissionsError::InvalidTime(_)
            | EmissionsError::UnknownRegion(_) => 400,

            EmissionsError::UnknownProduct(_) | EmissionsError::UnknownEndpoint(_) => 404,

            EmissionsError::InternalError(_) => 500,
        }
    }
}

impl From<serde_json::Error> for EmissionsError {
    fn from(err: serde_json::Error) -> Self {
        EmissionsError::InternalError(format!("JSON error: {}", err))
    }
}
