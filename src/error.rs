//! Error taxonomy shared by every storage backend.

use serde::Serialize;

/// Error codes for programmatic handling, mirrored in HTTP error payloads.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    ValidationFailed,
    TaskNotFound,
    DuplicateId,
    NetworkError,
    Unauthorized,
    StorageError,
}

/// Failure of a store operation.
///
/// Validation failures are produced before any backend is reached; the rest
/// surface from the backend that performed the operation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Bad input shape or values. Never sent over the wire as a request.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation targeted an id no backend record carries.
    #[error("task not found: {0}")]
    TaskNotFound(uuid::Uuid),

    /// A create collided with an existing id.
    #[error("task already exists: {0}")]
    DuplicateId(uuid::Uuid),

    /// Transport failure or a non-2xx response that is not 401/404/409.
    #[error("network error: {0}")]
    Network(String),

    /// Missing or expired credential (HTTP 401).
    #[error("unauthorized")]
    Unauthorized,

    /// Local persistence failure (change queue / SQLite).
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl StoreError {
    pub fn code(&self) -> ErrorCode {
        match self {
            StoreError::Validation(_) => ErrorCode::ValidationFailed,
            StoreError::TaskNotFound(_) => ErrorCode::TaskNotFound,
            StoreError::DuplicateId(_) => ErrorCode::DuplicateId,
            StoreError::Network(_) => ErrorCode::NetworkError,
            StoreError::Unauthorized => ErrorCode::Unauthorized,
            StoreError::Storage(_) => ErrorCode::StorageError,
        }
    }
}

impl From<reqwest::Error> for StoreError {
    fn from(err: reqwest::Error) -> Self {
        StoreError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Validation(err.to_string())
    }
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
