//! Storage error types.

use thiserror::Error;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The requested repository was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The repository already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// The repository is still held open and cannot be moved or removed.
    #[error("repository in use: {0}")]
    InUse(String),

    /// Configuration could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The underlying git command failed.
    #[error("git command failed: {0}")]
    Command(String),
}

impl StorageError {
    /// Whether retrying the operation may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::InUse(_))
    }
}

/// A specialized Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
