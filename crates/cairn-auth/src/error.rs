//! Error types for the auth crate.

use thiserror::Error;

/// Errors that can occur in user and permission operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The requested user or team was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// The user or team already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Invalid input was provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The directory failed to persist a change.
    #[error("persistence failure: {0}")]
    Persistence(String),
}

/// Result type for auth operations.
pub type Result<T> = std::result::Result<T, AuthError>;
