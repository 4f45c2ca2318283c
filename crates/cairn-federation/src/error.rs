//! Error types for federation.

use cairn_registry::RegistryError;
use thiserror::Error;

/// Errors that can occur in federation operations.
#[derive(Debug, Error)]
pub enum FederationError {
    /// The token does not grant the requested operation.
    #[error("unauthorized federation request")]
    Unauthorized,

    /// Federation is not configured on this instance.
    #[error("federation is disabled: {0}")]
    Disabled(String),

    /// A proposal or registration was not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// A registration is configured with unusable values.
    #[error("invalid registration: {0}")]
    InvalidRegistration(String),

    /// A proposal file could not be written.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// JSON encoding or decoding failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Filesystem error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The local registry rejected an operation.
    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    /// A peer could not be reached or answered with an error.
    #[error("remote error: {0}")]
    Remote(String),
}

/// Result type for federation operations.
pub type Result<T> = std::result::Result<T, FederationError>;
