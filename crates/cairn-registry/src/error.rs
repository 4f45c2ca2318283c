//! Error types for the registry.

use cairn_auth::AuthError;
use cairn_storage::StorageError;
use std::fmt;
use thiserror::Error;

/// Step of a rename that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenameStage {
    /// The repository could not be moved. Nothing changed.
    Filesystem,
    /// The repository moved but fork configurations still name the old one.
    Forks,
    /// The repository moved but permission roles still name the old one.
    Roles,
}

impl fmt::Display for RenameStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RenameStage::Filesystem => "filesystem",
            RenameStage::Forks => "forks",
            RenameStage::Roles => "roles",
        })
    }
}

/// Errors that can occur in registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The repository was not found.
    #[error("repository not found: {0}")]
    NotFound(String),

    /// The repository already exists.
    #[error("repository already exists: {0}")]
    AlreadyExists(String),

    /// Garbage collection is running on the repository.
    #[error("busy collecting garbage in {0}")]
    Busy(String),

    /// A rename failed at `stage`.
    #[error("failed to rename {from} to {to} ({stage}): {reason}")]
    InvalidRename {
        /// Original name.
        from: String,
        /// Requested name.
        to: String,
        /// Step that failed.
        stage: RenameStage,
        /// Underlying failure.
        reason: String,
    },

    /// A secondary write failed after the in-memory model was updated.
    #[error("persistence failure: {0}")]
    PersistenceFailure(String),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// User directory error.
    #[error("auth error: {0}")]
    Auth(#[from] AuthError),
}

impl RegistryError {
    /// Whether the rename moved the repository before failing.
    pub fn is_partial_rename(&self) -> bool {
        matches!(
            self,
            RegistryError::InvalidRename { stage, .. } if *stage != RenameStage::Filesystem
        )
    }
}

/// Result type for registry operations.
pub type Result<T> = std::result::Result<T, RegistryError>;
