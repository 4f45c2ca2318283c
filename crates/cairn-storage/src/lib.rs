//! Repository storage capabilities for Cairn.
//!
//! The registry never touches repository storage directly. It goes through
//! two capabilities defined here:
//!
//! - [`RepositoryStore`]: opens handles, reports existence, last change,
//!   commit presence and disk size, and creates, renames and deletes
//!   repositories.
//! - [`ConfigStore`]: per-repository key/value configuration with a
//!   "changed since last read" signal.
//!
//! [`MemoryStore`] implements both in memory and counts every store call,
//! which makes it suitable for tests. [`FsRepositoryStore`] and
//! [`FsConfigStore`] back them with a folder of git repositories.

mod config;
mod error;
mod fs;
mod memory;
mod traits;

pub use config::{RepositoryConfig, CUSTOM_PREFIX};
pub use error::{Result, StorageError};
pub use fs::{FsConfigStore, FsRepositoryStore, CONFIG_FILE};
pub use memory::MemoryStore;
pub use traits::{ConfigStore, LastChange, RepositoryHandle, RepositoryStore, ScanOptions, SharedMode};
