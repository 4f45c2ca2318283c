//! Repository registry for Cairn.
//!
//! The [`Registry`] caches repository models read from a
//! [`cairn_storage::RepositoryStore`], keeps the fork graph consistent
//! across create, rename and delete, and serves per-user repository and
//! project views through a [`cairn_auth::PermissionResolver`].
//!
//! Background compaction is coordinated through the [`GcGate`]: while
//! [`GarbageCollector`] holds a repository, reads are served from cache
//! and writes fail with [`RegistryError::Busy`].
//!
//! # Example
//!
//! ```rust
//! use cairn_auth::{MemoryUserDirectory, PermissionResolver, UserModel};
//! use cairn_registry::{GcTracker, Registry, RegistrySettings};
//! use cairn_storage::MemoryStore;
//! use std::sync::Arc;
//!
//! let store = Arc::new(MemoryStore::new());
//! store.add_repository("proj/a.git", true);
//! store.add_commit("proj/a.git", 1_700_000_000, "alice").unwrap();
//!
//! let registry = Registry::new(
//!     RegistrySettings::default(),
//!     store.clone(),
//!     store.clone(),
//!     PermissionResolver::new(Arc::new(MemoryUserDirectory::new())),
//!     Arc::new(GcTracker::new()),
//! );
//!
//! assert_eq!(registry.list().unwrap(), vec!["proj/a.git"]);
//! let visible = registry.get_accessible(&UserModel::anonymous()).unwrap();
//! assert_eq!(visible.len(), 1);
//! ```

mod error;
mod gate;
mod gc;
mod handles;
mod metrics;
mod model_io;
mod registry;
mod retry;
mod settings;

pub use error::{RegistryError, RenameStage, Result};
pub use gate::{GcGate, GcGuard, GcTracker};
pub use gc::{GarbageCollector, GcReport};
pub use handles::{HandleTracker, OpenRepository};
pub use metrics::{RegistryMetrics, RegistryStats};
pub use model_io::{model_from_config, write_model, ORIGIN_URL};
pub use registry::Registry;
pub use retry::RetryPolicy;
pub use settings::{ProjectSettings, RegistrySettings};
