//! Storage capability traits.
//!
//! Defines the interface the registry uses to reach repository storage,
//! enabling in-memory and filesystem-backed implementations.

use crate::{RepositoryConfig, Result};
use std::path::PathBuf;
use std::sync::Arc;

/// An open reference to a stored repository.
///
/// Handles are counted by the caller: every successful
/// [`RepositoryStore::open`] must be paired with a
/// [`RepositoryStore::close`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryHandle {
    /// Repository name relative to the store root.
    pub name: String,
    /// Whether the repository has no working tree.
    pub is_bare: bool,
    /// Location of the repository's git directory, if it has one.
    pub location: Option<PathBuf>,
}

impl RepositoryHandle {
    /// Creates a handle with no backing location.
    pub fn new(name: impl Into<String>, is_bare: bool) -> Self {
        Self {
            name: name.into(),
            is_bare,
            location: None,
        }
    }
}

/// The most recent change in a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LastChange {
    /// Seconds since the Unix epoch.
    pub when: u64,
    /// Author of the change, if known.
    pub author: Option<String>,
}

/// Options controlling which repositories a scan enumerates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// Only enumerate bare repositories.
    pub only_bare: bool,
    /// Descend into subfolders.
    pub search_subfolders: bool,
    /// Maximum folder depth, `-1` for unlimited.
    pub recursion_depth: i32,
    /// Patterns of repository names to skip.
    pub exclusions: Vec<String>,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            only_bare: false,
            search_subfolders: true,
            recursion_depth: -1,
            exclusions: Vec::new(),
        }
    }
}

impl ScanOptions {
    /// Whether a name at `depth` folders below the root should be listed.
    ///
    /// `depth` counts the `/` separators in the name.
    pub fn allows_depth(&self, depth: usize) -> bool {
        if depth == 0 {
            return true;
        }
        if !self.search_subfolders {
            return false;
        }
        self.recursion_depth < 0 || depth <= self.recursion_depth as usize
    }

    /// Whether `name` matches one of the exclusion patterns.
    pub fn is_excluded(&self, name: &str) -> bool {
        self.exclusions
            .iter()
            .any(|pattern| cairn_types::matches_ignore_case(name, pattern))
    }
}

/// Sharing mode for newly created repositories.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SharedMode {
    /// Permissions follow the process umask.
    #[default]
    Umask,
    /// Group-writable.
    Group,
    /// Group-writable and world-readable.
    All,
    /// Explicit octal mode.
    Mode(u32),
}

impl SharedMode {
    /// Parse a setting value (`false`, `group`, `all`, `0660`, ...).
    pub fn parse(value: &str) -> Self {
        let value = value.trim().to_lowercase();
        match value.as_str() {
            "" | "false" | "umask" => SharedMode::Umask,
            "true" | "group" => SharedMode::Group,
            "all" | "world" | "everybody" => SharedMode::All,
            other => u32::from_str_radix(other, 8)
                .map(SharedMode::Mode)
                .unwrap_or_default(),
        }
    }

    /// Value passed to `git init --shared`.
    pub fn git_value(&self) -> String {
        match self {
            SharedMode::Umask => "umask".to_string(),
            SharedMode::Group => "group".to_string(),
            SharedMode::All => "all".to_string(),
            SharedMode::Mode(mode) => format!("0{:o}", mode),
        }
    }
}

/// Repository storage capability.
///
/// Implementations must be safe to call from many request threads at once.
pub trait RepositoryStore: Send + Sync {
    /// Lists repository names visible under the given scan options.
    fn enumerate(&self, scan: &ScanOptions) -> Result<Vec<String>>;

    /// Opens a repository, returning `None` if it does not exist.
    fn open(&self, name: &str) -> Result<Option<RepositoryHandle>>;

    /// Releases one reference obtained from [`RepositoryStore::open`].
    fn close(&self, handle: &RepositoryHandle);

    /// Checks if a repository exists.
    fn exists(&self, name: &str) -> bool;

    /// Returns the most recent change in the repository.
    fn last_change(&self, handle: &RepositoryHandle) -> Result<LastChange>;

    /// Returns true if the repository has at least one commit.
    fn has_commits(&self, handle: &RepositoryHandle) -> Result<bool>;

    /// Returns the size of the repository on disk in bytes.
    fn disk_size(&self, handle: &RepositoryHandle) -> Result<u64>;

    /// Creates an empty bare repository.
    fn create(&self, name: &str, shared: SharedMode) -> Result<RepositoryHandle>;

    /// Clones `source_url` into a new repository named `name`.
    fn clone_from(&self, source_url: &str, name: &str, bare: bool) -> Result<RepositoryHandle>;

    /// Fetches updates from the repository's origin.
    fn fetch(&self, handle: &RepositoryHandle) -> Result<()>;

    /// Renames a repository. Fails with [`crate::StorageError::InUse`] while
    /// references are still held.
    fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Deletes a repository.
    fn delete(&self, name: &str) -> Result<()>;

    /// Returns the URL other repositories in this store use to clone `name`.
    fn local_url(&self, name: &str) -> String;

    /// Maps a local clone URL back to a repository name.
    fn resolve_local_url(&self, url: &str) -> Option<String>;

    /// Compacts the repository to reclaim space.
    fn compact(&self, _handle: &RepositoryHandle) -> Result<()> {
        Ok(())
    }
}

/// Per-repository configuration capability.
pub trait ConfigStore: Send + Sync {
    /// Reads the repository's configuration and marks it as current.
    fn read(&self, handle: &RepositoryHandle) -> Result<RepositoryConfig>;

    /// Returns true if the configuration changed since it was last read.
    fn is_stale(&self, handle: &RepositoryHandle) -> Result<bool>;

    /// Writes the repository's configuration.
    fn write(&self, handle: &RepositoryHandle, config: &RepositoryConfig) -> Result<()>;
}

impl<T: RepositoryStore + ?Sized> RepositoryStore for Arc<T> {
    fn enumerate(&self, scan: &ScanOptions) -> Result<Vec<String>> {
        (**self).enumerate(scan)
    }

    fn open(&self, name: &str) -> Result<Option<RepositoryHandle>> {
        (**self).open(name)
    }

    fn close(&self, handle: &RepositoryHandle) {
        (**self).close(handle)
    }

    fn exists(&self, name: &str) -> bool {
        (**self).exists(name)
    }

    fn last_change(&self, handle: &RepositoryHandle) -> Result<LastChange> {
        (**self).last_change(handle)
    }

    fn has_commits(&self, handle: &RepositoryHandle) -> Result<bool> {
        (**self).has_commits(handle)
    }

    fn disk_size(&self, handle: &RepositoryHandle) -> Result<u64> {
        (**self).disk_size(handle)
    }

    fn create(&self, name: &str, shared: SharedMode) -> Result<RepositoryHandle> {
        (**self).create(name, shared)
    }

    fn clone_from(&self, source_url: &str, name: &str, bare: bool) -> Result<RepositoryHandle> {
        (**self).clone_from(source_url, name, bare)
    }

    fn fetch(&self, handle: &RepositoryHandle) -> Result<()> {
        (**self).fetch(handle)
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        (**self).rename(from, to)
    }

    fn delete(&self, name: &str) -> Result<()> {
        (**self).delete(name)
    }

    fn local_url(&self, name: &str) -> String {
        (**self).local_url(name)
    }

    fn resolve_local_url(&self, url: &str) -> Option<String> {
        (**self).resolve_local_url(url)
    }

    fn compact(&self, handle: &RepositoryHandle) -> Result<()> {
        (**self).compact(handle)
    }
}

impl<T: ConfigStore + ?Sized> ConfigStore for Arc<T> {
    fn read(&self, handle: &RepositoryHandle) -> Result<RepositoryConfig> {
        (**self).read(handle)
    }

    fn is_stale(&self, handle: &RepositoryHandle) -> Result<bool> {
        (**self).is_stale(handle)
    }

    fn write(&self, handle: &RepositoryHandle, config: &RepositoryConfig) -> Result<()> {
        (**self).write(handle, config)
    }
}
