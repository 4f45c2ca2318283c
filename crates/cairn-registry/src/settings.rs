//! Registry settings.

use cairn_storage::{ScanOptions, SharedMode};
use cairn_types::{parse_size, AccessRestriction, AuthorizationControl};
use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::collections::BTreeMap;

/// Title and description overrides for a project.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSettings {
    /// Display title.
    pub title: Option<String>,
    /// Description.
    pub description: Option<String>,
}

/// Settings controlling repository discovery, caching and defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrySettings {
    /// Keep repository models in memory between requests.
    pub cache_repository_list: bool,
    /// Only list bare repositories.
    pub only_bare: bool,
    /// Search folders below the repositories root.
    pub search_subfolders: bool,
    /// Maximum folder depth to search, `-1` for unlimited.
    pub recursion_depth: i32,
    /// Patterns of repository names to skip.
    pub exclusions: Vec<String>,
    /// Restriction for repositories that do not set one.
    pub default_access_restriction: AccessRestriction,
    /// Authorization control for repositories that do not set one.
    pub default_authorization_control: AuthorizationControl,
    /// Minimum size before garbage collection, e.g. `500KB`.
    pub default_gc_threshold: String,
    /// Days between garbage collections.
    pub default_gc_period: u32,
    /// Sharing mode of created repositories (`false`, `group`, `all`, `0660`).
    pub create_shared: String,
    /// Calculate repository disk sizes.
    pub show_sizes: bool,
    /// Alias of the root project.
    pub root_group_name: String,
    /// Per-project overrides keyed by lowercased project name.
    pub projects: BTreeMap<String, ProjectSettings>,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            cache_repository_list: true,
            only_bare: false,
            search_subfolders: true,
            recursion_depth: -1,
            exclusions: Vec::new(),
            default_access_restriction: AccessRestriction::Push,
            default_authorization_control: AuthorizationControl::Named,
            default_gc_threshold: "500KB".to_string(),
            default_gc_period: 7,
            create_shared: "false".to_string(),
            show_sizes: true,
            root_group_name: "main".to_string(),
            projects: BTreeMap::new(),
        }
    }
}

impl RegistrySettings {
    /// Checksum over the settings that change what a scan enumerates.
    ///
    /// A cached repository list built under a different checksum is stale.
    pub fn list_checksum(&self) -> String {
        let mut hasher = Sha1::new();
        hasher.update(self.cache_repository_list.to_string());
        hasher.update(b"\n");
        hasher.update(self.only_bare.to_string());
        hasher.update(b"\n");
        hasher.update(self.search_subfolders.to_string());
        hasher.update(b"\n");
        hasher.update(self.recursion_depth.to_string());
        hasher.update(b"\n");
        hasher.update(self.exclusions.join(","));
        hasher.update(b"\n");
        hex::encode(hasher.finalize())
    }

    /// Scan options derived from these settings.
    pub fn scan_options(&self) -> ScanOptions {
        ScanOptions {
            only_bare: self.only_bare,
            search_subfolders: self.search_subfolders,
            recursion_depth: self.recursion_depth,
            exclusions: self.exclusions.clone(),
        }
    }

    /// Default garbage collection threshold in bytes.
    pub fn gc_threshold_bytes(&self) -> u64 {
        parse_size(&self.default_gc_threshold).unwrap_or(500 * 1024)
    }

    /// Sharing mode of created repositories.
    pub fn shared_mode(&self) -> SharedMode {
        SharedMode::parse(&self.create_shared)
    }
}
