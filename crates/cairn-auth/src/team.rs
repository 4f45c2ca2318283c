//! Team types for group-based repository access.

use crate::grants::{explicit_grant, pattern_grants, rename_grant, set_grant};
use cairn_types::AccessPermission;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// A named group of users.
///
/// Every member inherits the team's repository grants.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamModel {
    /// Team name, unique ignoring case.
    pub name: String,
    /// Member usernames (lowercased).
    #[serde(default)]
    pub users: BTreeSet<String>,
    /// Whether members administer the whole instance.
    #[serde(default)]
    pub can_admin: bool,
    /// Whether members may fork repositories.
    #[serde(default)]
    pub can_fork: bool,
    /// Whether members may create personal repositories.
    #[serde(default)]
    pub can_create: bool,
    /// Repository grants.
    #[serde(default)]
    pub permissions: BTreeMap<String, AccessPermission>,
}

impl TeamModel {
    /// Create an empty team.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            users: BTreeSet::new(),
            can_admin: false,
            can_fork: false,
            can_create: false,
            permissions: BTreeMap::new(),
        }
    }

    /// Check if a user is a member of this team.
    pub fn has_user(&self, username: &str) -> bool {
        self.users.contains(&username.to_lowercase())
    }

    /// Add a member to the team.
    pub fn add_user(&mut self, username: &str) -> bool {
        self.users.insert(username.to_lowercase())
    }

    /// Remove a member from the team.
    pub fn remove_user(&mut self, username: &str) -> bool {
        self.users.remove(&username.to_lowercase())
    }

    /// Set or clear a grant. Granting `None` removes it.
    pub fn set_repository_permission(&mut self, repository: &str, permission: AccessPermission) {
        set_grant(&mut self.permissions, repository, permission);
    }

    /// Check if the team holds a grant keyed exactly by `repository`.
    pub fn has_repository_permission(&self, repository: &str) -> bool {
        explicit_grant(&self.permissions, repository).is_some()
    }

    /// Grant keyed exactly by `repository`.
    pub fn explicit_permission(&self, repository: &str) -> Option<AccessPermission> {
        explicit_grant(&self.permissions, repository)
    }

    /// Pattern grants matching `repository`.
    pub fn pattern_permissions<'a>(
        &'a self,
        repository: &'a str,
    ) -> impl Iterator<Item = (&'a str, AccessPermission)> + 'a {
        pattern_grants(&self.permissions, repository)
    }

    /// Move the grant for `old` to `new`. Returns true if one moved.
    pub fn rename_repository_permission(&mut self, old: &str, new: &str) -> bool {
        rename_grant(&mut self.permissions, old, new)
    }

    /// Drop the grant for `repository`. Returns true if one existed.
    pub fn remove_repository_permission(&mut self, repository: &str) -> bool {
        let before = self.permissions.len();
        self.set_repository_permission(repository, AccessPermission::None);
        self.permissions.len() != before
    }
}
