//! User accounts.

use crate::grants::{explicit_grant, pattern_grants, rename_grant, set_grant};
use cairn_types::{personal_path, AccessPermission, ANONYMOUS_USER, FEDERATION_USER};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A user account and its repository grants.
///
/// Grants are keyed by repository name (lowercased) or by a name pattern.
/// Team membership is recorded on the team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserModel {
    /// Login name, unique ignoring case.
    pub username: String,
    /// Name shown in the UI.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Contact address.
    #[serde(default)]
    pub email: Option<String>,
    /// Whether the user administers the whole instance.
    #[serde(default)]
    pub can_admin: bool,
    /// Whether the user may fork repositories.
    #[serde(default)]
    pub can_fork: bool,
    /// Whether the user may create personal repositories.
    #[serde(default)]
    pub can_create: bool,
    /// Whether the user is hidden from federation peers.
    #[serde(default)]
    pub exclude_from_federation: bool,
    /// Whether this is a signed-in user rather than an anonymous visitor.
    #[serde(skip, default = "default_authenticated")]
    pub is_authenticated: bool,
    /// Repository grants.
    #[serde(default)]
    pub permissions: BTreeMap<String, AccessPermission>,
}

fn default_authenticated() -> bool {
    true
}

impl UserModel {
    /// Create an authenticated user with no grants.
    pub fn new(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            display_name: None,
            email: None,
            can_admin: false,
            can_fork: true,
            can_create: false,
            exclude_from_federation: false,
            is_authenticated: true,
            permissions: BTreeMap::new(),
        }
    }

    /// The anonymous visitor.
    pub fn anonymous() -> Self {
        let mut user = Self::new(ANONYMOUS_USER);
        user.is_authenticated = false;
        user.can_fork = false;
        user
    }

    /// The synthetic administrator used to expose repositories to peers.
    pub fn federation() -> Self {
        let mut user = Self::new(FEDERATION_USER);
        user.can_admin = true;
        user
    }

    /// Set the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Grant `permission` on a repository or name pattern.
    pub fn with_permission(mut self, repository: &str, permission: AccessPermission) -> Self {
        self.set_repository_permission(repository, permission);
        self
    }

    /// Check if this is the anonymous visitor.
    pub fn is_anonymous(&self) -> bool {
        !self.is_authenticated
    }

    /// Name shown in the UI, falling back to the username.
    pub fn display_name(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|n| !n.is_empty())
            .unwrap_or(&self.username)
    }

    /// Path of the user's personal namespace (`~alice`).
    pub fn personal_path(&self) -> String {
        personal_path(&self.username)
    }

    /// Check if `repository` lives in this user's personal namespace.
    pub fn is_my_personal_repository(&self, repository: &str) -> bool {
        let prefix = format!("{}/", self.personal_path());
        repository.to_lowercase().starts_with(&prefix)
    }

    /// Set or clear a grant. Granting `None` removes it.
    pub fn set_repository_permission(&mut self, repository: &str, permission: AccessPermission) {
        set_grant(&mut self.permissions, repository, permission);
    }

    /// Check if the user holds a grant keyed exactly by `repository`.
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
