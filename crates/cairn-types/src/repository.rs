//! Repository model.

use crate::names::{
    first_path_element, personal_path, username_from_personal_path, PERSONAL_PREFIX,
};
use crate::permission::AccessPermission;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Access restriction applied to anonymous and unlisted users.
///
/// Restrictions escalate: None < Push < Clone < View.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessRestriction {
    /// Anyone may do anything.
    None,
    /// Pushing requires a grant.
    #[default]
    Push,
    /// Cloning requires a grant.
    Clone,
    /// Viewing requires a grant.
    View,
}

impl AccessRestriction {
    /// Parse from a config value, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "NONE" => Some(AccessRestriction::None),
            "PUSH" => Some(AccessRestriction::Push),
            "CLONE" => Some(AccessRestriction::Clone),
            "VIEW" => Some(AccessRestriction::View),
            _ => None,
        }
    }

    /// Config value for this restriction.
    pub fn name(&self) -> &'static str {
        match self {
            AccessRestriction::None => "NONE",
            AccessRestriction::Push => "PUSH",
            AccessRestriction::Clone => "CLONE",
            AccessRestriction::View => "VIEW",
        }
    }

    /// Check if this restriction is at least as strict as `other`.
    pub fn at_least(&self, other: AccessRestriction) -> bool {
        *self >= other
    }

    /// The level every user holds implicitly under this restriction.
    pub fn implied_permission(&self) -> AccessPermission {
        match self {
            AccessRestriction::None => AccessPermission::Rewind,
            AccessRestriction::Push => AccessPermission::Clone,
            AccessRestriction::Clone => AccessPermission::View,
            AccessRestriction::View => AccessPermission::None,
        }
    }

    /// Whether a grant of `permission` means anything under this restriction.
    ///
    /// Grants at or below the implied level are redundant and ignored.
    pub fn is_valid_permission(&self, permission: AccessPermission) -> bool {
        match self {
            AccessRestriction::None => true,
            _ => permission.exceeds(self.implied_permission()),
        }
    }
}

impl fmt::Display for AccessRestriction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How named permissions are interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthorizationControl {
    /// Only listed users and teams are granted access.
    #[default]
    Named,
    /// Every authenticated user is granted access.
    Authenticated,
}

impl AuthorizationControl {
    /// Parse from a config value, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "NAMED" => Some(AuthorizationControl::Named),
            "AUTHENTICATED" => Some(AuthorizationControl::Authenticated),
            _ => None,
        }
    }

    /// Config value for this mode.
    pub fn name(&self) -> &'static str {
        match self {
            AuthorizationControl::Named => "NAMED",
            AuthorizationControl::Authenticated => "AUTHENTICATED",
        }
    }
}

/// How a repository is offered to federation peers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FederationStrategy {
    /// Never offered.
    Exclude,
    /// Offered with this instance's clone URL.
    #[default]
    FederateThis,
    /// Offered with the repository's upstream origin URL, when recorded.
    FederateOrigin,
}

impl FederationStrategy {
    /// Parse from a config value, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_uppercase().as_str() {
            "EXCLUDE" => Some(FederationStrategy::Exclude),
            "FEDERATE_THIS" => Some(FederationStrategy::FederateThis),
            "FEDERATE_ORIGIN" => Some(FederationStrategy::FederateOrigin),
            _ => None,
        }
    }

    /// Config value for this strategy.
    pub fn name(&self) -> &'static str {
        match self {
            FederationStrategy::Exclude => "EXCLUDE",
            FederationStrategy::FederateThis => "FEDERATE_THIS",
            FederationStrategy::FederateOrigin => "FEDERATE_ORIGIN",
        }
    }
}

/// Metadata for a hosted repository.
///
/// `forks` is derived: it is the inverse of every other model's
/// `origin_repository` and is maintained by the registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryModel {
    /// Case-preserved repository name (`proj/a.git`).
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: String,
    /// First path segment of the name, `""` for root repositories.
    #[serde(default)]
    pub project_path: String,
    /// Usernames that own this repository.
    #[serde(default)]
    pub owners: BTreeSet<String>,
    /// Restriction applied to unlisted users.
    #[serde(default)]
    pub access_restriction: AccessRestriction,
    /// How named grants are interpreted.
    #[serde(default)]
    pub authorization_control: AuthorizationControl,
    /// Name of the repository this one was forked from.
    #[serde(default)]
    pub origin_repository: Option<String>,
    /// Names of repositories forked from this one.
    #[serde(default)]
    pub forks: BTreeSet<String>,
    /// Upstream remote URL, if any.
    #[serde(default)]
    pub origin: Option<String>,
    /// Whether the repository has no working tree.
    #[serde(default)]
    pub is_bare: bool,
    /// Whether the repository mirrors its origin.
    #[serde(default)]
    pub is_mirror: bool,
    /// Whether pushes are rejected.
    #[serde(default)]
    pub is_frozen: bool,
    /// Whether users may fork this repository.
    #[serde(default)]
    pub allow_forks: bool,
    /// Whether disk size calculation is skipped.
    #[serde(default)]
    pub skip_size_calculation: bool,
    /// Whether the repository has at least one commit.
    #[serde(default)]
    pub has_commits: bool,
    /// Disk size in bytes, when calculated.
    #[serde(default)]
    pub size: Option<u64>,
    /// Time of the last change (seconds since epoch).
    #[serde(default)]
    pub last_change: u64,
    /// Author of the last change.
    #[serde(default)]
    pub last_change_author: Option<String>,
    /// Minimum size in bytes before garbage collection runs.
    #[serde(default)]
    pub gc_threshold: u64,
    /// Days between garbage collections.
    #[serde(default)]
    pub gc_period: u32,
    /// Time of the last garbage collection (seconds since epoch).
    #[serde(default)]
    pub last_gc: u64,
    /// How the repository is offered to federation peers.
    #[serde(default)]
    pub federation_strategy: FederationStrategy,
    /// Named federation sets this repository belongs to.
    #[serde(default)]
    pub federation_sets: Vec<String>,
    /// Whether this repository was pulled from a federation peer.
    #[serde(default)]
    pub is_federated: bool,
    /// Operator-defined fields.
    #[serde(default)]
    pub custom_fields: BTreeMap<String, String>,
    /// Set on copies served while garbage collection is running.
    #[serde(skip)]
    pub is_collecting_garbage: bool,
}

impl RepositoryModel {
    /// Creates a new repository model with default settings.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let project_path = first_path_element(&name).to_string();
        Self {
            name,
            description: String::new(),
            project_path,
            owners: BTreeSet::new(),
            access_restriction: AccessRestriction::default(),
            authorization_control: AuthorizationControl::default(),
            origin_repository: None,
            forks: BTreeSet::new(),
            origin: None,
            is_bare: true,
            is_mirror: false,
            is_frozen: false,
            allow_forks: true,
            skip_size_calculation: false,
            has_commits: false,
            size: None,
            last_change: 0,
            last_change_author: None,
            gc_threshold: 0,
            gc_period: 0,
            last_gc: 0,
            federation_strategy: FederationStrategy::default(),
            federation_sets: Vec::new(),
            is_federated: false,
            custom_fields: BTreeMap::new(),
            is_collecting_garbage: false,
        }
    }

    /// Sets the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Sets the origin repository.
    pub fn with_origin_repository(mut self, origin: impl Into<String>) -> Self {
        self.origin_repository = Some(origin.into());
        self
    }

    /// Adds an owner.
    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.add_owner(owner);
        self
    }

    /// Renames the model and recomputes its project path.
    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
        self.project_path = first_path_element(&self.name).to_string();
    }

    /// Check if a user is a recorded owner, ignoring case.
    pub fn is_owner(&self, username: &str) -> bool {
        self.owners.iter().any(|o| o.eq_ignore_ascii_case(username))
    }

    /// Add an owner. Returns false if already present.
    pub fn add_owner(&mut self, owner: impl Into<String>) -> bool {
        let owner = owner.into().to_lowercase();
        self.owners.insert(owner)
    }

    /// Remove an owner. Returns false if absent.
    pub fn remove_owner(&mut self, owner: &str) -> bool {
        let before = self.owners.len();
        self.owners.retain(|o| !o.eq_ignore_ascii_case(owner));
        self.owners.len() != before
    }

    /// Record a fork of this repository.
    pub fn add_fork(&mut self, fork: impl Into<String>) -> bool {
        self.forks.insert(fork.into())
    }

    /// Forget a fork of this repository, ignoring case.
    pub fn remove_fork(&mut self, fork: &str) -> bool {
        let before = self.forks.len();
        self.forks.retain(|f| !f.eq_ignore_ascii_case(fork));
        self.forks.len() != before
    }

    /// Check whether `name` is this model's origin, ignoring case.
    pub fn is_fork_of(&self, name: &str) -> bool {
        self.origin_repository
            .as_deref()
            .is_some_and(|o| o.eq_ignore_ascii_case(name))
    }

    /// Check if this repository lives in any personal namespace.
    pub fn is_personal_repository(&self) -> bool {
        self.project_path.starts_with(PERSONAL_PREFIX)
    }

    /// Check if this repository lives in `username`'s personal namespace.
    pub fn is_users_personal_repository(&self, username: &str) -> bool {
        !username.is_empty() && self.project_path.eq_ignore_ascii_case(&personal_path(username))
    }

    /// Username owning the personal namespace, if any.
    pub fn personal_owner(&self) -> Option<&str> {
        username_from_personal_path(&self.project_path)
    }

    /// Creates the model for a fork of this repository named `fork_name`.
    ///
    /// The fork starts push-restricted, named-authorized, with no owners
    /// and no forks of its own.
    pub fn clone_as(&self, fork_name: impl Into<String>) -> Self {
        let mut fork = RepositoryModel::new(fork_name);
        fork.origin_repository = Some(self.name.clone());
        fork.description = self.description.clone();
        fork.access_restriction = AccessRestriction::Push;
        fork.authorization_control = AuthorizationControl::Named;
        fork.federation_strategy = self.federation_strategy;
        fork.allow_forks = false;
        fork.is_bare = true;
        fork.gc_threshold = self.gc_threshold;
        fork.gc_period = self.gc_period;
        fork
    }
}

impl fmt::Display for RepositoryModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repository_creation() {
        let repo = RepositoryModel::new("proj/a.git");
        assert_eq!(repo.name, "proj/a.git");
        assert_eq!(repo.project_path, "proj");
        assert!(repo.forks.is_empty());
        assert!(repo.origin_repository.is_none());
        assert!(!repo.is_collecting_garbage);
    }

    #[test]
    fn test_owners_ignore_case() {
        let mut repo = RepositoryModel::new("a.git").with_owner("Alice");
        assert!(repo.is_owner("alice"));
        assert!(repo.is_owner("ALICE"));
        assert!(!repo.add_owner("alice"));
        assert!(repo.remove_owner("ALICE"));
        assert!(!repo.is_owner("alice"));
    }

    #[test]
    fn test_personal_repository() {
        let repo = RepositoryModel::new("~alice/a.git");
        assert!(repo.is_personal_repository());
        assert!(repo.is_users_personal_repository("Alice"));
        assert!(!repo.is_users_personal_repository("bob"));
        assert_eq!(repo.personal_owner(), Some("alice"));

        let shared = RepositoryModel::new("proj/a.git");
        assert!(!shared.is_personal_repository());
        assert_eq!(shared.personal_owner(), None);
    }

    #[test]
    fn test_clone_as() {
        let origin = RepositoryModel::new("proj/a.git")
            .with_owner("bob")
            .with_description("origin");
        let fork = origin.clone_as("~alice/a.git");
        assert_eq!(fork.origin_repository.as_deref(), Some("proj/a.git"));
        assert_eq!(fork.project_path, "~alice");
        assert!(fork.owners.is_empty());
        assert_eq!(fork.access_restriction, AccessRestriction::Push);
        assert!(!fork.allow_forks);
        assert!(fork.is_fork_of("PROJ/a.git"));
    }

    #[test]
    fn test_restriction_validity() {
        assert!(AccessRestriction::View.is_valid_permission(AccessPermission::View));
        assert!(!AccessRestriction::Clone.is_valid_permission(AccessPermission::View));
        assert!(AccessRestriction::Clone.is_valid_permission(AccessPermission::Clone));
        assert!(!AccessRestriction::Push.is_valid_permission(AccessPermission::Clone));
        assert!(AccessRestriction::Push.is_valid_permission(AccessPermission::Push));
        assert!(AccessRestriction::View.at_least(AccessRestriction::Clone));
    }

    #[test]
    fn test_serde_skips_gc_flag() {
        let mut repo = RepositoryModel::new("a.git");
        repo.is_collecting_garbage = true;
        let json = serde_json::to_string(&repo).unwrap();
        let back: RepositoryModel = serde_json::from_str(&json).unwrap();
        assert!(!back.is_collecting_garbage);
        assert_eq!(back.name, "a.git");
    }

    #[test]
    fn test_enum_names() {
        assert_eq!(AccessRestriction::from_name("clone"), Some(AccessRestriction::Clone));
        assert_eq!(
            AuthorizationControl::from_name("Authenticated"),
            Some(AuthorizationControl::Authenticated)
        );
        assert_eq!(
            FederationStrategy::from_name("federate_origin"),
            Some(FederationStrategy::FederateOrigin)
        );
        assert_eq!(FederationStrategy::from_name("nope"), None);
    }
}
