//! Access levels and permission entries.

use crate::names::compare_repository_names;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Access level for a repository.
///
/// Levels are ordered: None < View < Clone < Push < Create < Delete < Rewind.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessPermission {
    /// No access.
    #[default]
    None,
    /// Can browse the repository.
    View,
    /// Can clone and fetch.
    Clone,
    /// Can push fast-forward updates.
    Push,
    /// Can create refs.
    Create,
    /// Can create and delete refs.
    Delete,
    /// Can rewrite history (force push).
    Rewind,
}

impl AccessPermission {
    /// All levels, weakest first.
    pub const ALL: [AccessPermission; 7] = [
        AccessPermission::None,
        AccessPermission::View,
        AccessPermission::Clone,
        AccessPermission::Push,
        AccessPermission::Create,
        AccessPermission::Delete,
        AccessPermission::Rewind,
    ];

    /// Check if this level grants at least the required level.
    pub fn at_least(&self, required: AccessPermission) -> bool {
        *self >= required
    }

    /// Check if this level is strictly greater than `other`.
    pub fn exceeds(&self, other: AccessPermission) -> bool {
        *self > other
    }

    /// Short code used in persisted role mappings (`RW+`, `R`, ...).
    pub fn code(&self) -> &'static str {
        match self {
            AccessPermission::None => "N",
            AccessPermission::View => "V",
            AccessPermission::Clone => "R",
            AccessPermission::Push => "RW",
            AccessPermission::Create => "RWC",
            AccessPermission::Delete => "RWD",
            AccessPermission::Rewind => "RW+",
        }
    }

    /// Parse from a short code or a level name.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Some(p) = Self::ALL.iter().find(|p| p.code() == s) {
            return Some(*p);
        }
        match s.to_lowercase().as_str() {
            "none" => Some(AccessPermission::None),
            "view" => Some(AccessPermission::View),
            "clone" => Some(AccessPermission::Clone),
            "push" => Some(AccessPermission::Push),
            "create" => Some(AccessPermission::Create),
            "delete" => Some(AccessPermission::Delete),
            "rewind" => Some(AccessPermission::Rewind),
            _ => None,
        }
    }
}

impl fmt::Display for AccessPermission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// Where an effective permission comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PermissionKind {
    /// Granted directly to the registrant.
    Explicit,
    /// Inherited through team membership.
    Team,
    /// Matched by a regular-expression rule.
    Regex,
    /// Implied by ownership or the personal namespace.
    Owner,
    /// An explicit grant for a repository that no longer exists.
    Missing,
    /// Implied by the administrator flag.
    Administrator,
    /// Implied by authentication on an AUTHENTICATED repository.
    Authenticated,
    /// Implied by the repository's access restriction.
    Anonymous,
}

impl PermissionKind {
    /// Display priority when deduplicating entries for the same registrant.
    ///
    /// Higher wins: inherited, non-editable sources outrank explicit grants.
    pub fn priority(&self) -> u8 {
        match self {
            PermissionKind::Owner | PermissionKind::Administrator => 4,
            PermissionKind::Team => 3,
            PermissionKind::Regex => 2,
            PermissionKind::Explicit | PermissionKind::Authenticated => 1,
            PermissionKind::Missing | PermissionKind::Anonymous => 0,
        }
    }
}

/// The kind of subject a permission entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistrantType {
    /// The registrant is a username.
    User,
    /// The registrant is a team name.
    Team,
    /// The registrant is a repository name.
    Repository,
}

/// A permission held by a registrant, with its provenance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistrantAccessPermission {
    /// The subject (username, team name or repository name).
    pub registrant: String,
    /// The granted level.
    pub permission: AccessPermission,
    /// Where the level comes from.
    pub kind: PermissionKind,
    /// What kind of subject `registrant` names.
    pub registrant_type: RegistrantType,
    /// Team name or pattern that produced the level, if any.
    pub source: Option<String>,
    /// Whether an administrator may edit this entry directly.
    pub mutable: bool,
}

impl RegistrantAccessPermission {
    /// Create an editable explicit grant.
    pub fn explicit(
        registrant: impl Into<String>,
        registrant_type: RegistrantType,
        permission: AccessPermission,
    ) -> Self {
        Self {
            registrant: registrant.into(),
            permission,
            kind: PermissionKind::Explicit,
            registrant_type,
            source: None,
            mutable: true,
        }
    }

    /// Create a non-editable inherited entry.
    pub fn inherited(
        registrant: impl Into<String>,
        registrant_type: RegistrantType,
        permission: AccessPermission,
        kind: PermissionKind,
        source: Option<String>,
    ) -> Self {
        Self {
            registrant: registrant.into(),
            permission,
            kind,
            registrant_type,
            source,
            mutable: false,
        }
    }

    /// Whether the entry can be edited by an administrator.
    pub fn is_editable(&self) -> bool {
        self.mutable && self.kind == PermissionKind::Explicit
    }

    /// Reclassify an explicit grant whose target no longer exists.
    pub fn demote_missing(&mut self) {
        if self.kind == PermissionKind::Explicit {
            self.kind = PermissionKind::Missing;
            self.mutable = false;
        }
    }
}

impl PartialOrd for RegistrantAccessPermission {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for RegistrantAccessPermission {
    fn cmp(&self, other: &Self) -> Ordering {
        let by_name = match self.registrant_type {
            RegistrantType::Repository => {
                compare_repository_names(&self.registrant, &other.registrant)
            }
            _ => self
                .registrant
                .to_lowercase()
                .cmp(&other.registrant.to_lowercase()),
        };
        by_name
            .then_with(|| self.registrant.cmp(&other.registrant))
            .then_with(|| other.permission.cmp(&self.permission))
            .then_with(|| other.kind.priority().cmp(&self.kind.priority()))
    }
}
