//! Common types used throughout `cairn`.
//!
//! This crate provides the data model shared by the registry, the
//! permission resolver and the federation protocol: repository and
//! project models, access levels and the helpers used to normalize
//! repository names.

mod names;
mod permission;
mod project;
mod repository;

pub use names::{
    cache_key, compare_repository_names, decode_tilde, first_path_element, format_size,
    last_path_element, matches_ignore_case, parse_size, personal_path, sort_repository_names,
    strip_dot_git, username_from_personal_path, DOT_GIT, PERSONAL_PREFIX,
};
pub use permission::{AccessPermission, PermissionKind, RegistrantAccessPermission, RegistrantType};
pub use project::{ForkModel, ProjectModel};
pub use repository::{
    AccessRestriction, AuthorizationControl, FederationStrategy, RepositoryModel,
};

/// Name of the synthetic account used when exposing repositories to peers.
pub const FEDERATION_USER: &str = "$federation";

/// Name of the anonymous account.
pub const ANONYMOUS_USER: &str = "$anonymous";

/// Returns the current time as seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
