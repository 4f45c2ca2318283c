//! Users, teams and access permissions for Cairn.
//!
//! This crate provides:
//! - **Users** and **Teams**: accounts carrying per-repository grants,
//!   keyed by repository name or by a case-insensitive name pattern
//! - **UserDirectory**: the capability used to look up and persist them
//! - **PermissionResolver**: computes the effective permission of a user
//!   or team on a repository, with its provenance
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use cairn_auth::{MemoryUserDirectory, PermissionResolver, TeamModel, UserDirectory, UserModel};
//! use cairn_types::{AccessPermission, PermissionKind, RepositoryModel};
//!
//! let directory = Arc::new(MemoryUserDirectory::new());
//! directory.update_user(UserModel::new("alice")).unwrap();
//!
//! let mut team = TeamModel::new("dev");
//! team.add_user("alice");
//! team.set_repository_permission("proj/a.git", AccessPermission::Clone);
//! directory.update_team(team).unwrap();
//!
//! let resolver = PermissionResolver::new(directory.clone());
//! let alice = directory.user("alice").unwrap();
//!
//! let repo = RepositoryModel::new("proj/a.git").with_owner("alice");
//! let effective = resolver.user_permission(&alice, &repo);
//! assert_eq!(effective.permission, AccessPermission::Rewind);
//! assert_eq!(effective.kind, PermissionKind::Owner);
//! assert!(!effective.mutable);
//! ```

mod directory;
mod grants;
mod error;
mod resolver;
mod team;
mod user;

pub use directory::{MemoryUserDirectory, UserDirectory};
pub use error::{AuthError, Result};
pub use grants::is_name_pattern;
pub use resolver::PermissionResolver;
pub use team::TeamModel;
pub use user::UserModel;
