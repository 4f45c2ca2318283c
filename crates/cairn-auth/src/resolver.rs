//! Effective permission resolution.

use crate::grants::is_name_pattern;
use crate::{AuthError, Result, TeamModel, UserDirectory, UserModel};
use cairn_types::{
    cache_key, AccessPermission, AccessRestriction, AuthorizationControl, PermissionKind,
    RegistrantAccessPermission, RegistrantType, RepositoryModel,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Computes what users and teams may do with repositories.
///
/// For a user, the effective level is the highest of their explicit grant,
/// matching pattern grants and the grants of every team they belong to,
/// floored at the level implied by the repository's access restriction.
/// Administrators, owners and the personal-namespace owner always get
/// [`AccessPermission::Rewind`].
#[derive(Clone)]
pub struct PermissionResolver {
    directory: Arc<dyn UserDirectory>,
}

impl std::fmt::Debug for PermissionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PermissionResolver").finish_non_exhaustive()
    }
}

impl PermissionResolver {
    /// Create a resolver over a user directory.
    pub fn new(directory: Arc<dyn UserDirectory>) -> Self {
        Self { directory }
    }

    /// The directory this resolver reads from.
    pub fn directory(&self) -> &Arc<dyn UserDirectory> {
        &self.directory
    }

    fn teams_of(&self, user: &UserModel) -> Vec<TeamModel> {
        if user.is_anonymous() || user.username.is_empty() {
            return Vec::new();
        }
        self.directory.teams_of(&user.username)
    }

    /// Check if the user administers the instance directly or through a team.
    pub fn is_admin(&self, user: &UserModel) -> bool {
        user.can_admin || self.teams_of(user).iter().any(|t| t.can_admin)
    }

    /// Check if the user may fork repositories.
    pub fn can_fork_repositories(&self, user: &UserModel) -> bool {
        user.is_authenticated && (user.can_fork || self.teams_of(user).iter().any(|t| t.can_fork))
    }

    /// Check if the user may create personal repositories.
    pub fn can_create(&self, user: &UserModel) -> bool {
        user.is_authenticated
            && (self.is_admin(user)
                || user.can_create
                || self.teams_of(user).iter().any(|t| t.can_create))
    }

    /// Effective permission of `user` on `repository`, with its source.
    pub fn user_permission(
        &self,
        user: &UserModel,
        repository: &RepositoryModel,
    ) -> RegistrantAccessPermission {
        let granted = |permission, kind, source| {
            RegistrantAccessPermission::inherited(
                user.username.clone(),
                RegistrantType::User,
                permission,
                kind,
                source,
            )
        };

        let teams = self.teams_of(user);
        if user.can_admin || teams.iter().any(|t| t.can_admin) {
            return granted(AccessPermission::Rewind, PermissionKind::Administrator, None);
        }
        if user.is_authenticated
            && (repository.is_owner(&user.username)
                || repository.is_users_personal_repository(&user.username))
        {
            return granted(AccessPermission::Rewind, PermissionKind::Owner, None);
        }
        if user.is_authenticated
            && repository.authorization_control == AuthorizationControl::Authenticated
        {
            return granted(AccessPermission::Rewind, PermissionKind::Authenticated, None);
        }

        let restriction = repository.access_restriction;
        let mut best = granted(AccessPermission::None, PermissionKind::Anonymous, None);

        if let Some(permission) = user.explicit_permission(&repository.name) {
            if restriction.is_valid_permission(permission) {
                best = RegistrantAccessPermission::explicit(
                    user.username.clone(),
                    RegistrantType::User,
                    permission,
                );
            }
        }
        for (pattern, permission) in user.pattern_permissions(&repository.name) {
            if restriction.is_valid_permission(permission) && permission.exceeds(best.permission) {
                best = granted(permission, PermissionKind::Regex, Some(pattern.to_string()));
            }
        }
        for team in &teams {
            let team_permission = Self::team_permission(team, repository);
            if team_permission.kind != PermissionKind::Anonymous
                && team_permission.permission.exceeds(best.permission)
            {
                best = granted(
                    team_permission.permission,
                    PermissionKind::Team,
                    Some(team.name.clone()),
                );
            }
        }

        let implied = restriction.implied_permission();
        if implied.exceeds(best.permission) {
            best = granted(implied, PermissionKind::Anonymous, None);
        }
        best
    }

    /// Effective permission of `team` on `repository`, with its source.
    pub fn team_permission(
        team: &TeamModel,
        repository: &RepositoryModel,
    ) -> RegistrantAccessPermission {
        let granted = |permission, kind, source| {
            RegistrantAccessPermission::inherited(
                team.name.clone(),
                RegistrantType::Team,
                permission,
                kind,
                source,
            )
        };

        if team.can_admin {
            return granted(AccessPermission::Rewind, PermissionKind::Administrator, None);
        }

        let restriction = repository.access_restriction;
        let mut best = granted(AccessPermission::None, PermissionKind::Anonymous, None);

        if let Some(permission) = team.explicit_permission(&repository.name) {
            if restriction.is_valid_permission(permission) {
                best = RegistrantAccessPermission::explicit(
                    team.name.clone(),
                    RegistrantType::Team,
                    permission,
                );
            }
        }
        for (pattern, permission) in team.pattern_permissions(&repository.name) {
            if restriction.is_valid_permission(permission) && permission.exceeds(best.permission) {
                best = granted(permission, PermissionKind::Regex, Some(pattern.to_string()));
            }
        }

        let implied = restriction.implied_permission();
        if implied.exceeds(best.permission) {
            best = granted(implied, PermissionKind::Anonymous, None);
        }
        best
    }

    fn can_access(
        &self,
        user: &UserModel,
        repository: &RepositoryModel,
        if_restricted: AccessRestriction,
        required: AccessPermission,
    ) -> bool {
        if repository.access_restriction == AccessRestriction::None {
            return true;
        }
        if repository.access_restriction.at_least(if_restricted) {
            return self
                .user_permission(user, repository)
                .permission
                .at_least(required);
        }
        true
    }

    /// Check if the user may see the repository.
    pub fn can_view(&self, user: &UserModel, repository: &RepositoryModel) -> bool {
        self.can_access(user, repository, AccessRestriction::View, AccessPermission::View)
    }

    /// Check if the user may clone the repository.
    pub fn can_clone(&self, user: &UserModel, repository: &RepositoryModel) -> bool {
        self.can_access(user, repository, AccessRestriction::Clone, AccessPermission::Clone)
    }

    /// Check if the user may push to the repository. Frozen repositories
    /// accept no pushes.
    pub fn can_push(&self, user: &UserModel, repository: &RepositoryModel) -> bool {
        !repository.is_frozen
            && self.can_access(user, repository, AccessRestriction::Push, AccessPermission::Push)
    }

    /// Check if members of `team` may clone the repository through the
    /// team's own grants.
    pub fn team_can_clone(team: &TeamModel, repository: &RepositoryModel) -> bool {
        let restriction = repository.access_restriction;
        if restriction.at_least(AccessRestriction::Clone) {
            Self::team_permission(team, repository)
                .permission
                .at_least(AccessPermission::Clone)
        } else {
            true
        }
    }

    /// Check if the user may fork the repository.
    pub fn can_fork(&self, user: &UserModel, repository: &RepositoryModel) -> bool {
        repository.allow_forks
            && self.can_fork_repositories(user)
            && self.can_clone(user, repository)
    }

    /// Every repository grant `user` holds, with its source.
    ///
    /// Explicit grants naming a repository for which `exists` returns false
    /// are reported as [`PermissionKind::Missing`]. Ownership of any model
    /// in `repositories` is reported as [`PermissionKind::Owner`].
    pub fn user_access_permissions(
        &self,
        user: &UserModel,
        repositories: &[RepositoryModel],
        exists: impl Fn(&str) -> bool,
    ) -> Vec<RegistrantAccessPermission> {
        if user.username.is_empty() {
            return Vec::new();
        }

        let mut entries = Vec::new();
        if !user.can_admin {
            for (key, permission) in &user.permissions {
                let entry = if user.is_my_personal_repository(key) {
                    RegistrantAccessPermission::inherited(
                        key.clone(),
                        RegistrantType::Repository,
                        AccessPermission::Rewind,
                        PermissionKind::Owner,
                        None,
                    )
                } else if is_name_pattern(key) {
                    RegistrantAccessPermission {
                        kind: PermissionKind::Regex,
                        source: Some(key.clone()),
                        ..RegistrantAccessPermission::explicit(
                            key.clone(),
                            RegistrantType::Repository,
                            *permission,
                        )
                    }
                } else {
                    let mut entry = RegistrantAccessPermission::explicit(
                        key.clone(),
                        RegistrantType::Repository,
                        *permission,
                    );
                    if !exists(key) {
                        entry.demote_missing();
                    }
                    entry
                };
                entries.push(entry);
            }
            for team in self.teams_of(user) {
                for (key, permission) in &team.permissions {
                    entries.push(RegistrantAccessPermission::inherited(
                        key.clone(),
                        RegistrantType::Repository,
                        *permission,
                        PermissionKind::Team,
                        Some(team.name.clone()),
                    ));
                }
            }
        }

        for repository in repositories {
            if repository.is_users_personal_repository(&user.username)
                || repository.is_owner(&user.username)
            {
                entries.push(RegistrantAccessPermission::inherited(
                    repository.name.clone(),
                    RegistrantType::Repository,
                    AccessPermission::Rewind,
                    PermissionKind::Owner,
                    None,
                ));
            }
        }

        dedupe_by_registrant(entries)
    }

    /// Every user holding a grant on `repository`.
    ///
    /// Empty when the repository is open to everyone or to every
    /// authenticated user. Levels implied by the access restriction alone
    /// are not listed.
    pub fn repository_user_permissions(
        &self,
        repository: &RepositoryModel,
    ) -> Vec<RegistrantAccessPermission> {
        if repository.access_restriction == AccessRestriction::None
            || repository.authorization_control == AuthorizationControl::Authenticated
        {
            return Vec::new();
        }
        let entries = self
            .directory
            .users()
            .iter()
            .map(|user| self.user_permission(user, repository))
            .filter(|p| p.kind != PermissionKind::Anonymous)
            .filter(|p| p.permission.exceeds(AccessPermission::None))
            .collect();
        dedupe_by_registrant(entries)
    }

    /// Every team holding a grant on `repository`.
    pub fn repository_team_permissions(
        &self,
        repository: &RepositoryModel,
    ) -> Vec<RegistrantAccessPermission> {
        let entries = self
            .directory
            .teams()
            .iter()
            .map(|team| Self::team_permission(team, repository))
            .filter(|p| p.kind != PermissionKind::Anonymous)
            .filter(|p| p.permission.exceeds(AccessPermission::None))
            .collect();
        dedupe_by_registrant(entries)
    }

    /// Write the editable entries of `permissions` back to their users.
    pub fn set_user_access_permissions(
        &self,
        repository: &RepositoryModel,
        permissions: &[RegistrantAccessPermission],
    ) -> Result<()> {
        let mut users = Vec::new();
        for entry in permissions.iter().filter(|p| p.mutable) {
            let mut user = self
                .directory
                .user(&entry.registrant)
                .ok_or_else(|| AuthError::NotFound(format!("user {}", entry.registrant)))?;
            user.set_repository_permission(&repository.name, entry.permission);
            users.push(user);
        }
        self.directory.update_users(users)
    }

    /// Write the editable entries of `permissions` back to their teams.
    pub fn set_team_access_permissions(
        &self,
        repository: &RepositoryModel,
        permissions: &[RegistrantAccessPermission],
    ) -> Result<()> {
        let mut teams = Vec::new();
        for entry in permissions.iter().filter(|p| p.mutable) {
            let mut team = self
                .directory
                .team(&entry.registrant)
                .ok_or_else(|| AuthError::NotFound(format!("team {}", entry.registrant)))?;
            team.set_repository_permission(&repository.name, entry.permission);
            teams.push(team);
        }
        self.directory.update_teams(teams)
    }
}

/// Keeps one entry per registrant: the highest level, ties going to the
/// higher-priority source. Returns the entries sorted.
fn dedupe_by_registrant(
    entries: Vec<RegistrantAccessPermission>,
) -> Vec<RegistrantAccessPermission> {
    let mut by_registrant: HashMap<String, RegistrantAccessPermission> = HashMap::new();
    for entry in entries {
        let key = cache_key(&entry.registrant);
        match by_registrant.get(&key) {
            Some(current)
                if (current.permission, current.kind.priority())
                    >= (entry.permission, entry.kind.priority()) => {}
            _ => {
                by_registrant.insert(key, entry);
            }
        }
    }
    let mut entries: Vec<_> = by_registrant.into_values().collect();
    entries.sort();
    entries
}
