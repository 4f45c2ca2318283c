//! User directory capability and its in-memory implementation.

use crate::{AuthError, Result, TeamModel, UserModel};
use cairn_types::cache_key;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// Lookup and persistence of users, teams and their repository roles.
///
/// A repository role is a grant keyed by the repository's exact name.
pub trait UserDirectory: Send + Sync {
    /// Look up a user, ignoring case.
    fn user(&self, username: &str) -> Option<UserModel>;

    /// Look up a team, ignoring case.
    fn team(&self, name: &str) -> Option<TeamModel>;

    /// All users, ordered by name.
    fn users(&self) -> Vec<UserModel>;

    /// All teams, ordered by name.
    fn teams(&self) -> Vec<TeamModel>;

    /// Teams `username` belongs to.
    fn teams_of(&self, username: &str) -> Vec<TeamModel> {
        self.teams()
            .into_iter()
            .filter(|t| t.has_user(username))
            .collect()
    }

    /// Insert or replace a user.
    fn update_user(&self, user: UserModel) -> Result<()>;

    /// Insert or replace several users.
    fn update_users(&self, users: Vec<UserModel>) -> Result<()> {
        for user in users {
            self.update_user(user)?;
        }
        Ok(())
    }

    /// Insert or replace a team.
    fn update_team(&self, team: TeamModel) -> Result<()>;

    /// Insert or replace several teams.
    fn update_teams(&self, teams: Vec<TeamModel>) -> Result<()> {
        for team in teams {
            self.update_team(team)?;
        }
        Ok(())
    }

    /// Remove a user and its team memberships.
    fn delete_user(&self, username: &str) -> Result<()>;

    /// Users holding a role on `repository`.
    fn usernames_with_role(&self, repository: &str) -> Vec<String> {
        self.users()
            .into_iter()
            .filter(|u| u.has_repository_permission(repository))
            .map(|u| u.username)
            .collect()
    }

    /// Teams holding a role on `repository`.
    fn teamnames_with_role(&self, repository: &str) -> Vec<String> {
        self.teams()
            .into_iter()
            .filter(|t| t.has_repository_permission(repository))
            .map(|t| t.name)
            .collect()
    }

    /// Move every role on `old` to `new`.
    fn rename_role(&self, old: &str, new: &str) -> Result<()>;

    /// Drop every role on `repository`.
    fn delete_role(&self, repository: &str) -> Result<()>;
}

/// In-memory user directory.
#[derive(Debug, Default)]
pub struct MemoryUserDirectory {
    users: RwLock<HashMap<String, UserModel>>,
    teams: RwLock<HashMap<String, TeamModel>>,
    fail_role_renames: AtomicBool,
}

impl MemoryUserDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent [`UserDirectory::rename_role`] fail.
    pub fn fail_role_renames(&self, fail: bool) {
        self.fail_role_renames.store(fail, Ordering::SeqCst);
    }
}

impl UserDirectory for MemoryUserDirectory {
    fn user(&self, username: &str) -> Option<UserModel> {
        self.users.read().get(&cache_key(username)).cloned()
    }

    fn team(&self, name: &str) -> Option<TeamModel> {
        self.teams.read().get(&cache_key(name)).cloned()
    }

    fn users(&self) -> Vec<UserModel> {
        let mut users: Vec<_> = self.users.read().values().cloned().collect();
        users.sort_by(|a, b| cache_key(&a.username).cmp(&cache_key(&b.username)));
        users
    }

    fn teams(&self) -> Vec<TeamModel> {
        let mut teams: Vec<_> = self.teams.read().values().cloned().collect();
        teams.sort_by(|a, b| cache_key(&a.name).cmp(&cache_key(&b.name)));
        teams
    }

    fn update_user(&self, user: UserModel) -> Result<()> {
        if user.username.trim().is_empty() {
            return Err(AuthError::InvalidInput("empty username".into()));
        }
        self.users.write().insert(cache_key(&user.username), user);
        Ok(())
    }

    fn update_team(&self, team: TeamModel) -> Result<()> {
        if team.name.trim().is_empty() {
            return Err(AuthError::InvalidInput("empty team name".into()));
        }
        self.teams.write().insert(cache_key(&team.name), team);
        Ok(())
    }

    fn delete_user(&self, username: &str) -> Result<()> {
        if self.users.write().remove(&cache_key(username)).is_none() {
            return Err(AuthError::NotFound(format!("user {}", username)));
        }
        for team in self.teams.write().values_mut() {
            team.remove_user(username);
        }
        Ok(())
    }

    fn rename_role(&self, old: &str, new: &str) -> Result<()> {
        if self.fail_role_renames.load(Ordering::SeqCst) {
            return Err(AuthError::Persistence(format!(
                "failed to rename role {} to {}",
                old, new
            )));
        }
        let mut moved = 0usize;
        for user in self.users.write().values_mut() {
            moved += usize::from(user.rename_repository_permission(old, new));
        }
        for team in self.teams.write().values_mut() {
            moved += usize::from(team.rename_repository_permission(old, new));
        }
        debug!(from = %old, to = %new, moved, "Renamed repository role");
        Ok(())
    }

    fn delete_role(&self, repository: &str) -> Result<()> {
        for user in self.users.write().values_mut() {
            user.remove_repository_permission(repository);
        }
        for team in self.teams.write().values_mut() {
            team.remove_repository_permission(repository);
        }
        debug!(repository = %repository, "Deleted repository role");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::AccessPermission;

    fn directory() -> MemoryUserDirectory {
        let directory = MemoryUserDirectory::new();
        directory
            .update_user(UserModel::new("Alice").with_permission("proj/a.git", AccessPermission::Push))
            .unwrap();
        directory.update_user(UserModel::new("bob")).unwrap();

        let mut team = TeamModel::new("dev");
        team.add_user("alice");
        team.set_repository_permission("proj/a.git", AccessPermission::Clone);
        directory.update_team(team).unwrap();
        directory
    }

    #[test]
    fn test_lookup_ignores_case() {
        let directory = directory();
        assert!(directory.user("ALICE").is_some());
        assert!(directory.team("Dev").is_some());
        assert_eq!(directory.teams_of("alice").len(), 1);
        assert!(directory.teams_of("bob").is_empty());
    }

    #[test]
    fn test_roles() {
        let directory = directory();
        assert_eq!(directory.usernames_with_role("proj/a.git"), vec!["Alice"]);
        assert_eq!(directory.teamnames_with_role("proj/a.git"), vec!["dev"]);

        directory.rename_role("proj/a.git", "proj/b.git").unwrap();
        assert!(directory.usernames_with_role("proj/a.git").is_empty());
        assert_eq!(directory.usernames_with_role("proj/b.git"), vec!["Alice"]);
        assert_eq!(directory.teamnames_with_role("proj/b.git"), vec!["dev"]);

        directory.delete_role("proj/b.git").unwrap();
        assert!(directory.usernames_with_role("proj/b.git").is_empty());
        assert!(directory.teamnames_with_role("proj/b.git").is_empty());
    }

    #[test]
    fn test_injected_rename_failure() {
        let directory = directory();
        directory.fail_role_renames(true);
        assert!(matches!(
            directory.rename_role("proj/a.git", "proj/b.git"),
            Err(AuthError::Persistence(_))
        ));
        assert_eq!(directory.usernames_with_role("proj/a.git"), vec!["Alice"]);
    }

    #[test]
    fn test_delete_user() {
        let directory = directory();
        directory.delete_user("alice").unwrap();
        assert!(directory.user("alice").is_none());
        assert!(directory.teams_of("alice").is_empty());
        assert!(matches!(directory.delete_user("alice"), Err(AuthError::NotFound(_))));
    }
}
