//! Project and fork-network views.

use crate::names::{compare_repository_names, PERSONAL_PREFIX};
use crate::repository::RepositoryModel;
use serde::{Deserialize, Serialize};

/// A grouping of repositories sharing a first path segment.
///
/// Project repository lists are views computed per caller and are never
/// shared between users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectModel {
    /// Project name (first path segment, `""` aliases the root project).
    pub name: String,
    /// Display title override.
    pub title: Option<String>,
    /// Description override.
    pub description: Option<String>,
    /// Repository names visible in this view.
    pub repositories: Vec<String>,
    /// Whether this is the root project.
    pub is_root: bool,
    /// Most recent change across the visible repositories.
    pub last_change: u64,
}

impl ProjectModel {
    /// Creates an empty project.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            title: None,
            description: None,
            repositories: Vec::new(),
            is_root: false,
            last_change: 0,
        }
    }

    /// Creates the root project.
    pub fn root(name: impl Into<String>) -> Self {
        Self {
            is_root: true,
            ..Self::new(name)
        }
    }

    /// Adds a repository name, ignoring duplicates.
    pub fn add_repository(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self
            .repositories
            .iter()
            .any(|r| r.eq_ignore_ascii_case(&name))
        {
            self.repositories.push(name);
        }
    }

    /// Adds a repository model, tracking the latest change.
    pub fn add_repository_model(&mut self, model: &RepositoryModel) {
        self.add_repository(model.name.clone());
        self.last_change = self.last_change.max(model.last_change);
    }

    /// Whether this is a personal project (`~alice`).
    pub fn is_user_project(&self) -> bool {
        self.name.starts_with(PERSONAL_PREFIX)
    }

    /// Title if set, otherwise the name.
    pub fn display_name(&self) -> &str {
        self.title.as_deref().filter(|t| !t.is_empty()).unwrap_or(&self.name)
    }
}

/// A node in a fork network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForkModel {
    /// The repository at this node.
    pub repository: RepositoryModel,
    /// Forks of this repository.
    pub forks: Vec<ForkModel>,
}

impl ForkModel {
    /// Creates a leaf node.
    pub fn new(repository: RepositoryModel) -> Self {
        Self {
            repository,
            forks: Vec::new(),
        }
    }

    /// Whether this node has no origin.
    pub fn is_root(&self) -> bool {
        self.repository.origin_repository.is_none()
    }

    /// Whether this node has forks.
    pub fn is_node(&self) -> bool {
        !self.forks.is_empty()
    }

    /// Total number of repositories in this subtree, including this one.
    pub fn count(&self) -> usize {
        1 + self.forks.iter().map(ForkModel::count).sum::<usize>()
    }

    /// Sorts children by name, recursively.
    pub fn sort(&mut self) {
        self.forks
            .sort_by(|a, b| compare_repository_names(&a.repository.name, &b.repository.name));
        for fork in &mut self.forks {
            fork.sort();
        }
    }
}
