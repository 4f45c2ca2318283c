//! Federation data model.

use crate::settings::{frequency_minutes, RegistrationSettings};
use crate::token::FederationToken;
use cairn_types::{matches_ignore_case, RepositoryModel};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Outcome of pulling one repository, worst first.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FederationPullStatus {
    /// Not pulled yet.
    #[default]
    Pending,
    /// The pull failed.
    Failed,
    /// Skipped: empty, busy, or a local repository of the same name.
    Skipped,
    /// Fetched new changes.
    Pulled,
    /// Cloned, or fetched new changes into a mirror.
    Mirrored,
    /// Fetched without new changes.
    NoChange,
    /// Filtered out by the registration.
    Excluded,
}

impl fmt::Display for FederationPullStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            FederationPullStatus::Pending => "PENDING",
            FederationPullStatus::Failed => "FAILED",
            FederationPullStatus::Skipped => "SKIPPED",
            FederationPullStatus::Pulled => "PULLED",
            FederationPullStatus::Mirrored => "MIRRORED",
            FederationPullStatus::NoChange => "NOCHANGE",
            FederationPullStatus::Excluded => "EXCLUDED",
        })
    }
}

/// Case-insensitive match where `*` stands for any run of characters.
pub fn wildcard_matches(name: &str, pattern: &str) -> bool {
    let regex = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    matches_ignore_case(name, &regex)
}

/// A registered peer and the state of pulling from it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationModel {
    /// Registration name.
    pub name: String,
    /// Base URL of the peer. For results reported by peers, their
    /// identification.
    pub url: String,
    /// Token the peer issued.
    pub token: String,
    /// Local folder for pulled repositories.
    #[serde(default)]
    pub folder: String,
    /// Pull period in minutes.
    pub frequency: u64,
    /// Clone as bare repositories.
    #[serde(default)]
    pub bare: bool,
    /// Freeze pulled repositories.
    #[serde(default)]
    pub mirror: bool,
    /// Report the outcome back to the peer.
    #[serde(default)]
    pub send_status: bool,
    /// Notify administrators when the status degrades.
    #[serde(default)]
    pub notify_on_error: bool,
    /// Name patterns pulled even when everything is excluded.
    #[serde(default)]
    pub inclusions: Vec<String>,
    /// Name patterns never pulled.
    #[serde(default)]
    pub exclusions: Vec<String>,
    /// Start of the last pull, seconds since the epoch.
    #[serde(default)]
    pub last_pull: u64,
    /// Earliest time of the next pull, seconds since the epoch.
    #[serde(default)]
    pub next_pull: u64,
    /// Outcome per remote repository name.
    #[serde(default)]
    pub statuses: BTreeMap<String, FederationPullStatus>,
}

impl FederationModel {
    /// Creates a registration pulled every hour.
    pub fn new(name: impl Into<String>, url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
            token: token.into(),
            folder: String::new(),
            frequency: 60,
            bare: true,
            mirror: true,
            send_status: false,
            notify_on_error: false,
            inclusions: Vec::new(),
            exclusions: Vec::new(),
            last_pull: 0,
            next_pull: 0,
            statuses: BTreeMap::new(),
        }
    }

    /// Builds a registration from settings.
    pub fn from_settings(
        name: &str,
        settings: &RegistrationSettings,
        default_frequency: &str,
    ) -> Self {
        let default_minutes = frequency_minutes(default_frequency, 60);
        let frequency = settings
            .frequency
            .as_deref()
            .map(|f| frequency_minutes(f, default_minutes))
            .unwrap_or(default_minutes);
        Self {
            folder: settings.folder.trim().to_string(),
            frequency,
            bare: settings.bare,
            mirror: settings.mirror,
            send_status: settings.send_status,
            notify_on_error: settings.notify_on_error,
            inclusions: settings.inclusions.clone(),
            exclusions: settings.exclusions.clone(),
            ..Self::new(name, settings.url.trim_end_matches('/'), settings.token.clone())
        }
    }

    /// Whether `repository` passes the inclusion and exclusion patterns.
    pub fn is_included(&self, repository: &str) -> bool {
        if self.exclusions.iter().any(|e| e == "*") {
            return self
                .inclusions
                .iter()
                .any(|pattern| wildcard_matches(repository, pattern));
        }
        !self
            .exclusions
            .iter()
            .any(|pattern| wildcard_matches(repository, pattern))
    }

    /// Records the outcome for `repository`.
    pub fn update_status(&mut self, repository: &str, status: FederationPullStatus) {
        self.statuses.insert(repository.to_string(), status);
    }

    /// Worst outcome over all repositories, `Pending` before the first pull.
    pub fn status(&self) -> FederationPullStatus {
        self.statuses
            .values()
            .copied()
            .min()
            .unwrap_or(FederationPullStatus::Pending)
    }

    /// Whether a pull is due at `now`.
    pub fn is_due(&self, now: u64) -> bool {
        self.next_pull <= now
    }

    /// Sets the next pull one period after `now`.
    pub fn schedule_next(&mut self, now: u64) {
        self.next_pull = now + self.frequency * 60;
    }
}

/// An offer from a peer to be pulled from, awaiting an administrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationProposal {
    /// Base URL of the proposing peer.
    pub url: String,
    /// Message for the administrator.
    #[serde(default)]
    pub message: String,
    /// Token the peer issued for pulling from it. Names the proposal.
    pub token: String,
    /// Scope of `token`.
    pub token_type: FederationToken,
    /// Arrival time, seconds since the epoch.
    #[serde(default)]
    pub received: u64,
    /// Repositories offered, by clone URL.
    #[serde(default)]
    pub repositories: BTreeMap<String, RepositoryModel>,
}

impl FederationProposal {
    /// Creates a proposal received at `received`.
    pub fn new(
        url: impl Into<String>,
        token_type: FederationToken,
        token: impl Into<String>,
        repositories: BTreeMap<String, RepositoryModel>,
        received: u64,
    ) -> Self {
        Self {
            url: url.into(),
            message: String::new(),
            token: token.into(),
            token_type,
            received,
            repositories,
        }
    }
}

/// A token of this instance together with what it exposes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FederationSet {
    /// Scope or set name.
    pub name: String,
    /// Breadth of the token.
    pub token_type: FederationToken,
    /// The token.
    pub token: String,
    /// Repositories offered, by clone URL.
    pub repositories: BTreeMap<String, RepositoryModel>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wildcard_matches() {
        assert!(wildcard_matches("proj/a.git", "proj/*"));
        assert!(wildcard_matches("PROJ/a.git", "proj/*"));
        assert!(wildcard_matches("proj/a.git", "*"));
        assert!(wildcard_matches("proj/a.git", "proj/a.git"));
        assert!(!wildcard_matches("proj/ab.git", "proj/a.git"));
        assert!(!wildcard_matches("other/a.git", "proj/*"));
    }

    #[test]
    fn test_is_included() {
        let mut registration = FederationModel::new("peer", "https://peer", "t");
        assert!(registration.is_included("proj/a.git"));

        registration.exclusions = vec!["secret/*".into()];
        assert!(!registration.is_included("secret/a.git"));
        assert!(registration.is_included("proj/a.git"));

        registration.exclusions = vec!["*".into()];
        registration.inclusions = vec!["proj/*".into()];
        assert!(registration.is_included("proj/a.git"));
        assert!(!registration.is_included("other/a.git"));
    }

    #[test]
    fn test_status_is_worst_outcome() {
        let mut registration = FederationModel::new("peer", "https://peer", "t");
        assert_eq!(registration.status(), FederationPullStatus::Pending);

        registration.update_status("a.git", FederationPullStatus::Mirrored);
        registration.update_status("b.git", FederationPullStatus::Excluded);
        assert_eq!(registration.status(), FederationPullStatus::Mirrored);

        registration.update_status("c.git", FederationPullStatus::Failed);
        assert_eq!(registration.status(), FederationPullStatus::Failed);
    }

    #[test]
    fn test_from_settings() {
        let settings = RegistrationSettings {
            url: "https://peer.example/".into(),
            token: "abc".into(),
            frequency: Some("2 hours".into()),
            folder: " peer ".into(),
            ..Default::default()
        };
        let registration = FederationModel::from_settings("peer", &settings, "60 mins");
        assert_eq!(registration.url, "https://peer.example");
        assert_eq!(registration.folder, "peer");
        assert_eq!(registration.frequency, 120);
        assert!(registration.bare);

        let settings = RegistrationSettings::default();
        let registration = FederationModel::from_settings("other", &settings, "30 mins");
        assert_eq!(registration.frequency, 30);
    }

    #[test]
    fn test_schedule_next() {
        let mut registration = FederationModel::new("peer", "https://peer", "t");
        assert!(registration.is_due(0));
        registration.frequency = 10;
        registration.schedule_next(1_000);
        assert_eq!(registration.next_pull, 1_600);
        assert!(!registration.is_due(1_599));
        assert!(registration.is_due(1_600));
    }
}
