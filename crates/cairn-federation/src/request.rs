//! Federation request kinds.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Operation a peer asks this instance to perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FederationRequest {
    /// Connectivity check.
    Poke,
    /// Submit a proposal.
    Proposal,
    /// List repositories to pull.
    PullRepositories,
    /// List user accounts.
    PullUsers,
    /// List teams.
    PullTeams,
    /// Read instance settings.
    PullSettings,
    /// Read hook scripts.
    PullScripts,
    /// Report the outcome of a pull.
    Status,
}

impl FederationRequest {
    const VALUES: [FederationRequest; 8] = [
        FederationRequest::Poke,
        FederationRequest::Proposal,
        FederationRequest::PullRepositories,
        FederationRequest::PullUsers,
        FederationRequest::PullTeams,
        FederationRequest::PullSettings,
        FederationRequest::PullScripts,
        FederationRequest::Status,
    ];

    /// Wire name of the request.
    pub fn name(&self) -> &'static str {
        match self {
            FederationRequest::Poke => "POKE",
            FederationRequest::Proposal => "PROPOSAL",
            FederationRequest::PullRepositories => "PULL_REPOSITORIES",
            FederationRequest::PullUsers => "PULL_USERS",
            FederationRequest::PullTeams => "PULL_TEAMS",
            FederationRequest::PullSettings => "PULL_SETTINGS",
            FederationRequest::PullScripts => "PULL_SCRIPTS",
            FederationRequest::Status => "STATUS",
        }
    }

    /// Parse a wire name, case-insensitively. Unknown names yield `None`.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::VALUES
            .into_iter()
            .find(|r| r.name().eq_ignore_ascii_case(name.trim()))
    }

    /// URL a peer at `base_url` serves this request on.
    pub fn link(&self, base_url: &str, token: &str) -> String {
        format!(
            "{}/federation/?req={}&token={}",
            base_url.trim_end_matches('/'),
            self.name().to_lowercase(),
            token
        )
    }
}

impl fmt::Display for FederationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_name() {
        assert_eq!(
            FederationRequest::from_name("pull_repositories"),
            Some(FederationRequest::PullRepositories)
        );
        assert_eq!(FederationRequest::from_name("STATUS"), Some(FederationRequest::Status));
        assert_eq!(FederationRequest::from_name("PULL_EVERYTHING"), None);
        assert_eq!(FederationRequest::from_name(""), None);
    }

    #[test]
    fn test_link() {
        assert_eq!(
            FederationRequest::PullRepositories.link("https://peer.example/", "abc"),
            "https://peer.example/federation/?req=pull_repositories&token=abc"
        );
    }
}
