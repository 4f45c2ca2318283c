//! Federation tokens.
//!
//! A token is the hex SHA-1 of `passphrase + "-" + scope`. Tokens are
//! recomputed on demand and never stored, so changing the passphrase
//! revokes every token issued before.

use serde::{Deserialize, Serialize};
use sha1::{Digest, Sha1};
use std::fmt;

/// Breadth of a federation token.
///
/// `All` grants everything `UsersAndRepositories` grants, which grants
/// everything `Repositories` grants. Named federation sets are as broad
/// as `Repositories` but limited to the repositories tagged with the set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FederationToken {
    /// Repositories, users, teams, settings and scripts.
    All,
    /// Repositories, users and teams.
    UsersAndRepositories,
    /// Repositories only.
    Repositories,
}

impl FederationToken {
    /// Every standard scope, broadest first.
    pub const VALUES: [FederationToken; 3] = [
        FederationToken::All,
        FederationToken::UsersAndRepositories,
        FederationToken::Repositories,
    ];

    /// Scope name mixed into the token.
    pub fn name(&self) -> &'static str {
        match self {
            FederationToken::All => "ALL",
            FederationToken::UsersAndRepositories => "USERS_AND_REPOSITORIES",
            FederationToken::Repositories => "REPOSITORIES",
        }
    }

    /// Parse a scope name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::VALUES
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for FederationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Derives the token for `value` (a scope or set name) under `passphrase`.
pub fn derive_token(passphrase: &str, value: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(passphrase.as_bytes());
    hasher.update(b"-");
    hasher.update(value.as_bytes());
    hex::encode(hasher.finalize())
}
