//! Federation settings.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

const MIN_FREQUENCY_MINUTES: u64 = 5;
const DEFAULT_FREQUENCY_MINUTES: u64 = 60;

/// A peer this instance pulls from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationSettings {
    /// Base URL of the peer.
    pub url: String,
    /// Token the peer issued to this instance.
    pub token: String,
    /// Pull period such as `60 mins` or `2 hours`. Falls back to the
    /// default frequency.
    pub frequency: Option<String>,
    /// Local folder the peer's repositories are placed under.
    pub folder: String,
    /// Clone as bare repositories.
    pub bare: bool,
    /// Freeze pulled repositories so they only change by pulling.
    pub mirror: bool,
    /// Report the pull outcome back to the peer.
    pub send_status: bool,
    /// Notify administrators when the pull status degrades.
    pub notify_on_error: bool,
    /// Repository name patterns to pull even when `*` is excluded.
    pub inclusions: Vec<String>,
    /// Repository name patterns never pulled. `*` excludes everything
    /// not listed in `inclusions`.
    pub exclusions: Vec<String>,
}

impl Default for RegistrationSettings {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            frequency: None,
            folder: String::new(),
            bare: true,
            mirror: true,
            send_status: false,
            notify_on_error: false,
            inclusions: Vec::new(),
            exclusions: Vec::new(),
        }
    }
}

/// Settings of the federation component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FederationSettings {
    /// Name this instance identifies itself with when reporting status.
    pub name: String,
    /// Public base URL of this instance.
    pub url: String,
    /// Shared secret all tokens derive from. Empty disables inbound
    /// federation.
    pub passphrase: String,
    /// Named federation sets.
    pub sets: Vec<String>,
    /// Folder pending proposals are stored in.
    pub proposals_folder: PathBuf,
    /// Accept proposals from peers.
    pub allow_proposals: bool,
    /// Pull period for registrations without their own.
    pub default_frequency: String,
    /// Peers to pull from, by name.
    pub registrations: BTreeMap<String, RegistrationSettings>,
}

impl Default for FederationSettings {
    fn default() -> Self {
        Self {
            name: String::new(),
            url: String::new(),
            passphrase: String::new(),
            sets: Vec::new(),
            proposals_folder: PathBuf::from("proposals"),
            allow_proposals: false,
            default_frequency: format!("{} mins", DEFAULT_FREQUENCY_MINUTES),
            registrations: BTreeMap::new(),
        }
    }
}

impl FederationSettings {
    /// Name sent to peers with status reports.
    pub fn identification(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.url
        } else {
            &self.name
        }
    }
}

/// Converts a frequency such as `90 mins`, `2 hours` or `1 day` to
/// minutes.
///
/// Unparseable values fall back to `default_minutes`. Results are never
/// below five minutes.
pub fn frequency_minutes(frequency: &str, default_minutes: u64) -> u64 {
    let frequency = frequency.trim().to_lowercase();
    if frequency.is_empty() {
        return default_minutes.max(MIN_FREQUENCY_MINUTES);
    }
    let number = frequency.split_whitespace().next().unwrap_or_default();
    let mut minutes = number
        .parse::<f64>()
        .map(|n| n as u64)
        .unwrap_or(default_minutes)
        .max(MIN_FREQUENCY_MINUTES);
    if frequency.contains("day") {
        minutes *= 24 * 60;
    } else if frequency.contains("hour") {
        minutes *= 60;
    }
    minutes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequency_minutes() {
        assert_eq!(frequency_minutes("90 mins", 60), 90);
        assert_eq!(frequency_minutes("2 hours", 60), 120);
        assert_eq!(frequency_minutes("1 day", 60), 1440);
        assert_eq!(frequency_minutes("1 min", 60), 5);
        assert_eq!(frequency_minutes("often", 60), 60);
        assert_eq!(frequency_minutes("", 60), 60);
    }

    #[test]
    fn test_defaults() {
        let settings = FederationSettings::default();
        assert!(settings.passphrase.is_empty());
        assert!(!settings.allow_proposals);
        assert_eq!(frequency_minutes(&settings.default_frequency, 0), 60);

        let registration = RegistrationSettings::default();
        assert!(registration.bare);
        assert!(registration.mirror);
    }

    #[test]
    fn test_identification_falls_back_to_url() {
        let mut settings = FederationSettings {
            url: "https://git.example".into(),
            ..Default::default()
        };
        assert_eq!(settings.identification(), "https://git.example");
        settings.name = "east".into();
        assert_eq!(settings.identification(), "east");
    }
}
