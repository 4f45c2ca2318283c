//! Per-repository key/value configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Key prefix under which operator-defined fields are stored.
pub const CUSTOM_PREFIX: &str = "custom.";

/// Flat `section.key -> value` configuration of a single repository.
///
/// Keys are matched exactly. Multi-valued settings are stored as a
/// comma-separated list.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryConfig {
    entries: BTreeMap<String, String>,
}

impl RepositoryConfig {
    /// Creates an empty configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the raw value of a key.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns the value of a key or `default` when absent.
    pub fn get_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).unwrap_or(default)
    }

    /// Sets a key.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// Sets a key, or removes it when the value is empty.
    pub fn set_or_unset(&mut self, key: &str, value: Option<&str>) {
        match value {
            Some(v) if !v.is_empty() => self.set(key, v),
            _ => {
                self.unset(key);
            }
        }
    }

    /// Removes a key.
    pub fn unset(&mut self, key: &str) -> Option<String> {
        self.entries.remove(key)
    }

    /// Reads a boolean, falling back to `default` when absent or unparseable.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key).map(|v| v.trim().to_lowercase()) {
            Some(v) if v == "true" || v == "yes" || v == "on" || v == "1" => true,
            Some(v) if v == "false" || v == "no" || v == "off" || v == "0" => false,
            _ => default,
        }
    }

    /// Sets a boolean.
    pub fn set_bool(&mut self, key: &str, value: bool) {
        self.set(key, value.to_string());
    }

    /// Reads an integer, falling back to `default` when absent or unparseable.
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    /// Reads a comma-separated list, skipping blank items.
    pub fn get_list(&self, key: &str) -> Vec<String> {
        self.get(key)
            .map(|v| {
                v.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Writes a list, removing the key when it is empty.
    pub fn set_list<I, S>(&mut self, key: &str, values: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = values
            .into_iter()
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join(",");
        self.set_or_unset(key, Some(&joined));
    }

    /// Returns all operator-defined fields with the prefix stripped.
    pub fn custom_fields(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .filter_map(|(k, v)| {
                k.strip_prefix(CUSTOM_PREFIX)
                    .map(|field| (field.to_string(), v.clone()))
            })
            .collect()
    }

    /// Replaces all operator-defined fields.
    pub fn set_custom_fields(&mut self, fields: &BTreeMap<String, String>) {
        self.entries.retain(|k, _| !k.starts_with(CUSTOM_PREFIX));
        for (field, value) in fields {
            if !value.is_empty() {
                self.set(format!("{}{}", CUSTOM_PREFIX, field), value.clone());
            }
        }
    }

    /// Merges `other` over this configuration.
    pub fn merge(&mut self, other: &RepositoryConfig) {
        for (k, v) in &other.entries {
            self.entries.insert(k.clone(), v.clone());
        }
    }

    /// Iterates over all entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typed_accessors() {
        let mut config = RepositoryConfig::new();
        config.set("cairn.isFrozen", "TRUE");
        config.set("cairn.gcPeriod", " 7 ");
        config.set("cairn.gcThreshold", "lots");

        assert!(config.get_bool("cairn.isFrozen", false));
        assert!(config.get_bool("cairn.missing", true));
        assert_eq!(config.get_int("cairn.gcPeriod", 0), 7);
        assert_eq!(config.get_int("cairn.gcThreshold", 5), 5);
    }

    #[test]
    fn test_lists() {
        let mut config = RepositoryConfig::new();
        config.set_list("cairn.owner", ["alice", " ", "bob "]);
        assert_eq!(config.get("cairn.owner"), Some("alice,bob"));
        assert_eq!(config.get_list("cairn.owner"), vec!["alice", "bob"]);

        config.set_list("cairn.owner", Vec::<String>::new());
        assert!(config.get("cairn.owner").is_none());
    }

    #[test]
    fn test_custom_fields() {
        let mut config = RepositoryConfig::new();
        config.set("custom.stale", "x");
        config.set("cairn.description", "d");

        let mut fields = BTreeMap::new();
        fields.insert("team".to_string(), "infra".to_string());
        fields.insert("empty".to_string(), String::new());
        config.set_custom_fields(&fields);

        let read = config.custom_fields();
        assert_eq!(read.len(), 1);
        assert_eq!(read.get("team").map(String::as_str), Some("infra"));
        assert_eq!(config.get("cairn.description"), Some("d"));
    }

    #[test]
    fn test_serde_is_flat_map() {
        let mut config = RepositoryConfig::new();
        config.set("remote.origin.url", "https://example.com/a.git");
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(json, r#"{"remote.origin.url":"https://example.com/a.git"}"#);
        let back: RepositoryConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
