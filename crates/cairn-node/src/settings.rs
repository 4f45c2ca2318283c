//! Node settings.
//!
//! Settings are read from an optional YAML file, then overridden by
//! `CAIRN_` environment variables using `__` between sections
//! (`CAIRN_GIT__GC_HOUR=3`).

use crate::observability::LogFormat;
use cairn_auth::{TeamModel, UserModel};
use cairn_federation::FederationSettings;
use cairn_registry::{ProjectSettings, RegistrySettings};
use config::{Config, ConfigError, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Repository storage and registry settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GitSettings {
    /// Folder holding the repositories.
    pub repositories_folder: PathBuf,
    /// Run the daily garbage collection pass.
    pub enable_garbage_collection: bool,
    /// Hour of the day (UTC) the garbage collection pass starts.
    pub gc_hour: u32,
    /// Registry behavior.
    #[serde(flatten)]
    pub registry: RegistrySettings,
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            repositories_folder: PathBuf::from("git"),
            enable_garbage_collection: true,
            gc_hour: 0,
            registry: RegistrySettings::default(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,
    /// Output format.
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// All settings of a node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Repository storage and registry.
    pub git: GitSettings,
    /// Federation with other instances.
    pub federation: FederationSettings,
    /// Project title and description overrides, by project name.
    pub projects: BTreeMap<String, ProjectSettings>,
    /// Logging.
    pub logging: LoggingSettings,
    /// Accounts loaded into the user directory at startup.
    pub users: Vec<UserModel>,
    /// Teams loaded into the user directory at startup.
    pub teams: Vec<TeamModel>,
}

impl Settings {
    /// Loads settings from `path`, if given, and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).format(FileFormat::Yaml).required(true));
        }
        let settings: Settings = builder
            .add_source(
                Environment::with_prefix("CAIRN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Parses settings from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let settings: Settings = serde_yaml::from_str(yaml)
            .map_err(|e| ConfigError::Message(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.git.gc_hour > 23 {
            return Err(ConfigError::Message(format!(
                "git.gc_hour must be between 0 and 23, got {}",
                self.git.gc_hour
            )));
        }
        if self.git.repositories_folder.as_os_str().is_empty() {
            return Err(ConfigError::Message(
                "git.repositories_folder must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Registry settings with the project overrides applied.
    pub fn registry_settings(&self) -> RegistrySettings {
        let mut registry = self.git.registry.clone();
        registry.projects.extend(self.projects.clone());
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_types::AccessRestriction;
    use std::io::Write;

    const SAMPLE: &str = r#"
git:
  repositories_folder: /srv/git
  gc_hour: 3
  cache_repository_list: false
  exclusions: ["tmp/*"]
  default_access_restriction: CLONE
federation:
  passphrase: secret
  sets: [east]
  registrations:
    peer:
      url: https://peer.example
      token: abc
      frequency: 2 hours
projects:
  main:
    title: Main repositories
logging:
  level: debug
  format: json
users:
  - username: alice
    can_admin: true
"#;

    #[test]
    fn test_from_yaml() {
        let settings = Settings::from_yaml(SAMPLE).unwrap();
        assert_eq!(settings.git.repositories_folder, PathBuf::from("/srv/git"));
        assert_eq!(settings.git.gc_hour, 3);
        assert!(!settings.git.registry.cache_repository_list);
        assert_eq!(settings.git.registry.exclusions, vec!["tmp/*"]);
        assert_eq!(
            settings.git.registry.default_access_restriction,
            AccessRestriction::Clone
        );
        assert_eq!(settings.federation.passphrase, "secret");
        assert_eq!(
            settings.federation.registrations["peer"].frequency.as_deref(),
            Some("2 hours")
        );
        assert_eq!(settings.logging.format, LogFormat::Json);
        assert_eq!(settings.users.len(), 1);
        assert!(settings.users[0].can_admin);

        let registry = settings.registry_settings();
        assert_eq!(registry.projects["main"].title.as_deref(), Some("Main repositories"));
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::from_yaml("{}").unwrap();
        assert_eq!(settings.git.repositories_folder, PathBuf::from("git"));
        assert!(settings.git.enable_garbage_collection);
        assert!(settings.git.registry.cache_repository_list);
        assert_eq!(settings.logging.level, "info");
        assert!(settings.federation.registrations.is_empty());
    }

    #[test]
    fn test_invalid_gc_hour() {
        let err = Settings::from_yaml("git:\n  gc_hour: 24\n").unwrap_err();
        assert!(err.to_string().contains("gc_hour"));
    }

    #[test]
    fn test_load_file() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();
        let settings = Settings::load(Some(file.path())).unwrap();
        assert_eq!(settings.git.repositories_folder, PathBuf::from("/srv/git"));
        assert_eq!(settings.federation.sets, vec!["east"]);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(Settings::load(Some(&dir.path().join("missing.yaml"))).is_err());
    }
}
