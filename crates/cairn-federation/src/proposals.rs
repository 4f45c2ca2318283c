//! Pending proposals, one JSON file each.
//!
//! The folder is the source of truth: nothing is cached in memory, so a
//! proposal deleted on disk is gone for every reader.

use crate::error::{FederationError, Result};
use crate::model::FederationProposal;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File extension of proposal files.
pub const PROPOSAL_EXT: &str = ".proposal";

/// Folder of proposal files named `<token>.proposal`.
#[derive(Debug, Clone)]
pub struct ProposalStore {
    folder: PathBuf,
}

impl ProposalStore {
    /// Uses `folder`, created on the first write.
    pub fn new(folder: impl Into<PathBuf>) -> Self {
        Self {
            folder: folder.into(),
        }
    }

    /// The proposals folder.
    pub fn folder(&self) -> &Path {
        &self.folder
    }

    fn path_for(&self, token: &str) -> Result<PathBuf> {
        let valid = !token.is_empty()
            && token
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(FederationError::Unauthorized);
        }
        Ok(self.folder.join(format!("{}{}", token, PROPOSAL_EXT)))
    }

    /// Writes `proposal`, replacing any proposal with the same token.
    pub fn save(&self, proposal: &FederationProposal) -> Result<PathBuf> {
        let path = self.path_for(&proposal.token)?;
        let json = serde_json::to_string_pretty(proposal)?;
        fs::create_dir_all(&self.folder)
            .and_then(|_| fs::write(&path, json))
            .map_err(|e| {
                FederationError::PersistenceFailure(format!(
                    "failed to write {}: {}",
                    path.display(),
                    e
                ))
            })?;
        debug!(path = %path.display(), "saved proposal");
        Ok(path)
    }

    /// Reads the proposal for `token`.
    pub fn load(&self, token: &str) -> Result<Option<FederationProposal>> {
        let path = self.path_for(token)?;
        match fs::read_to_string(&path) {
            Ok(json) => Ok(Some(serde_json::from_str(&json)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Every readable proposal in the folder, oldest first.
    ///
    /// Files that do not parse are logged and skipped.
    pub fn list(&self) -> Result<Vec<FederationProposal>> {
        let entries = match fs::read_dir(&self.folder) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut proposals = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_proposal = path.is_file()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.to_lowercase().ends_with(PROPOSAL_EXT));
            if !is_proposal {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(FederationError::from)
                .and_then(|json| Ok(serde_json::from_str::<FederationProposal>(&json)?));
            match parsed {
                Ok(proposal) => proposals.push(proposal),
                Err(e) => warn!(path = %path.display(), error = %e, "ignoring unreadable proposal"),
            }
        }
        proposals.sort_by(|a, b| a.received.cmp(&b.received).then(a.token.cmp(&b.token)));
        Ok(proposals)
    }

    /// Deletes the proposal for `token`. Returns whether it existed.
    pub fn delete(&self, token: &str) -> Result<bool> {
        let path = self.path_for(token)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}
