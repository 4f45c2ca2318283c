//! Pulling repositories from registered peers.

use crate::client::FederationClient;
use crate::error::{FederationError, Result};
use crate::federation::Federation;
use crate::model::{FederationModel, FederationPullStatus};
use cairn_registry::{Registry, RegistryError};
use cairn_types::{strip_dot_git, FederationStrategy, RepositoryModel, DOT_GIT};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Outcome of one pull pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Registrations pulled.
    pub pulled: Vec<String>,
    /// Registrations that failed, with the reason.
    pub failed: Vec<(String, String)>,
}

/// Pulls every due registration of a [`Federation`].
pub struct FederationPuller {
    federation: Arc<Federation>,
    client: Arc<dyn FederationClient>,
    running: AtomicBool,
}

impl FederationPuller {
    /// Creates a puller talking to peers through `client`.
    pub fn new(federation: Arc<Federation>, client: Arc<dyn FederationClient>) -> Self {
        Self {
            federation,
            client,
            running: AtomicBool::new(false),
        }
    }

    /// Pulls every registration due at `now` (seconds since the epoch)
    /// and schedules its next pull.
    ///
    /// Returns an empty report if another pass is still running.
    pub async fn run_once(&self, now: u64) -> PullReport {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("federation pull is already running");
            return PullReport::default();
        }
        let mut report = PullReport::default();
        for mut registration in self.federation.registrations() {
            if !registration.is_due(now) {
                continue;
            }
            let name = registration.name.clone();
            match self.pull_registration(&mut registration, now).await {
                Ok(()) => report.pulled.push(name),
                Err(e) => {
                    error!(registration = %name, url = %registration.url, error = %e, "federation pull failed");
                    report.failed.push((name, e.to_string()));
                }
            }
            registration.schedule_next(now);
            self.federation.update_registration(registration);
        }
        self.running.store(false, Ordering::Release);
        report
    }

    async fn pull_registration(&self, registration: &mut FederationModel, now: u64) -> Result<()> {
        let start = Instant::now();
        let was = registration.status();
        info!(registration = %registration.name, url = %registration.url, "pulling federated repositories");

        self.pull(registration).await?;
        if registration.send_status {
            let identification = self.federation.settings().identification();
            if let Err(e) = self.client.acknowledge_status(identification, registration).await {
                warn!(registration = %registration.name, error = %e, "failed to send federation status");
            }
        }
        registration.last_pull = now;

        let is = registration.status();
        if is < was {
            warn!(registration = %registration.name, status = %is, "federation pull status degraded");
            if registration.notify_on_error {
                self.federation.notifier().notify_administrators(
                    &format!("Pull status of {} is {}", registration.name, is),
                    &format!(
                        "Federation pull of {} @ {} is now {}",
                        registration.name, registration.url, is
                    ),
                );
            }
        }
        info!(
            registration = %registration.name,
            status = %is,
            repositories = registration.statuses.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "finished federation pull"
        );
        Ok(())
    }

    async fn pull(&self, registration: &mut FederationModel) -> Result<()> {
        let folder = registration.folder.trim().to_lowercase();
        if !is_valid_folder(&folder) {
            return Err(FederationError::InvalidRegistration(format!(
                "folder {:?} of {}",
                folder, registration.name
            )));
        }

        let repositories = self.client.pull_repositories(registration).await?;
        let target = Arc::new(registration.clone());
        for (clone_url, remote) in repositories {
            if !registration.is_included(&remote.name) {
                debug!(repository = %remote.name, "excluded from federation pull");
                registration.update_status(&remote.name, FederationPullStatus::Excluded);
                continue;
            }
            if !remote.has_commits {
                warn!(
                    repository = %remote.name,
                    registration = %registration.name,
                    "skipping federated repository without commits"
                );
                registration.update_status(&remote.name, FederationPullStatus::Skipped);
                continue;
            }

            let local_name = local_name(&folder, &remote.name, registration.bare);
            let name = remote.name.clone();
            let registry = Arc::clone(self.federation.registry());
            let target = Arc::clone(&target);
            let destination = local_name.clone();
            // Clones and fetches run git to completion.
            let pulled = tokio::task::spawn_blocking(move || {
                pull_repository(&registry, &target, &clone_url, &remote, &destination)
            })
            .await
            .unwrap_or_else(|e| Err(FederationError::Remote(format!("pull task failed: {}", e))));
            let status = match pulled {
                Ok(status) => status,
                Err(FederationError::Registry(RegistryError::Busy(_))) => {
                    warn!(repository = %local_name, "skipping local repository, busy collecting garbage");
                    FederationPullStatus::Skipped
                }
                Err(e) => {
                    warn!(repository = %local_name, error = %e, "failed to pull federated repository");
                    FederationPullStatus::Failed
                }
            };
            registration.update_status(&name, status);
        }
        Ok(())
    }
}

/// Mirrors or refreshes one repository of `registration`. Blocks on git.
fn pull_repository(
    registry: &Registry,
    registration: &FederationModel,
    clone_url: &str,
    remote: &RepositoryModel,
    local_name: &str,
) -> Result<FederationPullStatus> {
    let from_peer = clone_url.starts_with(&registration.url);

    let Some(existing) = registry.get(local_name)? else {
        info!(repository = %remote.name, registration = %registration.name, "cloning federated repository");
        let local = registry.clone_remote(clone_url, local_name, registration.bare)?;
        let mut model = local_model(remote, &local, clone_url);
        model.federation_strategy = FederationStrategy::Exclude;
        model.is_frozen = registration.mirror;
        model.is_federated = from_peer;
        registry.update_repository_model(local_name, model, false)?;
        return Ok(FederationPullStatus::Mirrored);
    };

    if existing.is_collecting_garbage {
        return Err(RegistryError::Busy(local_name.to_string()).into());
    }
    let same_origin = existing
        .origin
        .as_deref()
        .is_some_and(|origin| origin.starts_with(&registration.url));
    if !same_origin {
        warn!(
            repository = %local_name,
            registration = %registration.name,
            "skipping federated repository, origin does not match"
        );
        return Ok(FederationPullStatus::Skipped);
    }

    info!(repository = %remote.name, registration = %registration.name, "fetching federated repository");
    registry.fetch(local_name)?;
    let fetched = registry
        .get(local_name)?
        .ok_or_else(|| RegistryError::NotFound(local_name.to_string()))?;
    let status = if fetched.last_change == existing.last_change {
        FederationPullStatus::NoChange
    } else if registration.mirror {
        FederationPullStatus::Mirrored
    } else {
        FederationPullStatus::Pulled
    };

    let mut model = local_model(remote, &fetched, clone_url);
    model.is_frozen = fetched.is_frozen;
    model.federation_strategy = fetched.federation_strategy;
    model.federation_sets = fetched.federation_sets.clone();
    for set in &remote.federation_sets {
        if !model.federation_sets.contains(set) {
            model.federation_sets.push(set.clone());
        }
    }
    model.is_federated = from_peer;
    registry.update_repository_model(local_name, model, false)?;
    Ok(status)
}

/// Local copy of `remote`, keeping what `local` knows about storage.
fn local_model(remote: &RepositoryModel, local: &RepositoryModel, clone_url: &str) -> RepositoryModel {
    let mut model = remote.clone();
    model.set_name(local.name.clone());
    model.origin = Some(clone_url.to_string());
    model.origin_repository = local.origin_repository.clone();
    model.forks.clear();
    model.is_bare = local.is_bare;
    model.is_mirror = local.is_mirror;
    model.has_commits = local.has_commits;
    model.size = local.size;
    model.last_change = local.last_change;
    model.last_change_author = local.last_change_author.clone();
    model.last_gc = local.last_gc;
    model.is_collecting_garbage = false;
    model
}

fn is_valid_folder(folder: &str) -> bool {
    !folder.contains("..")
        && !folder.starts_with('/')
        && folder
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/'))
}

/// Name a repository pulled from a peer gets locally.
fn local_name(folder: &str, remote: &str, bare: bool) -> String {
    let name = if folder.is_empty() {
        remote.to_string()
    } else {
        format!("{}/{}", folder.trim_end_matches('/'), remote)
    };
    if bare {
        if name.to_lowercase().ends_with(DOT_GIT) {
            name
        } else {
            format!("{}{}", name, DOT_GIT)
        }
    } else {
        strip_dot_git(&name).to_string()
    }
}
