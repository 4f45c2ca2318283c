//! Component wiring.
//!
//! Every component is built once here and handed to whatever needs it.

use crate::scheduler::{daily, delay_until_hour, PeriodicTask, Scheduler};
use crate::settings::Settings;
use anyhow::Context;
use async_trait::async_trait;
use cairn_auth::{MemoryUserDirectory, PermissionResolver, UserDirectory};
use cairn_federation::{
    Federation, FederationClient, FederationPuller, HttpFederationClient, LogNotifier,
};
use cairn_registry::{GarbageCollector, GcTracker, Registry};
use cairn_storage::{FsConfigStore, FsRepositoryStore};
use cairn_types::unix_now;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// Delay before the first federation pull after startup.
pub const FEDERATION_STARTUP_DELAY: Duration = Duration::from_secs(60);

/// How often due federation registrations are looked for.
pub const FEDERATION_TICK: Duration = Duration::from_secs(60);

/// Daily garbage collection pass.
pub struct GcTask {
    collector: Arc<GarbageCollector>,
}

#[async_trait]
impl PeriodicTask for GcTask {
    fn name(&self) -> &str {
        "garbage-collection"
    }

    async fn run(&self) {
        let collector = self.collector.clone();
        match tokio::task::spawn_blocking(move || collector.run_once(unix_now())).await {
            Ok(Ok(report)) => info!(collected = report.collected.len(), "garbage collection pass done"),
            Ok(Err(e)) => error!(error = %e, "garbage collection pass failed"),
            Err(e) => error!(error = %e, "garbage collection task panicked"),
        }
    }
}

/// Pulls federation registrations that are due.
pub struct PullTask {
    puller: Arc<FederationPuller>,
}

#[async_trait]
impl PeriodicTask for PullTask {
    fn name(&self) -> &str {
        "federation-pull"
    }

    async fn run(&self) {
        let report = self.puller.run_once(unix_now()).await;
        if !report.pulled.is_empty() || !report.failed.is_empty() {
            info!(
                pulled = report.pulled.len(),
                failed = report.failed.len(),
                "federation pull pass done"
            );
        }
    }
}

/// A fully wired node.
pub struct Node {
    settings: Settings,
    registry: Arc<Registry>,
    collector: Arc<GarbageCollector>,
    federation: Arc<Federation>,
}

impl Node {
    /// Builds every component from `settings`.
    pub fn build(settings: Settings) -> anyhow::Result<Self> {
        let folder = settings.git.repositories_folder.clone();
        std::fs::create_dir_all(&folder)
            .with_context(|| format!("failed to create {}", folder.display()))?;

        let directory = Arc::new(MemoryUserDirectory::new());
        directory
            .update_users(settings.users.clone())
            .context("failed to load users")?;
        directory
            .update_teams(settings.teams.clone())
            .context("failed to load teams")?;

        let tracker = Arc::new(GcTracker::new());
        let registry = Arc::new(Registry::new(
            settings.registry_settings(),
            Arc::new(FsRepositoryStore::new(folder)),
            Arc::new(FsConfigStore::new()),
            PermissionResolver::new(directory),
            tracker.clone(),
        ));
        let collector = Arc::new(GarbageCollector::new(registry.clone(), tracker));
        let federation = Arc::new(Federation::new(
            settings.federation.clone(),
            registry.clone(),
            Arc::new(LogNotifier),
        ));

        Ok(Self {
            settings,
            registry,
            collector,
            federation,
        })
    }

    /// The repository registry.
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// The federation component.
    pub fn federation(&self) -> &Arc<Federation> {
        &self.federation
    }

    /// Warms the registry cache and starts the background tasks.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) -> anyhow::Result<Scheduler> {
        let start = Instant::now();
        let repositories = self.registry.list().context("failed to list repositories")?;
        info!(
            repositories = repositories.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "repository registry ready"
        );

        self.federation.log_tokens();

        let mut scheduler = Scheduler::new();
        if self.settings.git.enable_garbage_collection {
            scheduler.spawn(
                Arc::new(GcTask {
                    collector: self.collector.clone(),
                }),
                delay_until_hour(unix_now(), self.settings.git.gc_hour),
                daily(),
            );
        }

        let registrations = self.federation.registrations();
        if !registrations.is_empty() {
            let client: Arc<dyn FederationClient> = Arc::new(HttpFederationClient::new()?);
            let puller = Arc::new(FederationPuller::new(self.federation.clone(), client));
            info!(registrations = registrations.len(), "federation pulls scheduled");
            scheduler.spawn(
                Arc::new(PullTask { puller }),
                FEDERATION_STARTUP_DELAY,
                FEDERATION_TICK,
            );
        }
        Ok(scheduler)
    }
}
