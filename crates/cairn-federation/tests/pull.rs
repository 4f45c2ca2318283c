//! Pulling from a registered peer through a scripted client.

use async_trait::async_trait;
use cairn_auth::{MemoryUserDirectory, PermissionResolver};
use cairn_federation::{
    Federation, FederationClient, FederationError, FederationModel, FederationPullStatus,
    FederationPuller, FederationSettings, MemoryNotifier, RegistrationSettings, Result,
};
use cairn_registry::{GcTracker, Registry, RegistrySettings};
use cairn_storage::{
    LastChange, MemoryStore, RepositoryHandle, RepositoryStore, ScanOptions, SharedMode,
};
use cairn_types::{FederationStrategy, RepositoryModel};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread::ThreadId;

const PEER: &str = "https://peer.example";

#[derive(Default)]
struct ScriptedClient {
    repositories: Mutex<BTreeMap<String, RepositoryModel>>,
    fail: Mutex<bool>,
    acknowledged: Mutex<Vec<(String, FederationModel)>>,
}

impl ScriptedClient {
    fn offer(&self, name: &str, has_commits: bool) {
        let mut model = RepositoryModel::new(name).with_description(format!("{} upstream", name));
        model.has_commits = has_commits;
        model.federation_sets = vec!["east".into()];
        self.repositories
            .lock()
            .insert(format!("{}/r/{}", PEER, name), model);
    }
}

#[async_trait]
impl FederationClient for ScriptedClient {
    async fn pull_repositories(
        &self,
        _registration: &FederationModel,
    ) -> Result<BTreeMap<String, RepositoryModel>> {
        if *self.fail.lock() {
            return Err(FederationError::Remote("connection refused".into()));
        }
        Ok(self.repositories.lock().clone())
    }

    async fn acknowledge_status(
        &self,
        identification: &str,
        registration: &FederationModel,
    ) -> Result<()> {
        self.acknowledged
            .lock()
            .push((identification.to_string(), registration.clone()));
        Ok(())
    }
}

struct Fixture {
    store: Arc<MemoryStore>,
    registry: Arc<Registry>,
    federation: Arc<Federation>,
    notifier: Arc<MemoryNotifier>,
    client: Arc<ScriptedClient>,
    puller: FederationPuller,
}

fn setup(registration: RegistrationSettings) -> Fixture {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(Registry::new(
        RegistrySettings::default(),
        store.clone(),
        store.clone(),
        PermissionResolver::new(Arc::new(MemoryUserDirectory::new())),
        Arc::new(GcTracker::new()),
    ));
    let mut settings = FederationSettings {
        name: "home".into(),
        url: "https://home.example".into(),
        ..Default::default()
    };
    settings.registrations.insert("peer".into(), registration);
    let notifier = Arc::new(MemoryNotifier::new());
    let federation = Arc::new(Federation::new(settings, registry.clone(), notifier.clone()));
    let client = Arc::new(ScriptedClient::default());
    let puller = FederationPuller::new(federation.clone(), client.clone());
    Fixture {
        store,
        registry,
        federation,
        notifier,
        client,
        puller,
    }
}

fn peer_registration() -> RegistrationSettings {
    RegistrationSettings {
        url: PEER.into(),
        token: "tok".into(),
        folder: "peer".into(),
        send_status: true,
        exclusions: vec!["secret/*".into()],
        ..Default::default()
    }
}

fn registration(f: &Fixture) -> FederationModel {
    f.federation
        .registrations()
        .into_iter()
        .find(|r| r.name == "peer")
        .unwrap()
}

#[tokio::test]
async fn test_pull_mirrors_new_repositories() {
    let f = setup(peer_registration());
    f.client.offer("a.git", true);
    f.client.offer("secret/x.git", true);
    f.client.offer("empty.git", false);
    f.client.offer("b.git", true);
    f.store.add_repository("peer/b.git", true);
    f.store.add_commit("peer/b.git", 1, "alice").unwrap();

    let report = f.puller.run_once(1_000).await;
    assert_eq!(report.pulled, vec!["peer"]);
    assert!(report.failed.is_empty());

    let mirrored = f.registry.get("peer/a.git").unwrap().unwrap();
    assert!(mirrored.is_federated);
    assert!(mirrored.is_frozen);
    assert_eq!(mirrored.origin.as_deref(), Some("https://peer.example/r/a.git"));
    assert_eq!(mirrored.federation_strategy, FederationStrategy::Exclude);
    assert_eq!(mirrored.description, "a.git upstream");

    let local = f.registry.get("peer/b.git").unwrap().unwrap();
    assert!(!local.is_federated);
    assert!(!f.registry.has_repository("peer/secret/x.git"));
    assert!(!f.registry.has_repository("peer/empty.git"));

    let state = registration(&f);
    assert_eq!(state.statuses["a.git"], FederationPullStatus::Mirrored);
    assert_eq!(state.statuses["b.git"], FederationPullStatus::Skipped);
    assert_eq!(state.statuses["empty.git"], FederationPullStatus::Skipped);
    assert_eq!(state.statuses["secret/x.git"], FederationPullStatus::Excluded);
    assert_eq!(state.last_pull, 1_000);
    assert_eq!(state.next_pull, 1_000 + 60 * 60);

    let acknowledged = f.client.acknowledged.lock().clone();
    assert_eq!(acknowledged.len(), 1);
    assert_eq!(acknowledged[0].0, "home");
}

#[tokio::test]
async fn test_pull_waits_for_next_period_then_fetches() {
    let f = setup(peer_registration());
    f.client.offer("a.git", true);

    f.puller.run_once(1_000).await;
    let report = f.puller.run_once(1_001).await;
    assert!(report.pulled.is_empty());
    assert_eq!(f.store.fetches("peer/a.git"), 0);

    let report = f.puller.run_once(1_000 + 60 * 60).await;
    assert_eq!(report.pulled, vec!["peer"]);
    assert_eq!(f.store.fetches("peer/a.git"), 1);
    assert_eq!(registration(&f).statuses["a.git"], FederationPullStatus::NoChange);

    let model = f.registry.get("peer/a.git").unwrap().unwrap();
    assert!(model.is_federated);
    assert!(model.is_frozen);
    assert_eq!(model.federation_sets, vec!["east"]);
}

#[tokio::test]
async fn test_failed_pull_is_rescheduled() {
    let f = setup(peer_registration());
    *f.client.fail.lock() = true;

    let report = f.puller.run_once(5_000).await;
    assert!(report.pulled.is_empty());
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].0, "peer");

    let state = registration(&f);
    assert_eq!(state.status(), FederationPullStatus::Pending);
    assert_eq!(state.next_pull, 5_000 + 60 * 60);
    assert_eq!(state.last_pull, 0);
    assert!(f.client.acknowledged.lock().is_empty());
}

#[tokio::test]
async fn test_degraded_status_notifies_administrators() {
    let f = setup(RegistrationSettings {
        notify_on_error: true,
        send_status: false,
        ..peer_registration()
    });
    f.client.offer("a.git", true);
    f.puller.run_once(0).await;
    assert!(f.notifier.sent().is_empty());

    f.client.offer("c.git", true);
    f.store.add_repository("peer/c.git", true);
    f.store.add_commit("peer/c.git", 1, "alice").unwrap();
    f.puller.run_once(60 * 60).await;

    assert_eq!(registration(&f).status(), FederationPullStatus::Skipped);
    let sent = f.notifier.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].0.contains("peer"));
    assert!(f.client.acknowledged.lock().is_empty());
}

#[tokio::test]
async fn test_invalid_folder_fails_registration() {
    let f = setup(RegistrationSettings {
        folder: "../outside".into(),
        ..peer_registration()
    });
    f.client.offer("a.git", true);
    let report = f.puller.run_once(0).await;
    assert_eq!(report.failed.len(), 1);
    assert!(!f.registry.has_repository("outside/a.git"));
}

/// Records the thread every clone and fetch runs on.
struct ThreadRecordingStore {
    inner: Arc<MemoryStore>,
    threads: Mutex<Vec<ThreadId>>,
}

impl ThreadRecordingStore {
    fn record(&self) {
        self.threads.lock().push(std::thread::current().id());
    }
}

impl RepositoryStore for ThreadRecordingStore {
    fn enumerate(&self, scan: &ScanOptions) -> cairn_storage::Result<Vec<String>> {
        self.inner.enumerate(scan)
    }

    fn open(&self, name: &str) -> cairn_storage::Result<Option<RepositoryHandle>> {
        self.inner.open(name)
    }

    fn close(&self, handle: &RepositoryHandle) {
        self.inner.close(handle)
    }

    fn exists(&self, name: &str) -> bool {
        self.inner.exists(name)
    }

    fn last_change(&self, handle: &RepositoryHandle) -> cairn_storage::Result<LastChange> {
        self.inner.last_change(handle)
    }

    fn has_commits(&self, handle: &RepositoryHandle) -> cairn_storage::Result<bool> {
        self.inner.has_commits(handle)
    }

    fn disk_size(&self, handle: &RepositoryHandle) -> cairn_storage::Result<u64> {
        self.inner.disk_size(handle)
    }

    fn create(&self, name: &str, shared: SharedMode) -> cairn_storage::Result<RepositoryHandle> {
        self.inner.create(name, shared)
    }

    fn clone_from(
        &self,
        source_url: &str,
        name: &str,
        bare: bool,
    ) -> cairn_storage::Result<RepositoryHandle> {
        self.record();
        self.inner.clone_from(source_url, name, bare)
    }

    fn fetch(&self, handle: &RepositoryHandle) -> cairn_storage::Result<()> {
        self.record();
        self.inner.fetch(handle)
    }

    fn rename(&self, from: &str, to: &str) -> cairn_storage::Result<()> {
        self.inner.rename(from, to)
    }

    fn delete(&self, name: &str) -> cairn_storage::Result<()> {
        self.inner.delete(name)
    }

    fn local_url(&self, name: &str) -> String {
        self.inner.local_url(name)
    }

    fn resolve_local_url(&self, url: &str) -> Option<String> {
        self.inner.resolve_local_url(url)
    }
}

#[tokio::test]
async fn test_clone_and_fetch_run_off_the_runtime_thread() {
    let memory = Arc::new(MemoryStore::new());
    let store = Arc::new(ThreadRecordingStore {
        inner: memory.clone(),
        threads: Mutex::new(Vec::new()),
    });
    let registry = Arc::new(Registry::new(
        RegistrySettings::default(),
        store.clone(),
        memory.clone(),
        PermissionResolver::new(Arc::new(MemoryUserDirectory::new())),
        Arc::new(GcTracker::new()),
    ));
    let mut settings = FederationSettings {
        name: "home".into(),
        url: "https://home.example".into(),
        ..Default::default()
    };
    settings.registrations.insert("peer".into(), peer_registration());
    let federation = Arc::new(Federation::new(
        settings,
        registry.clone(),
        Arc::new(MemoryNotifier::new()),
    ));
    let client = Arc::new(ScriptedClient::default());
    client.offer("a.git", true);
    let puller = FederationPuller::new(federation, client);

    puller.run_once(1_000).await;
    puller.run_once(1_000 + 60 * 60).await;
    assert_eq!(memory.fetches("peer/a.git"), 1);
    assert!(registry.has_repository("peer/a.git"));

    let runtime_thread = std::thread::current().id();
    let threads = store.threads.lock().clone();
    assert_eq!(threads.len(), 2);
    assert!(threads.iter().all(|id| *id != runtime_thread));
}
