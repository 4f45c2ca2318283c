//! In-memory repository and configuration store.

use crate::{
    ConfigStore, LastChange, RepositoryConfig, RepositoryHandle, RepositoryStore, Result,
    ScanOptions, SharedMode, StorageError,
};
use cairn_types::cache_key;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

const URL_SCHEME: &str = "memory://";
const ORIGIN_URL_KEY: &str = "remote.origin.url";

#[derive(Debug, Clone, Default)]
struct MemoryRepository {
    name: String,
    is_bare: bool,
    commits: u64,
    last_change: LastChange,
    size: u64,
    config: RepositoryConfig,
    config_version: u64,
    read_version: u64,
    open_count: usize,
    opens: u64,
    closes: u64,
    compactions: u64,
    fetches: u64,
}

impl MemoryRepository {
    fn new(name: &str, is_bare: bool) -> Self {
        Self {
            name: name.to_string(),
            is_bare,
            config_version: 1,
            ..Self::default()
        }
    }
}

/// Store that keeps repositories and their configuration in memory.
///
/// Every capability call is counted so callers can assert that a code path
/// did or did not touch storage.
#[derive(Debug, Default)]
pub struct MemoryStore {
    repos: RwLock<HashMap<String, MemoryRepository>>,
    calls: AtomicU64,
    failing_renames: AtomicU32,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn record_call(&self) {
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    fn with_repo<T>(&self, name: &str, f: impl FnOnce(&mut MemoryRepository) -> T) -> Result<T> {
        let mut repos = self.repos.write();
        let repo = repos
            .get_mut(&cache_key(name))
            .ok_or_else(|| StorageError::NotFound(name.to_string()))?;
        Ok(f(repo))
    }

    /// Adds an empty repository.
    pub fn add_repository(&self, name: &str, is_bare: bool) {
        self.repos
            .write()
            .insert(cache_key(name), MemoryRepository::new(name, is_bare));
    }

    /// Records a commit made at `when` by `author`.
    pub fn add_commit(&self, name: &str, when: u64, author: &str) -> Result<()> {
        self.with_repo(name, |repo| {
            repo.commits += 1;
            repo.last_change = LastChange {
                when,
                author: Some(author.to_string()),
            };
        })
    }

    /// Sets the reported disk size.
    pub fn set_size(&self, name: &str, size: u64) -> Result<()> {
        self.with_repo(name, |repo| repo.size = size)
    }

    /// Changes one configuration value out of band, marking the
    /// configuration stale.
    pub fn set_config_value(&self, name: &str, key: &str, value: &str) -> Result<()> {
        self.with_repo(name, |repo| {
            repo.config.set(key, value);
            repo.config_version += 1;
        })
    }

    /// Returns a snapshot of the stored configuration.
    pub fn config(&self, name: &str) -> Option<RepositoryConfig> {
        self.repos
            .read()
            .get(&cache_key(name))
            .map(|r| r.config.clone())
    }

    /// Total number of capability calls made so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    /// Number of handles currently open on a repository.
    pub fn open_count(&self, name: &str) -> usize {
        self.repos
            .read()
            .get(&cache_key(name))
            .map(|r| r.open_count)
            .unwrap_or(0)
    }

    /// Number of times a repository was compacted.
    pub fn compactions(&self, name: &str) -> u64 {
        self.repos
            .read()
            .get(&cache_key(name))
            .map(|r| r.compactions)
            .unwrap_or(0)
    }

    /// Number of times a repository was fetched.
    pub fn fetches(&self, name: &str) -> u64 {
        self.repos
            .read()
            .get(&cache_key(name))
            .map(|r| r.fetches)
            .unwrap_or(0)
    }

    /// Total opens and closes of a repository since it was added.
    pub fn open_close_totals(&self, name: &str) -> (u64, u64) {
        self.repos
            .read()
            .get(&cache_key(name))
            .map(|r| (r.opens, r.closes))
            .unwrap_or((0, 0))
    }

    /// Makes the next `n` renames fail with [`StorageError::InUse`].
    pub fn fail_next_renames(&self, n: u32) {
        self.failing_renames.store(n, Ordering::SeqCst);
    }

    fn handle_for(repo: &MemoryRepository) -> RepositoryHandle {
        RepositoryHandle::new(repo.name.clone(), repo.is_bare)
    }
}

impl RepositoryStore for MemoryStore {
    fn enumerate(&self, scan: &ScanOptions) -> Result<Vec<String>> {
        self.record_call();
        let mut names: Vec<String> = self
            .repos
            .read()
            .values()
            .filter(|r| !scan.only_bare || r.is_bare)
            .filter(|r| scan.allows_depth(r.name.matches('/').count()))
            .filter(|r| !scan.is_excluded(&r.name))
            .map(|r| r.name.clone())
            .collect();
        names.sort();
        Ok(names)
    }

    fn open(&self, name: &str) -> Result<Option<RepositoryHandle>> {
        self.record_call();
        let mut repos = self.repos.write();
        Ok(repos.get_mut(&cache_key(name)).map(|repo| {
            repo.open_count += 1;
            repo.opens += 1;
            Self::handle_for(repo)
        }))
    }

    fn close(&self, handle: &RepositoryHandle) {
        self.record_call();
        if let Some(repo) = self.repos.write().get_mut(&cache_key(&handle.name)) {
            repo.open_count = repo.open_count.saturating_sub(1);
            repo.closes += 1;
        }
    }

    fn exists(&self, name: &str) -> bool {
        self.record_call();
        self.repos.read().contains_key(&cache_key(name))
    }

    fn last_change(&self, handle: &RepositoryHandle) -> Result<LastChange> {
        self.record_call();
        self.with_repo(&handle.name, |repo| repo.last_change.clone())
    }

    fn has_commits(&self, handle: &RepositoryHandle) -> Result<bool> {
        self.record_call();
        self.with_repo(&handle.name, |repo| repo.commits > 0)
    }

    fn disk_size(&self, handle: &RepositoryHandle) -> Result<u64> {
        self.record_call();
        self.with_repo(&handle.name, |repo| repo.size)
    }

    fn create(&self, name: &str, _shared: SharedMode) -> Result<RepositoryHandle> {
        self.record_call();
        let mut repos = self.repos.write();
        let key = cache_key(name);
        if repos.contains_key(&key) {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }
        let repo = MemoryRepository::new(name, true);
        let handle = Self::handle_for(&repo);
        repos.insert(key, repo);
        Ok(handle)
    }

    fn clone_from(&self, source_url: &str, name: &str, bare: bool) -> Result<RepositoryHandle> {
        self.record_call();
        let mut repos = self.repos.write();
        let key = cache_key(name);
        if repos.contains_key(&key) {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }
        let mut repo = MemoryRepository::new(name, bare);
        if let Some(source) = source_url
            .strip_prefix(URL_SCHEME)
            .and_then(|source| repos.get(&cache_key(source)))
        {
            repo.commits = source.commits;
            repo.last_change = source.last_change.clone();
            repo.size = source.size;
        }
        repo.config.set(ORIGIN_URL_KEY, source_url);
        let handle = Self::handle_for(&repo);
        repos.insert(key, repo);
        Ok(handle)
    }

    fn fetch(&self, handle: &RepositoryHandle) -> Result<()> {
        self.record_call();
        self.with_repo(&handle.name, |repo| repo.fetches += 1)
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        self.record_call();
        let pending = self.failing_renames.load(Ordering::SeqCst);
        if pending > 0 {
            self.failing_renames.store(pending - 1, Ordering::SeqCst);
            return Err(StorageError::InUse(from.to_string()));
        }

        let mut repos = self.repos.write();
        let from_key = cache_key(from);
        let to_key = cache_key(to);
        match repos.get(&from_key) {
            None => return Err(StorageError::NotFound(from.to_string())),
            Some(repo) if repo.open_count > 0 => {
                return Err(StorageError::InUse(from.to_string()))
            }
            Some(_) => {}
        }
        if from_key != to_key && repos.contains_key(&to_key) {
            return Err(StorageError::AlreadyExists(to.to_string()));
        }
        if let Some(mut repo) = repos.remove(&from_key) {
            repo.name = to.to_string();
            repos.insert(to_key, repo);
        }
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        self.record_call();
        let mut repos = self.repos.write();
        let key = cache_key(name);
        match repos.get(&key) {
            None => Err(StorageError::NotFound(name.to_string())),
            Some(repo) if repo.open_count > 0 => Err(StorageError::InUse(name.to_string())),
            Some(_) => {
                repos.remove(&key);
                Ok(())
            }
        }
    }

    fn local_url(&self, name: &str) -> String {
        format!("{}{}", URL_SCHEME, name)
    }

    fn resolve_local_url(&self, url: &str) -> Option<String> {
        let name = url.strip_prefix(URL_SCHEME)?;
        self.repos
            .read()
            .get(&cache_key(name))
            .map(|r| r.name.clone())
    }

    fn compact(&self, handle: &RepositoryHandle) -> Result<()> {
        self.record_call();
        self.with_repo(&handle.name, |repo| repo.compactions += 1)
    }
}

impl ConfigStore for MemoryStore {
    fn read(&self, handle: &RepositoryHandle) -> Result<RepositoryConfig> {
        self.record_call();
        self.with_repo(&handle.name, |repo| {
            repo.read_version = repo.config_version;
            repo.config.clone()
        })
    }

    fn is_stale(&self, handle: &RepositoryHandle) -> Result<bool> {
        self.record_call();
        self.with_repo(&handle.name, |repo| repo.read_version != repo.config_version)
    }

    fn write(&self, handle: &RepositoryHandle, config: &RepositoryConfig) -> Result<()> {
        self.record_call();
        self.with_repo(&handle.name, |repo| {
            repo.config = config.clone();
            repo.config_version += 1;
        })
    }
}
