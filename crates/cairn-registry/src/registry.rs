//! The repository registry.
//!
//! The registry owns the authoritative copy of every repository model.
//! Callers always receive independent copies. The `forks` set of a cached
//! model is derived from the `origin_repository` of the other cached
//! models and is re-derived whenever an entry is inserted or replaced.

use crate::error::{RegistryError, RenameStage, Result};
use crate::gate::GcGate;
use crate::handles::{HandleTracker, OpenRepository};
use crate::metrics::{RegistryMetrics, RegistryStats};
use crate::model_io::{self, ORIGIN_REPOSITORY, ORIGIN_URL};
use crate::retry::RetryPolicy;
use crate::settings::RegistrySettings;
use cairn_auth::{PermissionResolver, UserModel};
use cairn_storage::{ConfigStore, RepositoryHandle, RepositoryStore, StorageError};
use cairn_types::{
    cache_key, compare_repository_names, decode_tilde, last_path_element, personal_path,
    sort_repository_names, strip_dot_git, username_from_personal_path, AccessPermission,
    ForkModel, ProjectModel, RegistrantAccessPermission, RepositoryModel, DOT_GIT,
};
use parking_lot::{Mutex, RwLock};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

type ModelMap = HashMap<String, RepositoryModel>;

/// Cache of repository models with fork graph bookkeeping.
pub struct Registry {
    settings: RwLock<RegistrySettings>,
    store: Arc<dyn RepositoryStore>,
    configs: Arc<dyn ConfigStore>,
    resolver: PermissionResolver,
    gate: Arc<dyn GcGate>,
    cache: RwLock<ModelMap>,
    populated: AtomicBool,
    checksum: Mutex<String>,
    handles: HandleTracker,
    retry: RetryPolicy,
    metrics: RegistryMetrics,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("cached", &self.cache.read().len())
            .field("metrics", &self.metrics.snapshot())
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Creates a registry over the given collaborators.
    pub fn new(
        settings: RegistrySettings,
        store: Arc<dyn RepositoryStore>,
        configs: Arc<dyn ConfigStore>,
        resolver: PermissionResolver,
        gate: Arc<dyn GcGate>,
    ) -> Self {
        let checksum = settings.list_checksum();
        Self {
            settings: RwLock::new(settings),
            store,
            configs,
            resolver,
            gate,
            cache: RwLock::new(HashMap::new()),
            populated: AtomicBool::new(false),
            checksum: Mutex::new(checksum),
            handles: HandleTracker::new(),
            retry: RetryPolicy::default(),
            metrics: RegistryMetrics::default(),
        }
    }

    /// Replaces the retry policy used for renames and deletes.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Current settings.
    pub fn settings(&self) -> RegistrySettings {
        self.settings.read().clone()
    }

    /// Replaces the settings. Scan changes take effect on the next `list`.
    pub fn update_settings(&self, settings: RegistrySettings) {
        *self.settings.write() = settings;
    }

    /// The repository store.
    pub fn store(&self) -> &Arc<dyn RepositoryStore> {
        &self.store
    }

    /// The permission resolver.
    pub fn resolver(&self) -> &PermissionResolver {
        &self.resolver
    }

    /// Snapshot of the cache counters.
    pub fn metrics(&self) -> RegistryStats {
        self.metrics.snapshot()
    }

    /// Number of handles the registry holds open on `name`.
    pub fn open_handles(&self, name: &str) -> usize {
        self.handles.count(name)
    }

    fn caching(&self) -> bool {
        self.settings.read().cache_repository_list
    }

    /// All repository names, sorted case-insensitively.
    pub fn list(&self) -> Result<Vec<String>> {
        let settings = self.settings();
        self.check_scan_settings(&settings);

        if !settings.cache_repository_list {
            let mut names = self.store.enumerate(&settings.scan_options())?;
            sort_repository_names(&mut names);
            return Ok(names);
        }

        if !self.populated.load(Ordering::Acquire) {
            self.rebuild(&settings)?;
        }
        let mut names: Vec<String> = self
            .cache
            .read()
            .values()
            .map(|m| m.name.clone())
            .collect();
        sort_repository_names(&mut names);
        Ok(names)
    }

    fn check_scan_settings(&self, settings: &RegistrySettings) {
        let checksum = settings.list_checksum();
        let mut last = self.checksum.lock();
        if *last != checksum {
            info!("repository scan settings changed, clearing repository cache");
            self.invalidate();
            *last = checksum;
        }
    }

    fn rebuild(&self, settings: &RegistrySettings) -> Result<()> {
        let start = Instant::now();
        let names = self.store.enumerate(&settings.scan_options())?;
        let mut models = ModelMap::with_capacity(names.len());
        for name in &names {
            match self.load_model(name, settings) {
                Ok(Some(model)) => {
                    models.insert(cache_key(&model.name), model);
                }
                Ok(None) => {}
                Err(e) => warn!(repository = %name, error = %e, "failed to load repository"),
            }
        }
        link_forks(&mut models);

        let count = models.len();
        self.cache.write().extend(models);
        self.populated.store(true, Ordering::Release);
        self.metrics.record_rebuild();
        info!(
            count,
            duration_ms = start.elapsed().as_millis() as u64,
            "repository cache rebuilt"
        );
        Ok(())
    }

    fn load_model(
        &self,
        name: &str,
        settings: &RegistrySettings,
    ) -> Result<Option<RepositoryModel>> {
        match OpenRepository::open(&*self.store, &self.handles, name)? {
            Some(repo) => self.model_from_handle(&repo, settings).map(Some),
            None => Ok(None),
        }
    }

    fn model_from_handle(
        &self,
        repo: &RepositoryHandle,
        settings: &RegistrySettings,
    ) -> Result<RepositoryModel> {
        let mut config = self.configs.read(repo)?;
        let mut model = model_io::model_from_config(&repo.name, repo.is_bare, &config, settings);
        self.refresh_volatile(repo, &mut model, settings)?;

        if model.origin_repository.is_none() {
            let local_origin = model
                .origin
                .as_deref()
                .and_then(|url| self.store.resolve_local_url(url));
            if let Some(origin) = local_origin {
                debug!(repository = %model.name, origin = %origin, "recording local origin");
                config.set(ORIGIN_REPOSITORY, origin.as_str());
                if let Err(e) = self.configs.write(repo, &config) {
                    warn!(repository = %model.name, error = %e, "failed to record origin repository");
                }
                model.origin_repository = Some(origin);
            }
        }
        Ok(model)
    }

    /// Updates last change, size and commit presence from the store.
    ///
    /// Commit presence only moves from false to true.
    fn refresh_volatile(
        &self,
        repo: &RepositoryHandle,
        model: &mut RepositoryModel,
        settings: &RegistrySettings,
    ) -> Result<()> {
        if !model.has_commits {
            model.has_commits = self.store.has_commits(repo)?;
        }
        let change = self.store.last_change(repo)?;
        model.last_change = change.when;
        model.last_change_author = change.author;
        if settings.show_sizes && !model.skip_size_calculation {
            model.size = Some(self.store.disk_size(repo)?);
        } else {
            model.size = None;
        }
        Ok(())
    }

    /// Returns a copy of the model for `name`, or `None` if it does not exist.
    ///
    /// While garbage collection holds the repository, the last cached
    /// model is returned flagged `is_collecting_garbage` without touching
    /// the store.
    pub fn get(&self, name: &str) -> Result<Option<RepositoryModel>> {
        let name = decode_tilde(name);
        let key = cache_key(&name);
        let settings = self.settings();

        if self.gate.is_busy(&name) {
            let cache = self.cache.read();
            return Ok(cache.get(&key).map(|model| {
                let mut copy = view(&cache, model);
                copy.is_collecting_garbage = true;
                copy
            }));
        }

        if !settings.cache_repository_list {
            return self.load_model(&name, &settings);
        }
        if !self.populated.load(Ordering::Acquire) {
            self.list()?;
        }

        let cached = self.cache.read().get(&key).cloned();
        let Some(mut model) = cached else {
            self.metrics.record_miss();
            let Some(model) = self.load_model(&name, &settings)? else {
                return Ok(None);
            };
            self.put(model);
            return Ok(self.cached_view(&key));
        };

        let Some(repo) = OpenRepository::open(&*self.store, &self.handles, &model.name)? else {
            self.remove(&model.name);
            self.metrics.record_eviction();
            error!(repository = %model.name, "repository is missing, removing it from the cache");
            return Ok(None);
        };

        if self.configs.is_stale(&repo)? {
            debug!(repository = %model.name, "repository configuration changed, reloading");
            self.metrics.record_reload();
            let fresh = self.model_from_handle(&repo, &settings)?;
            self.put(fresh);
        } else {
            self.metrics.record_hit();
            self.refresh_volatile(&repo, &mut model, &settings)?;
            if let Some(entry) = self.cache.write().get_mut(&key) {
                entry.has_commits = model.has_commits;
                entry.last_change = model.last_change;
                entry.last_change_author = model.last_change_author;
                entry.size = model.size;
            }
        }
        drop(repo);
        Ok(self.cached_view(&key))
    }

    /// Returns the model if `user` may view it.
    pub fn get_for_user(&self, user: &UserModel, name: &str) -> Result<Option<RepositoryModel>> {
        Ok(self
            .get(name)?
            .filter(|model| self.resolver.can_view(user, model)))
    }

    /// Every repository `user` may view, sorted by name.
    ///
    /// Repositories without commits are only listed for users who can
    /// push to them.
    pub fn get_accessible(&self, user: &UserModel) -> Result<Vec<RepositoryModel>> {
        let start = Instant::now();
        let mut models = Vec::new();
        for name in self.list()? {
            let model = match self.get(&name) {
                Ok(Some(model)) => model,
                Ok(None) => continue,
                Err(e) => {
                    warn!(repository = %name, error = %e, "failed to read repository");
                    continue;
                }
            };
            if !self.resolver.can_view(user, &model) {
                continue;
            }
            if !model.has_commits && !self.resolver.can_push(user, &model) {
                continue;
            }
            models.push(model);
        }
        debug!(
            user = %user.username,
            count = models.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "listed accessible repositories"
        );
        Ok(models)
    }

    /// Check if a repository exists.
    pub fn has_repository(&self, name: &str) -> bool {
        let name = decode_tilde(name);
        if self.caching() {
            if self.populated.load(Ordering::Acquire) {
                return self.cache.read().contains_key(&cache_key(&name));
            }
        }
        self.store.exists(&name)
    }

    /// Clears the whole cache.
    pub fn invalidate(&self) {
        self.populated.store(false, Ordering::Release);
        self.cache.write().clear();
    }

    /// Clears the whole cache, logging the reset.
    pub fn reset_cache(&self) {
        self.invalidate();
        info!("repository cache reset");
    }

    /// Inserts or replaces a cache entry and relinks its forks.
    ///
    /// Does nothing when caching is disabled.
    pub fn put(&self, mut model: RepositoryModel) {
        if !self.caching() {
            return;
        }
        model.is_collecting_garbage = false;
        let key = cache_key(&model.name);
        let mut cache = self.cache.write();

        let previous_origin = cache.get(&key).and_then(|p| p.origin_repository.clone());
        if let Some(previous) = previous_origin {
            if !model.is_fork_of(&previous) {
                if let Some(origin) = cache.get_mut(&cache_key(&previous)) {
                    origin.remove_fork(&model.name);
                }
            }
        }

        model.forks = cache
            .iter()
            .filter(|(k, m)| **k != key && m.is_fork_of(&model.name))
            .map(|(_, m)| m.name.clone())
            .collect();
        if let Some(origin) = model.origin_repository.as_deref() {
            if let Some(entry) = cache.get_mut(&cache_key(origin)) {
                entry.remove_fork(&model.name);
                entry.add_fork(model.name.clone());
            }
        }
        cache.insert(key, model);
    }

    /// Removes a cache entry. Fork links pointing at it are left in place
    /// and filtered when read.
    pub fn remove(&self, name: &str) -> Option<RepositoryModel> {
        self.cache.write().remove(&cache_key(name))
    }

    fn cached_view(&self, key: &str) -> Option<RepositoryModel> {
        let cache = self.cache.read();
        cache.get(key).map(|model| view(&cache, model))
    }

    fn ensure_idle(&self, name: &str) -> Result<()> {
        if self.gate.is_busy(name) {
            self.metrics.record_busy_rejection();
            warn!(repository = %name, "repository is busy collecting garbage");
            return Err(RegistryError::Busy(name.to_string()));
        }
        Ok(())
    }

    /// Creates, renames or edits a repository.
    ///
    /// With `is_create` a new repository named after `model` is created.
    /// Otherwise the repository currently named `old_name` is renamed when
    /// the names differ, then `model` is saved. Returns the stored model.
    pub fn update_repository_model(
        &self,
        old_name: &str,
        mut model: RepositoryModel,
        is_create: bool,
    ) -> Result<RepositoryModel> {
        let settings = self.settings();
        model.is_collecting_garbage = false;
        if !is_create {
            self.ensure_idle(old_name)?;
        }
        self.ensure_idle(&model.name)?;

        let root_prefix = format!("{}/", settings.root_group_name);
        let in_root_group = model
            .name
            .get(..root_prefix.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(&root_prefix));
        if in_root_group {
            let stripped = model.name[root_prefix.len()..].to_string();
            model.set_name(stripped);
        }
        if (is_create || !old_name.eq_ignore_ascii_case(&model.name))
            && !model.name.to_lowercase().ends_with(DOT_GIT)
        {
            let name = format!("{}{}", model.name, DOT_GIT);
            model.set_name(name);
        }
        let renaming = !is_create && !old_name.eq_ignore_ascii_case(&model.name);

        let mut forks = Vec::new();
        if is_create {
            if self.store.exists(&model.name) {
                return Err(RegistryError::AlreadyExists(model.name));
            }
            self.store
                .create(&model.name, settings.shared_mode())
                .map_err(already_exists)?;
            info!(repository = %model.name, "created repository");
        } else if renaming {
            forks = self.rename_repository(old_name, &model.name)?;
        } else if !self.store.exists(&model.name) {
            return Err(RegistryError::NotFound(model.name));
        }

        let persisted = self.persist_model(&model, &settings);
        if let Err(StorageError::NotFound(missing)) = &persisted {
            if !renaming {
                warn!(repository = %missing, "repository vanished before its configuration was saved");
                return Err(RegistryError::NotFound(missing.clone()));
            }
        }

        if renaming {
            let mut cache = self.cache.write();
            cache.remove(&cache_key(old_name));
            for fork in &forks {
                if let Some(entry) = cache.get_mut(&cache_key(fork)) {
                    entry.origin_repository = Some(model.name.clone());
                }
            }
            if let Some(origin) = model.origin_repository.as_deref() {
                if let Some(entry) = cache.get_mut(&cache_key(origin)) {
                    entry.remove_fork(old_name);
                }
            }
        }
        let key = cache_key(&model.name);
        let name = model.name.clone();
        let stored = model.clone();
        self.put(model);

        if let Err(e) = persisted {
            error!(repository = %name, error = %e, "failed to save repository configuration");
            return Err(RegistryError::PersistenceFailure(format!("{}: {}", name, e)));
        }
        debug!(repository = %name, "saved repository configuration");
        Ok(self.cached_view(&key).unwrap_or(stored))
    }

    /// Moves `from` to `to` on disk, then repoints forks and roles.
    ///
    /// Returns the names of the repointed forks.
    fn rename_repository(&self, from: &str, to: &str) -> Result<Vec<String>> {
        if self.store.exists(to) {
            return Err(RegistryError::AlreadyExists(to.to_string()));
        }
        let forks = self.with_graph(|graph| {
            graph
                .values()
                .filter(|m| m.is_fork_of(from))
                .map(|m| m.name.clone())
                .collect::<Vec<_>>()
        })?;

        self.handles.drain(&*self.store, from);
        self.retry
            .execute(|| self.store.rename(from, to), StorageError::is_retryable)
            .map_err(|e| invalid_rename(from, to, RenameStage::Filesystem, e.to_string()))?;
        info!(from = %from, to = %to, forks = forks.len(), "renamed repository");

        let mut failures = Vec::new();
        for fork in &forks {
            if let Err(e) = self.repoint_fork(fork, from, to) {
                warn!(fork = %fork, error = %e, "failed to repoint fork");
                failures.push(format!("{}: {}", fork, e));
            }
        }
        let roles = self.resolver.directory().rename_role(from, to);

        if !failures.is_empty() {
            if let Err(e) = &roles {
                failures.push(format!("roles: {}", e));
            }
            return Err(invalid_rename(from, to, RenameStage::Forks, failures.join("; ")));
        }
        if let Err(e) = roles {
            error!(from = %from, to = %to, error = %e, "failed to rename permission roles");
            return Err(invalid_rename(from, to, RenameStage::Roles, e.to_string()));
        }
        Ok(forks)
    }

    fn repoint_fork(&self, fork: &str, from: &str, to: &str) -> Result<()> {
        let repo = OpenRepository::open(&*self.store, &self.handles, fork)?
            .ok_or_else(|| RegistryError::NotFound(fork.to_string()))?;
        let mut config = self.configs.read(&repo)?;
        config.set(ORIGIN_REPOSITORY, to);
        if let Some(url) = config.get(ORIGIN_URL).map(|url| url.replace(from, to)) {
            config.set(ORIGIN_URL, url);
        }
        self.configs.write(&repo, &config)?;
        Ok(())
    }

    fn persist_model(
        &self,
        model: &RepositoryModel,
        settings: &RegistrySettings,
    ) -> std::result::Result<(), StorageError> {
        let repo = OpenRepository::open(&*self.store, &self.handles, &model.name)?
            .ok_or_else(|| StorageError::NotFound(model.name.clone()))?;
        let mut config = self.configs.read(&repo)?;
        model_io::write_model(&mut config, model, settings);
        self.configs.write(&repo, &config)
    }

    /// Deletes a repository and its permission roles.
    pub fn delete_repository(&self, name: &str) -> Result<()> {
        let name = decode_tilde(name);
        self.ensure_idle(&name)?;
        let key = cache_key(&name);
        let (had_forks, origin) = {
            let cache = self.cache.read();
            match cache.get(&key) {
                Some(model) => (
                    !view(&cache, model).forks.is_empty(),
                    model.origin_repository.clone(),
                ),
                None => (false, None),
            }
        };

        self.handles.drain(&*self.store, &name);
        self.retry
            .execute(|| self.store.delete(&name), StorageError::is_retryable)
            .map_err(|e| match e {
                StorageError::NotFound(n) => RegistryError::NotFound(n),
                e => e.into(),
            })?;
        info!(repository = %name, "deleted repository");

        if had_forks {
            self.reset_cache();
        } else {
            let mut cache = self.cache.write();
            cache.remove(&key);
            if let Some(origin) = origin.as_deref() {
                if let Some(entry) = cache.get_mut(&cache_key(origin)) {
                    entry.remove_fork(&name);
                }
            }
        }

        if let Err(e) = self.resolver.directory().delete_role(&name) {
            error!(repository = %name, error = %e, "failed to delete permission roles");
            return Err(RegistryError::PersistenceFailure(format!("{}: {}", name, e)));
        }
        Ok(())
    }

    /// Forks `origin` into the personal namespace of `user`.
    ///
    /// The fork is owned by `user`. Owners of the origin, and users and
    /// teams that can clone it, are granted clone access to the fork.
    /// Callers check [`PermissionResolver::can_fork`] first.
    pub fn fork(&self, origin: &RepositoryModel, user: &UserModel) -> Result<RepositoryModel> {
        let fork_name = format!(
            "{}/{}{}",
            user.personal_path(),
            strip_dot_git(last_path_element(&origin.name)),
            DOT_GIT
        );
        self.ensure_idle(&origin.name)?;
        if self.store.exists(&fork_name) {
            return Err(RegistryError::AlreadyExists(fork_name));
        }

        let source_url = self.store.local_url(&origin.name);
        let handle = self
            .store
            .clone_from(&source_url, &fork_name, true)
            .map_err(already_exists)?;
        info!(origin = %origin.name, fork = %fork_name, user = %user.username, "forked repository");

        let mut model = origin.clone_as(fork_name.clone());
        model.add_owner(user.username.clone());
        model.origin = Some(source_url);
        self.refresh_volatile(&handle, &mut model, &self.settings())?;
        let fork = self.update_repository_model(&fork_name, model, false)?;

        let directory = self.resolver.directory();
        let mut granted: HashSet<String> = HashSet::from([cache_key(&user.username)]);
        let mut users = Vec::new();
        for owner in &origin.owners {
            if !granted.insert(cache_key(owner)) {
                continue;
            }
            if let Some(mut owner) = directory.user(owner) {
                owner.set_repository_permission(&fork.name, AccessPermission::Clone);
                users.push(owner);
            }
        }
        for username in directory.usernames_with_role(&origin.name) {
            if !granted.insert(cache_key(&username)) {
                continue;
            }
            if let Some(mut member) = directory.user(&username) {
                if self.resolver.can_clone(&member, origin) {
                    member.set_repository_permission(&fork.name, AccessPermission::Clone);
                    users.push(member);
                }
            }
        }
        directory.update_users(users)?;

        let mut teams = Vec::new();
        for teamname in directory.teamnames_with_role(&origin.name) {
            if let Some(mut team) = directory.team(&teamname) {
                if PermissionResolver::team_can_clone(&team, origin) {
                    team.set_repository_permission(&fork.name, AccessPermission::Clone);
                    teams.push(team);
                }
            }
        }
        directory.update_teams(teams)?;
        Ok(fork)
    }

    /// Runs `f` over the linked fork graph: the cache when caching is
    /// enabled, otherwise a transient map loaded from the store.
    fn with_graph<T>(&self, f: impl FnOnce(&ModelMap) -> T) -> Result<T> {
        let settings = self.settings();
        if settings.cache_repository_list {
            self.list()?;
            let cache = self.cache.read();
            return Ok(f(&cache));
        }

        let mut models = ModelMap::new();
        for name in self.store.enumerate(&settings.scan_options())? {
            if self.gate.is_busy(&name) {
                continue;
            }
            if let Some(model) = self.load_model(&name, &settings)? {
                models.insert(cache_key(&model.name), model);
            }
        }
        link_forks(&mut models);
        Ok(f(&models))
    }

    /// Name of the fork `username` holds anywhere in the fork network of
    /// `origin`, if any.
    pub fn fork_of(&self, username: &str, origin: &str) -> Result<Option<String>> {
        let user_path = format!("{}/", personal_path(username));
        let origin = decode_tilde(origin);
        self.with_graph(|graph| {
            let mut roots: HashSet<String> = HashSet::from([cache_key(&origin)]);
            let mut current = graph.get(&cache_key(&origin));
            while let Some(model) = current {
                for fork in live_forks(graph, model) {
                    let key = cache_key(&fork.name);
                    if !key.starts_with(&user_path) {
                        roots.insert(key);
                    }
                }
                current = match model.origin_repository.as_deref() {
                    Some(parent) if roots.insert(cache_key(parent)) => {
                        graph.get(&cache_key(parent))
                    }
                    _ => None,
                };
            }

            let mut candidates: Vec<&RepositoryModel> = graph
                .iter()
                .filter(|(key, _)| key.starts_with(&user_path))
                .map(|(_, model)| model)
                .filter(|model| {
                    model
                        .origin_repository
                        .as_deref()
                        .is_some_and(|o| roots.contains(&cache_key(o)))
                })
                .collect();
            candidates.sort_by(|a, b| compare_repository_names(&a.name, &b.name));
            candidates.first().map(|model| model.name.clone())
        })
    }

    /// Check if `username` holds a fork in the network of `origin`.
    pub fn has_fork(&self, username: &str, origin: &str) -> Result<bool> {
        Ok(self.fork_of(username, origin)?.is_some())
    }

    /// The whole fork network containing `name`, rooted at its topmost
    /// known origin.
    pub fn fork_network(&self, name: &str) -> Result<Option<ForkModel>> {
        let name = decode_tilde(name);
        self.with_graph(|graph| {
            let mut root = graph.get(&cache_key(&name))?;
            let mut seen = HashSet::from([cache_key(&root.name)]);
            while let Some(parent) = root
                .origin_repository
                .as_deref()
                .and_then(|o| graph.get(&cache_key(o)))
            {
                if !seen.insert(cache_key(&parent.name)) {
                    break;
                }
                root = parent;
            }
            let mut network = build_network(graph, root, &mut HashSet::new());
            network.sort();
            Some(network)
        })
    }

    fn project_template(&self, name: &str, settings: &RegistrySettings) -> ProjectModel {
        let mut project = if name.is_empty() {
            let mut root = ProjectModel::root("");
            root.title = Some(settings.root_group_name.clone());
            root
        } else {
            ProjectModel::new(name)
        };

        let overrides = settings.projects.get(name).or_else(|| {
            if name.is_empty() {
                settings
                    .projects
                    .get(&settings.root_group_name.to_lowercase())
            } else {
                None
            }
        });
        if let Some(overrides) = overrides {
            if overrides.title.is_some() {
                project.title = overrides.title.clone();
            }
            project.description = overrides.description.clone();
        } else if let Some(username) = username_from_personal_path(name) {
            if let Some(owner) = self.resolver.directory().user(username) {
                project.title = Some(owner.display_name().to_string());
                project.description = Some("personal repositories".to_string());
            }
        }
        project
    }

    /// Projects holding at least one repository `user` may view, root
    /// project first.
    pub fn projects(&self, user: &UserModel, include_personal: bool) -> Result<Vec<ProjectModel>> {
        let settings = self.settings();
        let mut projects: BTreeMap<String, ProjectModel> = BTreeMap::new();
        for model in self.get_accessible(user)? {
            let key = model.project_path.to_lowercase();
            projects
                .entry(key.clone())
                .or_insert_with(|| self.project_template(&key, &settings))
                .add_repository_model(&model);
        }

        let root = projects.remove("");
        let mut ordered: Vec<ProjectModel> = projects
            .into_values()
            .filter(|p| include_personal || !p.is_user_project())
            .collect();
        if let Some(root) = root {
            ordered.insert(0, root);
        }
        Ok(ordered)
    }

    /// The project `name` as seen by `user`, or `None` when `user` can
    /// see none of its repositories.
    pub fn project(&self, name: &str, user: &UserModel) -> Result<Option<ProjectModel>> {
        let settings = self.settings();
        let name = decode_tilde(name).to_lowercase();
        let key = if name == settings.root_group_name.to_lowercase() {
            String::new()
        } else {
            name
        };

        let mut project = self.project_template(&key, &settings);
        for model in self.get_accessible(user)? {
            if model.project_path.eq_ignore_ascii_case(&key) {
                project.add_repository_model(&model);
            }
        }
        Ok(if project.repositories.is_empty() {
            None
        } else {
            Some(project)
        })
    }

    /// Every grant `user` holds, with explicit grants on repositories that
    /// no longer exist reported as missing.
    pub fn user_access_permissions(
        &self,
        user: &UserModel,
    ) -> Result<Vec<RegistrantAccessPermission>> {
        self.with_graph(|graph| {
            let models: Vec<RepositoryModel> = graph.values().cloned().collect();
            self.resolver
                .user_access_permissions(user, &models, |name| {
                    graph.contains_key(&cache_key(name))
                })
        })
    }

    /// Every user holding a grant on `model`.
    pub fn repository_user_permissions(
        &self,
        model: &RepositoryModel,
    ) -> Vec<RegistrantAccessPermission> {
        self.resolver.repository_user_permissions(model)
    }

    /// Every team holding a grant on `model`.
    pub fn repository_team_permissions(
        &self,
        model: &RepositoryModel,
    ) -> Vec<RegistrantAccessPermission> {
        self.resolver.repository_team_permissions(model)
    }

    /// Writes the editable user grants in `permissions`.
    pub fn set_user_access_permissions(
        &self,
        model: &RepositoryModel,
        permissions: &[RegistrantAccessPermission],
    ) -> Result<()> {
        Ok(self.resolver.set_user_access_permissions(model, permissions)?)
    }

    /// Writes the editable team grants in `permissions`.
    pub fn set_team_access_permissions(
        &self,
        model: &RepositoryModel,
        permissions: &[RegistrantAccessPermission],
    ) -> Result<()> {
        Ok(self.resolver.set_team_access_permissions(model, permissions)?)
    }

    /// Compacts a repository's storage. Does not consult the GC gate.
    pub fn compact(&self, name: &str) -> Result<()> {
        let repo = OpenRepository::open(&*self.store, &self.handles, name)?
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        self.store.compact(&repo)?;
        Ok(())
    }

    /// Clones `source_url` into a new repository `name` and returns its
    /// model.
    pub fn clone_remote(&self, source_url: &str, name: &str, bare: bool) -> Result<RepositoryModel> {
        let name = decode_tilde(name);
        self.ensure_idle(&name)?;
        if self.store.exists(&name) {
            return Err(RegistryError::AlreadyExists(name));
        }
        // Handles returned by clone_from are not counted by the store.
        self.store
            .clone_from(source_url, &name, bare)
            .map_err(already_exists)?;
        info!(repository = %name, source = %source_url, "cloned repository");
        self.get(&name)?
            .ok_or_else(|| RegistryError::NotFound(name.clone()))
    }

    /// Fetches a repository from its remotes.
    pub fn fetch(&self, name: &str) -> Result<()> {
        self.ensure_idle(name)?;
        let repo = OpenRepository::open(&*self.store, &self.handles, name)?
            .ok_or_else(|| RegistryError::NotFound(name.to_string()))?;
        self.store.fetch(&repo)?;
        debug!(repository = %name, "fetched repository");
        Ok(())
    }

    /// Current disk size of a repository.
    pub fn repository_size(&self, name: &str) -> Result<Option<u64>> {
        match OpenRepository::open(&*self.store, &self.handles, name)? {
            Some(repo) => Ok(Some(self.store.disk_size(&repo)?)),
            None => Ok(None),
        }
    }
}

fn already_exists(e: StorageError) -> RegistryError {
    match e {
        StorageError::AlreadyExists(name) => RegistryError::AlreadyExists(name),
        e => e.into(),
    }
}

fn invalid_rename(from: &str, to: &str, stage: RenameStage, reason: String) -> RegistryError {
    RegistryError::InvalidRename {
        from: from.to_string(),
        to: to.to_string(),
        stage,
        reason,
    }
}

/// Rebuilds every `forks` set from the `origin_repository` links.
fn link_forks(models: &mut ModelMap) {
    let links: Vec<(String, String)> = models
        .values()
        .filter_map(|m| {
            m.origin_repository
                .as_deref()
                .map(|origin| (cache_key(origin), m.name.clone()))
        })
        .collect();
    for model in models.values_mut() {
        model.forks.clear();
    }
    for (origin, fork) in links {
        if let Some(model) = models.get_mut(&origin) {
            model.add_fork(fork);
        }
    }
}

fn live_forks<'a>(
    graph: &'a ModelMap,
    model: &'a RepositoryModel,
) -> impl Iterator<Item = &'a RepositoryModel> + 'a {
    model
        .forks
        .iter()
        .filter_map(move |fork| graph.get(&cache_key(fork)))
        .filter(move |fork| fork.is_fork_of(&model.name))
}

/// Copy of `model` whose forks still point back at it.
fn view(graph: &ModelMap, model: &RepositoryModel) -> RepositoryModel {
    let mut copy = model.clone();
    copy.forks = live_forks(graph, model).map(|f| f.name.clone()).collect();
    copy
}

fn build_network(
    graph: &ModelMap,
    model: &RepositoryModel,
    visited: &mut HashSet<String>,
) -> ForkModel {
    visited.insert(cache_key(&model.name));
    let mut node = ForkModel::new(view(graph, model));
    for fork in live_forks(graph, model) {
        if visited.contains(&cache_key(&fork.name)) {
            continue;
        }
        node.forks.push(build_network(graph, fork, visited));
    }
    node
}
