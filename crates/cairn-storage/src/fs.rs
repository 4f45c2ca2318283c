//! Filesystem-backed stores over a folder of git repositories.

use crate::{
    ConfigStore, LastChange, RepositoryConfig, RepositoryHandle, RepositoryStore, Result,
    ScanOptions, SharedMode, StorageError,
};
use cairn_types::cache_key;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::SystemTime;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Name of the file holding registry-managed settings inside a git directory.
pub const CONFIG_FILE: &str = "cairn.json";

const FILE_SCHEME: &str = "file://";
const REMOTE_PREFIX: &str = "remote.";

fn git(dir: Option<&Path>, args: &[&str]) -> Result<String> {
    let mut cmd = Command::new("git");
    if let Some(dir) = dir {
        cmd.arg("-C").arg(dir);
    }
    cmd.args(args);
    debug!(?dir, ?args, "Running git");

    let output = cmd.output()?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        return Err(StorageError::Command(format!("git {}: {}", args.join(" "), stderr)));
    }
    Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
}

fn is_bare_repository(path: &Path) -> bool {
    path.join("HEAD").is_file() && path.join("objects").is_dir()
}

fn is_work_tree(path: &Path) -> bool {
    path.join(".git").is_dir()
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn epoch_seconds(time: SystemTime) -> u64 {
    time.duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Repository store over a root folder of git repositories.
///
/// Bare repositories are folders holding `HEAD` and `objects/`; work trees
/// are folders holding `.git/`. History and maintenance go through the
/// `git` command line.
#[derive(Debug)]
pub struct FsRepositoryStore {
    root: PathBuf,
    open: RwLock<HashMap<String, usize>>,
}

impl FsRepositoryStore {
    /// Creates a store rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            open: RwLock::new(HashMap::new()),
        }
    }

    /// Root folder of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn handle_at(&self, name: &str, path: &Path) -> Option<RepositoryHandle> {
        if is_bare_repository(path) {
            Some(RepositoryHandle {
                name: name.to_string(),
                is_bare: true,
                location: Some(path.to_path_buf()),
            })
        } else if is_work_tree(path) {
            Some(RepositoryHandle {
                name: name.to_string(),
                is_bare: false,
                location: Some(path.join(".git")),
            })
        } else {
            None
        }
    }

    fn git_dir(handle: &RepositoryHandle) -> Result<&Path> {
        handle
            .location
            .as_deref()
            .ok_or_else(|| StorageError::NotFound(handle.name.clone()))
    }

    fn is_open(&self, name: &str) -> bool {
        self.open
            .read()
            .get(&cache_key(name))
            .is_some_and(|count| *count > 0)
    }

    fn name_of(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("/"))
        }
    }
}

impl RepositoryStore for FsRepositoryStore {
    fn enumerate(&self, scan: &ScanOptions) -> Result<Vec<String>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        let mut walker = WalkDir::new(&self.root).min_depth(1).into_iter();
        while let Some(entry) = walker.next() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_dir() {
                continue;
            }
            let path = entry.path();
            let bare = is_bare_repository(path);
            if bare || is_work_tree(path) {
                walker.skip_current_dir();
                let Some(name) = self.name_of(path) else {
                    continue;
                };
                let depth = entry.depth() - 1;
                if (scan.only_bare && !bare) || !scan.allows_depth(depth) || scan.is_excluded(&name)
                {
                    continue;
                }
                names.push(name);
            } else if !scan.allows_depth(entry.depth()) {
                walker.skip_current_dir();
            }
        }
        names.sort();
        Ok(names)
    }

    fn open(&self, name: &str) -> Result<Option<RepositoryHandle>> {
        let handle = self.handle_at(name, &self.path_of(name));
        if handle.is_some() {
            *self.open.write().entry(cache_key(name)).or_insert(0) += 1;
        }
        Ok(handle)
    }

    fn close(&self, handle: &RepositoryHandle) {
        let mut open = self.open.write();
        let key = cache_key(&handle.name);
        if let Some(count) = open.get_mut(&key) {
            *count = count.saturating_sub(1);
            if *count == 0 {
                open.remove(&key);
            }
        }
    }

    fn exists(&self, name: &str) -> bool {
        let path = self.path_of(name);
        is_bare_repository(&path) || is_work_tree(&path)
    }

    fn last_change(&self, handle: &RepositoryHandle) -> Result<LastChange> {
        let dir = Self::git_dir(handle)?;
        let out = git(
            Some(dir),
            &[
                "for-each-ref",
                "--sort=-committerdate",
                "--count=1",
                "--format=%(committerdate:unix)|%(authorname)",
                "refs/heads",
            ],
        )?;
        if let Some((when, author)) = out.split_once('|') {
            if let Ok(when) = when.trim().parse() {
                return Ok(LastChange {
                    when,
                    author: Some(author.trim().to_string()).filter(|a| !a.is_empty()),
                });
            }
        }
        Ok(LastChange {
            when: modified(dir).map(epoch_seconds).unwrap_or(0),
            author: None,
        })
    }

    fn has_commits(&self, handle: &RepositoryHandle) -> Result<bool> {
        let dir = Self::git_dir(handle)?;
        let out = git(Some(dir), &["rev-list", "--all", "--max-count=1"])?;
        Ok(!out.is_empty())
    }

    fn disk_size(&self, handle: &RepositoryHandle) -> Result<u64> {
        let dir = Self::git_dir(handle)?;
        Ok(WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| e.metadata().ok())
            .map(|m| m.len())
            .sum())
    }

    fn create(&self, name: &str, shared: SharedMode) -> Result<RepositoryHandle> {
        let path = self.path_of(name);
        if path.exists() {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }
        fs::create_dir_all(&path)?;
        let shared = format!("--shared={}", shared.git_value());
        let target = path.to_string_lossy();
        git(None, &["init", "--bare", "--quiet", shared.as_str(), &*target])?;
        self.handle_at(name, &path)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn clone_from(&self, source_url: &str, name: &str, bare: bool) -> Result<RepositoryHandle> {
        let path = self.path_of(name);
        if path.exists() {
            return Err(StorageError::AlreadyExists(name.to_string()));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let target = path.to_string_lossy();
        let mut args = vec!["clone", "--quiet"];
        if bare {
            args.push("--bare");
        }
        args.push(source_url);
        args.push(&*target);
        git(None, &args)?;
        self.handle_at(name, &path)
            .ok_or_else(|| StorageError::NotFound(name.to_string()))
    }

    fn fetch(&self, handle: &RepositoryHandle) -> Result<()> {
        let dir = Self::git_dir(handle)?;
        git(Some(dir), &["fetch", "--all", "--prune", "--quiet"]).map(|_| ())
    }

    fn rename(&self, from: &str, to: &str) -> Result<()> {
        if self.is_open(from) {
            return Err(StorageError::InUse(from.to_string()));
        }
        let source = self.path_of(from);
        let target = self.path_of(to);
        if !source.exists() {
            return Err(StorageError::NotFound(from.to_string()));
        }
        if target.exists() && !cache_key(from).eq(&cache_key(to)) {
            return Err(StorageError::AlreadyExists(to.to_string()));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&source, &target)?;
        Ok(())
    }

    fn delete(&self, name: &str) -> Result<()> {
        if self.is_open(name) {
            return Err(StorageError::InUse(name.to_string()));
        }
        let path = self.path_of(name);
        if !path.exists() {
            return Err(StorageError::NotFound(name.to_string()));
        }
        fs::remove_dir_all(&path)?;
        Ok(())
    }

    fn local_url(&self, name: &str) -> String {
        format!("{}{}", FILE_SCHEME, self.path_of(name).to_string_lossy())
    }

    fn resolve_local_url(&self, url: &str) -> Option<String> {
        let path = Path::new(url.strip_prefix(FILE_SCHEME)?);
        let name = self.name_of(path)?;
        if self.exists(&name) {
            Some(name)
        } else {
            None
        }
    }

    fn compact(&self, handle: &RepositoryHandle) -> Result<()> {
        let dir = Self::git_dir(handle)?;
        git(Some(dir), &["gc", "--quiet"]).map(|_| ())
    }
}

/// Configuration store that keeps registry settings in [`CONFIG_FILE`].
///
/// `remote.*` keys live in the repository's own git config and are
/// overlaid on read.
#[derive(Debug, Default)]
pub struct FsConfigStore {
    read_at: RwLock<HashMap<PathBuf, Option<SystemTime>>>,
}

impl FsConfigStore {
    /// Creates a configuration store.
    pub fn new() -> Self {
        Self::default()
    }

    fn git_dir(handle: &RepositoryHandle) -> Result<&Path> {
        handle
            .location
            .as_deref()
            .ok_or_else(|| StorageError::NotFound(handle.name.clone()))
    }

    fn remotes(git_dir: &Path) -> Result<RepositoryConfig> {
        let mut remotes = RepositoryConfig::new();
        let path = git_dir.join("config");
        if !path.is_file() {
            return Ok(remotes);
        }
        let text = fs::read_to_string(path)?;
        let mut section: Option<String> = None;
        for line in text.lines().map(str::trim) {
            if line.starts_with('[') && line.ends_with(']') {
                section = line[1..line.len() - 1]
                    .strip_prefix("remote ")
                    .map(|rest| rest.trim().trim_matches('"').to_string());
                continue;
            }
            let (Some(remote), Some((key, value))) = (&section, line.split_once('=')) else {
                continue;
            };
            remotes.set(
                format!("{}{}.{}", REMOTE_PREFIX, remote, key.trim()),
                value.trim(),
            );
        }
        Ok(remotes)
    }
}

impl ConfigStore for FsConfigStore {
    fn read(&self, handle: &RepositoryHandle) -> Result<RepositoryConfig> {
        let dir = Self::git_dir(handle)?;
        let file = dir.join(CONFIG_FILE);
        let stamp = modified(&file);
        let mut config = if file.is_file() {
            let text = fs::read_to_string(&file)?;
            serde_json::from_str::<RepositoryConfig>(&text)
                .map_err(|e| StorageError::Serialization(e.to_string()))?
        } else {
            RepositoryConfig::new()
        };
        config.merge(&Self::remotes(dir)?);
        self.read_at.write().insert(file, stamp);
        Ok(config)
    }

    fn is_stale(&self, handle: &RepositoryHandle) -> Result<bool> {
        let file = Self::git_dir(handle)?.join(CONFIG_FILE);
        let current = modified(&file);
        Ok(self.read_at.read().get(&file) != Some(&current))
    }

    fn write(&self, handle: &RepositoryHandle, config: &RepositoryConfig) -> Result<()> {
        let dir = Self::git_dir(handle)?;
        let existing = Self::remotes(dir)?;

        let mut local = RepositoryConfig::new();
        for (key, value) in config.iter() {
            if key.starts_with(REMOTE_PREFIX) {
                if existing.get(key) != Some(value) {
                    let file = dir.join("config");
                    let file = file.to_string_lossy();
                    git(None, &["config", "--file", &*file, key, value])?;
                }
            } else {
                local.set(key, value);
            }
        }

        let text = serde_json::to_string_pretty(&local)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        fs::write(dir.join(CONFIG_FILE), text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn fake_bare(root: &Path, name: &str) {
        let path = root.join(name);
        fs::create_dir_all(path.join("objects")).unwrap();
        fs::write(path.join("HEAD"), "ref: refs/heads/master\n").unwrap();
    }

    fn fake_work_tree(root: &Path, name: &str) {
        fs::create_dir_all(root.join(name).join(".git")).unwrap();
    }

    #[test]
    fn test_enumerate() {
        let dir = TempDir::new().unwrap();
        fake_bare(dir.path(), "top.git");
        fake_bare(dir.path(), "proj/a.git");
        fake_bare(dir.path(), "proj/deep/b.git");
        fake_work_tree(dir.path(), "work");
        fs::create_dir_all(dir.path().join("empty/folder")).unwrap();

        let store = FsRepositoryStore::new(dir.path());
        let all = store.enumerate(&ScanOptions::default()).unwrap();
        assert_eq!(all, vec!["proj/a.git", "proj/deep/b.git", "top.git", "work"]);

        let scan = ScanOptions {
            only_bare: true,
            recursion_depth: 1,
            ..ScanOptions::default()
        };
        assert_eq!(store.enumerate(&scan).unwrap(), vec!["proj/a.git", "top.git"]);
    }

    #[test]
    fn test_rename_and_delete() {
        let dir = TempDir::new().unwrap();
        fake_bare(dir.path(), "proj/a.git");
        let store = FsRepositoryStore::new(dir.path());

        let handle = store.open("proj/a.git").unwrap().unwrap();
        assert!(handle.is_bare);
        assert!(matches!(
            store.rename("proj/a.git", "other/b.git"),
            Err(StorageError::InUse(_))
        ));
        store.close(&handle);

        store.rename("proj/a.git", "other/b.git").unwrap();
        assert!(!store.exists("proj/a.git"));
        assert!(store.exists("other/b.git"));

        store.delete("other/b.git").unwrap();
        assert!(!store.exists("other/b.git"));
    }

    #[test]
    fn test_disk_size() {
        let dir = TempDir::new().unwrap();
        fake_bare(dir.path(), "a.git");
        fs::write(dir.path().join("a.git/objects/pack"), vec![0u8; 1000]).unwrap();
        let store = FsRepositoryStore::new(dir.path());
        let handle = store.open("a.git").unwrap().unwrap();
        assert!(store.disk_size(&handle).unwrap() >= 1000);
    }

    #[test]
    fn test_local_url_round_trip() {
        let dir = TempDir::new().unwrap();
        fake_bare(dir.path(), "proj/a.git");
        let store = FsRepositoryStore::new(dir.path());
        let url = store.local_url("proj/a.git");
        assert_eq!(store.resolve_local_url(&url).as_deref(), Some("proj/a.git"));
        assert!(store.resolve_local_url("https://elsewhere/a.git").is_none());
    }

    #[test]
    fn test_config_store() {
        let dir = TempDir::new().unwrap();
        fake_bare(dir.path(), "a.git");
        fs::write(
            dir.path().join("a.git/config"),
            "[core]\n\tbare = true\n[remote \"origin\"]\n\turl = https://upstream/a.git\n",
        )
        .unwrap();

        let repos = FsRepositoryStore::new(dir.path());
        let configs = FsConfigStore::new();
        let handle = repos.open("a.git").unwrap().unwrap();

        assert!(configs.is_stale(&handle).unwrap());
        let config = configs.read(&handle).unwrap();
        assert_eq!(config.get("remote.origin.url"), Some("https://upstream/a.git"));
        assert!(config.get("core.bare").is_none());
        assert!(!configs.is_stale(&handle).unwrap());

        let mut updated = config.clone();
        updated.set("cairn.description", "hello");
        configs.write(&handle, &updated).unwrap();

        let reread = configs.read(&handle).unwrap();
        assert_eq!(reread.get("cairn.description"), Some("hello"));
        assert_eq!(reread.get("remote.origin.url"), Some("https://upstream/a.git"));

        let stored = fs::read_to_string(dir.path().join("a.git").join(CONFIG_FILE)).unwrap();
        assert!(!stored.contains("remote.origin.url"));
    }
}
