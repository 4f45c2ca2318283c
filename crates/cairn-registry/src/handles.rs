//! Open repository handle accounting.
//!
//! The registry counts every handle it opens so that a rename or delete can
//! close each one before the repository is moved on disk.

use cairn_storage::{RepositoryHandle, RepositoryStore};
use cairn_types::cache_key;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::ops::Deref;
use tracing::debug;

/// Per-repository count of open handles.
#[derive(Debug, Default)]
pub struct HandleTracker {
    open: Mutex<HashMap<String, Vec<RepositoryHandle>>>,
}

impl HandleTracker {
    /// Creates an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an opened handle.
    pub fn acquire(&self, handle: &RepositoryHandle) {
        self.open
            .lock()
            .entry(cache_key(&handle.name))
            .or_default()
            .push(handle.clone());
    }

    /// Forgets one handle on `name`. Releasing more than was acquired is a
    /// no-op.
    pub fn release(&self, name: &str) {
        let key = cache_key(name);
        let mut open = self.open.lock();
        if let Some(handles) = open.get_mut(&key) {
            handles.pop();
            if handles.is_empty() {
                open.remove(&key);
            }
        }
    }

    /// Number of handles open on `name`.
    pub fn count(&self, name: &str) -> usize {
        self.open
            .lock()
            .get(&cache_key(name))
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Closes every handle open on `name`, once per acquisition.
    ///
    /// Returns the number of handles closed.
    pub fn drain(&self, store: &dyn RepositoryStore, name: &str) -> usize {
        let handles = self.open.lock().remove(&cache_key(name)).unwrap_or_default();
        for handle in &handles {
            store.close(handle);
        }
        if !handles.is_empty() {
            debug!(repository = %name, closed = handles.len(), "drained repository handles");
        }
        handles.len()
    }
}

/// A handle that is closed and released when dropped.
pub struct OpenRepository<'a> {
    handle: RepositoryHandle,
    store: &'a dyn RepositoryStore,
    tracker: &'a HandleTracker,
}

impl<'a> OpenRepository<'a> {
    /// Opens `name`, returning `None` when the store does not have it.
    pub fn open(
        store: &'a dyn RepositoryStore,
        tracker: &'a HandleTracker,
        name: &str,
    ) -> cairn_storage::Result<Option<Self>> {
        let Some(handle) = store.open(name)? else {
            return Ok(None);
        };
        tracker.acquire(&handle);
        Ok(Some(Self {
            handle,
            store,
            tracker,
        }))
    }
}

impl Deref for OpenRepository<'_> {
    type Target = RepositoryHandle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for OpenRepository<'_> {
    fn drop(&mut self) {
        // A drain may already have closed this handle.
        if self.tracker.count(&self.handle.name) > 0 {
            self.tracker.release(&self.handle.name);
            self.store.close(&self.handle);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_storage::MemoryStore;

    #[test]
    fn test_open_repository_closes_on_drop() {
        let store = MemoryStore::new();
        store.add_repository("a.git", true);
        let tracker = HandleTracker::new();
        {
            let repo = OpenRepository::open(&store, &tracker, "a.git").unwrap().unwrap();
            assert_eq!(repo.name, "a.git");
            assert_eq!(store.open_count("a.git"), 1);
            assert_eq!(tracker.count("A.git"), 1);
        }
        assert_eq!(store.open_count("a.git"), 0);
        assert_eq!(tracker.count("a.git"), 0);
    }

    #[test]
    fn test_open_missing_repository() {
        let store = MemoryStore::new();
        let tracker = HandleTracker::new();
        assert!(OpenRepository::open(&store, &tracker, "nope.git").unwrap().is_none());
        assert_eq!(tracker.count("nope.git"), 0);
    }

    #[test]
    fn test_drain_closes_every_handle() {
        let store = MemoryStore::new();
        store.add_repository("a.git", true);
        let tracker = HandleTracker::new();
        for _ in 0..3 {
            let handle = store.open("a.git").unwrap().unwrap();
            tracker.acquire(&handle);
        }
        assert_eq!(store.open_count("a.git"), 3);
        assert_eq!(tracker.drain(&store, "a.git"), 3);
        assert_eq!(store.open_count("a.git"), 0);
        assert_eq!(tracker.drain(&store, "a.git"), 0);
    }

    #[test]
    fn test_release_saturates() {
        let tracker = HandleTracker::new();
        tracker.release("a.git");
        assert_eq!(tracker.count("a.git"), 0);
    }
}
