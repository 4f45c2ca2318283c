//! Garbage collection admission gate.

use cairn_types::cache_key;
use parking_lot::RwLock;
use std::collections::HashSet;
use tracing::debug;

/// Reports whether maintenance currently holds a repository.
///
/// Reads of a busy repository are served from cache; writes fail.
pub trait GcGate: Send + Sync {
    /// Check if garbage collection is running on `name`.
    fn is_busy(&self, name: &str) -> bool;
}

/// Busy set owned by the garbage collector.
#[derive(Debug, Default)]
pub struct GcTracker {
    busy: RwLock<HashSet<String>>,
}

impl GcTracker {
    /// Creates an idle tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `name` busy until the returned guard is dropped.
    ///
    /// Returns `None` when the repository is already being collected.
    pub fn begin(&self, name: &str) -> Option<GcGuard<'_>> {
        let key = cache_key(name);
        if !self.busy.write().insert(key.clone()) {
            return None;
        }
        debug!(repository = %name, "gc gate closed");
        Some(GcGuard { tracker: self, key })
    }

    /// Names currently being collected.
    pub fn busy(&self) -> Vec<String> {
        let mut names: Vec<String> = self.busy.read().iter().cloned().collect();
        names.sort();
        names
    }

    fn release(&self, key: &str) {
        self.busy.write().remove(key);
        debug!(repository = %key, "gc gate opened");
    }
}

impl GcGate for GcTracker {
    fn is_busy(&self, name: &str) -> bool {
        self.busy.read().contains(&cache_key(name))
    }
}

/// Keeps a repository marked busy for as long as it lives.
#[derive(Debug)]
pub struct GcGuard<'a> {
    tracker: &'a GcTracker,
    key: String,
}

impl Drop for GcGuard<'_> {
    fn drop(&mut self) {
        self.tracker.release(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guard_clears_on_drop() {
        let tracker = GcTracker::new();
        {
            let _guard = tracker.begin("Proj/A.git").unwrap();
            assert!(tracker.is_busy("proj/a.git"));
            assert_eq!(tracker.busy(), vec!["proj/a.git".to_string()]);
        }
        assert!(!tracker.is_busy("proj/a.git"));
        assert!(tracker.busy().is_empty());
    }

    #[test]
    fn test_begin_twice_is_refused() {
        let tracker = GcTracker::new();
        let _guard = tracker.begin("a.git").unwrap();
        assert!(tracker.begin("A.git").is_none());
        assert!(tracker.begin("b.git").is_some());
    }
}
