//! Registry cache counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters updated by the registry.
#[derive(Debug, Default)]
pub struct RegistryMetrics {
    rebuilds: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    reloads: AtomicU64,
    evictions: AtomicU64,
    busy_rejections: AtomicU64,
}

impl RegistryMetrics {
    pub(crate) fn record_rebuild(&self) {
        self.rebuilds.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_reload(&self) {
        self.reloads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_eviction(&self) {
        self.evictions.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_busy_rejection(&self) {
        self.busy_rejections.fetch_add(1, Ordering::Relaxed);
    }

    /// Snapshot of the counters.
    pub fn snapshot(&self) -> RegistryStats {
        RegistryStats {
            rebuilds: self.rebuilds.load(Ordering::Relaxed),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            busy_rejections: self.busy_rejections.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time registry counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Full cache rebuilds.
    pub rebuilds: u64,
    /// Lookups answered from a fresh cache entry.
    pub hits: u64,
    /// Lookups that had to load the model.
    pub misses: u64,
    /// Cache entries replaced because their configuration changed.
    pub reloads: u64,
    /// Cache entries dropped because the repository vanished.
    pub evictions: u64,
    /// Writes refused while garbage collection held the repository.
    pub busy_rejections: u64,
}

impl RegistryStats {
    /// Fraction of lookups answered from cache.
    pub fn hit_ratio(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}
