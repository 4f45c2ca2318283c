//! Periodic garbage collection of repository storage.

use crate::error::Result;
use crate::gate::GcTracker;
use crate::registry::Registry;
use cairn_types::{format_size, RepositoryModel};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// Outcome of one garbage collection pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Repositories that were compacted.
    pub collected: Vec<String>,
    /// Repositories that did not need collecting.
    pub skipped: usize,
    /// Repositories that failed, with the reason.
    pub failed: Vec<(String, String)>,
}

/// Scans the registry and compacts repositories that are due.
///
/// A repository is due when it holds data and either its collection
/// period elapsed since the last run or its size reached its threshold.
/// While a repository is compacted the [`GcTracker`] marks it busy.
pub struct GarbageCollector {
    registry: Arc<Registry>,
    tracker: Arc<GcTracker>,
    running: AtomicBool,
}

impl GarbageCollector {
    /// Creates a collector. `tracker` must be the gate `registry` consults.
    pub fn new(registry: Arc<Registry>, tracker: Arc<GcTracker>) -> Self {
        Self {
            registry,
            tracker,
            running: AtomicBool::new(false),
        }
    }

    /// Check if a pass is in progress.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Runs one pass at time `now` (seconds since the epoch).
    ///
    /// Returns an empty report if another pass is still running.
    pub fn run_once(&self, now: u64) -> Result<GcReport> {
        if self.running.swap(true, Ordering::AcqRel) {
            warn!("garbage collection is already running");
            return Ok(GcReport::default());
        }
        let result = self.scan(now);
        self.running.store(false, Ordering::Release);
        result
    }

    fn scan(&self, now: u64) -> Result<GcReport> {
        let start = Instant::now();
        let mut report = GcReport::default();
        for name in self.registry.list()? {
            match self.collect(&name, now) {
                Ok(true) => report.collected.push(name),
                Ok(false) => report.skipped += 1,
                Err(e) => {
                    error!(repository = %name, error = %e, "garbage collection failed");
                    report.failed.push((name, e.to_string()));
                }
            }
        }
        info!(
            collected = report.collected.len(),
            skipped = report.skipped,
            failed = report.failed.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "garbage collection finished"
        );
        Ok(report)
    }

    fn collect(&self, name: &str, now: u64) -> Result<bool> {
        let Some(model) = self.registry.get(name)? else {
            return Ok(false);
        };
        if model.is_collecting_garbage || model.is_frozen || !model.has_commits {
            return Ok(false);
        }
        let size = self.registry.repository_size(&model.name)?.unwrap_or(0);
        if !is_due(&model, size, now) {
            return Ok(false);
        }

        {
            let Some(_guard) = self.tracker.begin(&model.name) else {
                warn!(repository = %model.name, "already collecting garbage");
                return Ok(false);
            };
            info!(repository = %model.name, size = %format_size(size), "collecting garbage");
            self.registry.compact(&model.name)?;
        }

        let mut updated = model;
        updated.last_gc = now;
        let old_name = updated.name.clone();
        self.registry
            .update_repository_model(&old_name, updated, false)?;
        debug!(repository = %old_name, "recorded garbage collection");
        Ok(true)
    }
}

fn is_due(model: &RepositoryModel, size: u64, now: u64) -> bool {
    if size == 0 {
        return false;
    }
    let next_run = model
        .last_gc
        .saturating_add(u64::from(model.gc_period) * SECONDS_PER_DAY);
    now >= next_run || size >= model.gc_threshold
}
