//! Periodic background tasks.
//!
//! Each task runs on its own tokio loop, never on a request path. A run
//! that is still in progress when the next tick fires makes that tick a
//! no-op, so a task never overlaps itself.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// A unit of background work run on a period.
#[async_trait]
pub trait PeriodicTask: Send + Sync + 'static {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Runs the task once.
    async fn run(&self);
}

struct Guarded {
    task: Arc<dyn PeriodicTask>,
    running: AtomicBool,
}

impl Guarded {
    async fn run(&self) {
        if self.running.swap(true, Ordering::AcqRel) {
            debug!(task = %self.task.name(), "previous run still in progress, skipping");
            return;
        }
        let _reset = RunningGuard(&self.running);
        self.task.run().await;
    }
}

/// Clears the running flag when a run ends, including by panic.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the background loops and stops them on shutdown.
pub struct Scheduler {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Creates a scheduler with no tasks.
    pub fn new() -> Self {
        Self {
            cancel: CancellationToken::new(),
            handles: Vec::new(),
        }
    }

    /// Number of scheduled tasks.
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    /// Check if no task is scheduled.
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Runs `task` after `initial_delay`, then every `period`.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn(&mut self, task: Arc<dyn PeriodicTask>, initial_delay: Duration, period: Duration) {
        let cancel = self.cancel.clone();
        let guarded = Arc::new(Guarded {
            task,
            running: AtomicBool::new(false),
        });
        let handle = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + initial_delay, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                task = %guarded.task.name(),
                initial_delay_secs = initial_delay.as_secs(),
                period_secs = period.as_secs(),
                "scheduled task"
            );
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!(task = %guarded.task.name(), "task shutting down");
                        break;
                    }
                    _ = ticker.tick() => {
                        let run = guarded.clone();
                        tokio::spawn(async move { run.run().await });
                    }
                }
            }
        });
        self.handles.push(handle);
    }

    /// Stops every loop and waits for them to exit. Runs already in
    /// progress finish on their own.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            let _ = handle.await;
        }
    }
}

/// Delay from `now` (seconds since the epoch) until the next start of
/// `hour` UTC. Zero when `now` is exactly on the hour.
pub fn delay_until_hour(now: u64, hour: u32) -> Duration {
    let target = u64::from(hour % 24) * 60 * 60;
    let into_day = now % SECONDS_PER_DAY;
    let wait = if into_day <= target {
        target - into_day
    } else {
        SECONDS_PER_DAY - into_day + target
    };
    Duration::from_secs(wait)
}

/// One day.
pub fn daily() -> Duration {
    Duration::from_secs(SECONDS_PER_DAY)
}
