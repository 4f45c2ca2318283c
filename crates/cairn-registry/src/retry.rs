//! Bounded retry for filesystem operations that race with open handles.

use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Retry policy with exponential backoff.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
    /// Backoff multiplier.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(50),
            max_delay: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Create a new retry policy.
    pub fn new(max_attempts: u32, initial_delay: Duration) -> Self {
        Self {
            max_attempts,
            initial_delay,
            ..Default::default()
        }
    }

    /// Policy that never waits, for tests.
    pub fn immediate(max_attempts: u32) -> Self {
        Self::new(max_attempts, Duration::ZERO)
    }

    /// Calculate delay for a given attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base_delay_ms = self.initial_delay.as_millis() as f64;
        let delay_ms = base_delay_ms * self.multiplier.powi(attempt as i32 - 1);
        Duration::from_millis(delay_ms.min(self.max_delay.as_millis() as f64) as u64)
    }

    /// Runs `operation` until it succeeds, fails with an error for which
    /// `retryable` is false, or the attempts run out.
    pub fn execute<T, E, F, R>(&self, mut operation: F, retryable: R) -> Result<T, E>
    where
        F: FnMut() -> Result<T, E>,
        R: Fn(&E) -> bool,
        E: std::fmt::Debug,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match operation() {
                Ok(result) => return Ok(result),
                Err(e) if !retryable(&e) => return Err(e),
                Err(e) => {
                    if attempt >= self.max_attempts {
                        warn!(attempt, max_attempts = self.max_attempts, error = ?e, "retry exhausted");
                        return Err(e);
                    }
                    let delay = self.delay_for_attempt(attempt);
                    debug!(attempt, delay_ms = delay.as_millis() as u64, error = ?e, "retrying after delay");
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_backoff() {
        let policy = RetryPolicy::new(5, Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(policy.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(1));
    }

    #[test]
    fn test_retries_until_success() {
        let mut calls = 0;
        let result: Result<u32, &str> = RetryPolicy::immediate(3).execute(
            || {
                calls += 1;
                if calls < 3 {
                    Err("busy")
                } else {
                    Ok(calls)
                }
            },
            |_| true,
        );
        assert_eq!(result, Ok(3));
    }

    #[test]
    fn test_attempts_are_bounded() {
        let mut calls = 0;
        let result: Result<(), &str> = RetryPolicy::immediate(4).execute(
            || {
                calls += 1;
                Err("busy")
            },
            |_| true,
        );
        assert!(result.is_err());
        assert_eq!(calls, 4);
    }

    #[test]
    fn test_fatal_error_is_not_retried() {
        let mut calls = 0;
        let result: Result<(), &str> = RetryPolicy::immediate(4).execute(
            || {
                calls += 1;
                Err("gone")
            },
            |e| *e == "busy",
        );
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
