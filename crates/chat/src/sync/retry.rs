//! Exponential backoff for transient remote failures

use std::time::{Duration, Instant};

use log::warn;
use serde::{Deserialize, Serialize};

use super::SyncError;
use crate::remote::{ErrorClass, RemoteError, classify};

/// Backoff schedule and budget for retrying transient page failures
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Delay before the first retry
    pub initial_delay_ms: u64,
    /// Upper bound for any single delay
    pub max_delay_ms: u64,
    /// Growth factor between consecutive delays
    pub multiplier: f64,
    /// Total time budget across all attempts for one page
    pub max_elapsed_secs: u64,
    /// Optional cap on the number of attempts
    pub max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay_ms: 500,
            max_delay_ms: 60_000,
            multiplier: 2.0,
            max_elapsed_secs: 10 * 60,
            max_attempts: None,
        }
    }
}

impl RetryPolicy {
    /// Retry without sleeping, at most `max_attempts` attempts in total
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            initial_delay_ms: 0,
            max_delay_ms: 0,
            multiplier: 1.0,
            max_elapsed_secs: 60,
            max_attempts: Some(max_attempts),
        }
    }

    /// Delay before retry number `retry` (0-based), without jitter
    pub fn delay_for(&self, retry: u32) -> Duration {
        let base = self.initial_delay_ms as f64 * self.multiplier.max(1.0).powi(retry as i32);
        Duration::from_millis(base.min(self.max_delay_ms as f64) as u64)
    }

    fn budget(&self) -> Duration {
        Duration::from_secs(self.max_elapsed_secs)
    }

    /// Run `op`, retrying transient failures until the budget runs out.
    ///
    /// Fatal errors are returned immediately as [`SyncError::Remote`].
    pub fn run<T>(
        &self,
        what: &str,
        mut op: impl FnMut() -> Result<T, RemoteError>,
    ) -> Result<T, SyncError> {
        let start = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let error = match op() {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if classify(&error) == ErrorClass::Fatal {
                return Err(SyncError::Remote(error));
            }

            let elapsed = start.elapsed();
            let out_of_attempts = self.max_attempts.is_some_and(|max| attempts >= max);
            if out_of_attempts || elapsed >= self.budget() {
                return Err(SyncError::RetryExhausted {
                    attempts,
                    elapsed,
                    source: error,
                });
            }

            let remaining = self.budget() - elapsed;
            let delay = self.delay_for(attempts - 1);
            let delay = (delay + jitter(delay)).min(remaining);
            warn!(
                "{}: transient error (attempt {}), retrying in {:?}: {}",
                what, attempts, delay, error.message
            );
            if !delay.is_zero() {
                std::thread::sleep(delay);
            }
        }
    }
}

/// Up to 100ms of jitter for non-zero delays
fn jitter(delay: Duration) -> Duration {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    if delay.is_zero() {
        return Duration::ZERO;
    }
    let hasher = RandomState::new().build_hasher();
    Duration::from_millis(hasher.finish() % 100)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteErrorKind;

    fn transient() -> RemoteError {
        RemoteError::api("Field implementation threw an exception")
    }

    #[test]
    fn test_delay_grows_and_caps() {
        let policy = RetryPolicy {
            initial_delay_ms: 100,
            max_delay_ms: 1000,
            multiplier: 2.0,
            ..RetryPolicy::default()
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(800));
        assert_eq!(policy.delay_for(4), Duration::from_millis(1000));
        assert_eq!(policy.delay_for(30), Duration::from_millis(1000));
    }

    #[test]
    fn test_transient_then_success() {
        let mut calls = 0;
        let result = RetryPolicy::immediate(5).run("page", || {
            calls += 1;
            if calls < 3 { Err(transient()) } else { Ok(calls) }
        });
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_fatal_is_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = RetryPolicy::immediate(5).run("page", || {
            calls += 1;
            Err(RemoteError::new(RemoteErrorKind::Http(403), "forbidden"))
        });
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(SyncError::Remote(_))));
    }

    #[test]
    fn test_attempt_cap_exhausts() {
        let mut calls = 0;
        let result: Result<(), _> = RetryPolicy::immediate(4).run("page", || {
            calls += 1;
            Err(transient())
        });
        assert_eq!(calls, 4);
        assert!(matches!(
            result,
            Err(SyncError::RetryExhausted { attempts: 4, .. })
        ));
    }

    #[test]
    fn test_zero_budget_exhausts_after_first_attempt() {
        let policy = RetryPolicy {
            max_elapsed_secs: 0,
            ..RetryPolicy::default()
        };
        let mut calls = 0;
        let result: Result<(), _> = policy.run("page", || {
            calls += 1;
            Err(transient())
        });
        assert_eq!(calls, 1);
        assert!(matches!(result, Err(SyncError::RetryExhausted { .. })));
    }
}
