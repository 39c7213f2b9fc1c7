//! Caller-side retry with exponential backoff.
//!
//! Gateways make exactly one attempt per call. Callers that want more wrap
//! the call in [`RetryPolicy::run`], which only repeats failures whose
//! kind is retryable (`Network`). Malformed payloads, invalid queries and
//! budget failures come back on the first attempt.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::ProviderResult;

/// Backoff schedule for retryable provider failures.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    jitter: f64,
}

impl RetryPolicy {
    /// A policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
            jitter: 0.0,
        }
    }

    /// Total attempts, including the first.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before attempt `attempt + 1`, given that `attempt` (1-based)
    /// just failed. Doubles each time up to the cap, then jitters by
    /// `±jitter` of the result.
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(20);
        let base = self
            .initial_backoff
            .saturating_mul(1_u32 << exponent)
            .min(self.max_backoff);
        if self.jitter == 0.0 || base.is_zero() {
            return base;
        }
        let base_secs = base.as_secs_f64();
        let jitter = (rand::random::<f64>() * 2.0 - 1.0) * base_secs * self.jitter;
        Duration::from_secs_f64((base_secs + jitter).max(0.0))
    }

    /// Run `op` until it succeeds, fails with a non-retryable kind, or the
    /// attempt budget is spent. The last failure is returned.
    ///
    /// # Errors
    /// The failure from the final attempt.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> ProviderResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = ProviderResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(label, attempt, "Succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(failure) if failure.is_retryable() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        label,
                        attempt,
                        max_attempts = self.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        detail = %failure.detail,
                        "Retryable failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(failure) => return Err(failure),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            jitter: config.jitter.clamp(0.0, 1.0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ErrorKind, ProviderFailure};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(jitter: f64) -> RetryPolicy {
        RetryPolicy::from(&RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 100,
            max_backoff_ms: 250,
            jitter,
        })
    }

    #[test]
    fn backoff_doubles_then_caps() {
        let policy = policy(0.0);
        assert_eq!(policy.delay_for(1), Duration::from_millis(100));
        assert_eq!(policy.delay_for(2), Duration::from_millis(200));
        assert_eq!(policy.delay_for(3), Duration::from_millis(250));
        assert_eq!(policy.delay_for(40), Duration::from_millis(250));
    }

    #[test]
    fn jitter_stays_in_band() {
        let policy = policy(0.2);
        for _ in 0..200 {
            let delay = policy.delay_for(1).as_secs_f64();
            assert!((0.079..=0.121).contains(&delay), "delay {delay} out of band");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn network_failures_are_retried() {
        let calls = AtomicU32::new(0);
        let result = policy(0.0)
            .run("test", || async {
                if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(ProviderFailure::network("503"))
                } else {
                    Ok(7)
                }
            })
            .await;
        assert_eq!(result, Ok(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: ProviderResult<()> = policy(0.0)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderFailure::network("down"))
            })
            .await;
        assert_eq!(result.expect_err("exhausted").kind, ErrorKind::Network);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn malformed_is_not_retried() {
        let calls = AtomicU32::new(0);
        let result: ProviderResult<()> = policy(0.0)
            .run("test", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ProviderFailure::malformed("garbage"))
            })
            .await;
        assert_eq!(result.expect_err("malformed").kind, ErrorKind::MalformedResponse);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
