//! Bounded retry with exponential backoff for store calls.
//!
//! # Responsibility
//! - Re-run transient-failure-prone store operations (reads, bulk updates).
//! - Keep the policy an explicit value handed to each component.
//!
//! # Invariants
//! - At most `attempts` calls are made; `0` behaves as `1`.
//! - Only errors with `StoreError::is_transient()` are retried.
//! - After exhaustion the last error is returned unchanged.

use crate::repo::comment_repo::StoreResult;
use log::warn;
use std::thread;
use std::time::Duration;

const MAX_RETRY_DELAY: Duration = Duration::from_secs(30);

/// Retry configuration for store calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of tries, including the first one.
    pub attempts: u32,
    /// Wait before the first retry.
    pub base_delay: Duration,
    /// Multiplier applied to the wait for every further retry.
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_millis(100),
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn no_retry() -> Self {
        Self {
            attempts: 1,
            base_delay: Duration::ZERO,
            backoff_factor: 1.0,
        }
    }

    /// Wait before retry number `retry` (1-based): `base * factor^(retry-1)`,
    /// capped at 30 seconds.
    pub fn delay_for_retry(&self, retry: u32) -> Duration {
        let exponent = i32::try_from(retry.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = self.base_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        if !secs.is_finite() || secs < 0.0 {
            return MAX_RETRY_DELAY;
        }
        Duration::try_from_secs_f64(secs)
            .map(|delay| delay.min(MAX_RETRY_DELAY))
            .unwrap_or(MAX_RETRY_DELAY)
    }

    /// Runs `op`, retrying transient failures according to the policy.
    ///
    /// `operation` names the call in log events.
    pub fn run<T>(
        &self,
        operation: &str,
        mut op: impl FnMut() -> StoreResult<T>,
    ) -> StoreResult<T> {
        let attempts = self.attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(err) if attempt < attempts && err.is_transient() => {
                    let delay = self.delay_for_retry(attempt);
                    warn!(
                        "event=store_retry module=retry status=retrying op={} attempt={}/{} delay_ms={} error={}",
                        operation,
                        attempt,
                        attempts,
                        delay.as_millis(),
                        err
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
