//! Retry with exponential backoff and a per-attempt timeout.
//!
//! One [`RetryPolicy`] governs every network-facing call against the shared
//! store. Only errors that [`Error::is_transient`] reports as transient are
//! retried; everything else returns immediately.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use crate::defaults;
use crate::error::{Error, Result};

/// Attempt count, backoff and timeout for network calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first. Never less than 1.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay: Duration,
    /// Growth factor applied to the delay after each further failure.
    pub multiplier: f64,
    /// Upper bound on each individual attempt.
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::RETRY_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(defaults::RETRY_BASE_DELAY_MS),
            multiplier: defaults::RETRY_MULTIPLIER,
            timeout: Duration::from_secs(defaults::REQUEST_TIMEOUT_SECS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            ..Self::default()
        }
    }

    /// A policy that makes exactly one attempt.
    pub fn single_attempt() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Delay to wait after the given failed attempt (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        self.base_delay.mul_f64(self.multiplier.powi(exponent))
    }

    /// Run one attempt of `operation`, bounded by the policy timeout.
    pub async fn attempt_once<T, Fut>(&self, operation: &str, fut: Fut) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                operation: operation.to_string(),
                after_ms: self.timeout.as_millis() as u64,
            }),
        }
    }

    /// Run `make_attempt` until it succeeds, fails permanently, or the
    /// attempts run out. The last error is returned unchanged.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut make_attempt: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;
            match self.attempt_once(operation, make_attempt()).await {
                Ok(value) => {
                    if attempt > 1 {
                        debug!(op = operation, attempt, "Recovered after retry");
                    }
                    return Ok(value);
                }
                Err(e) if e.is_transient() && attempt < max_attempts => {
                    let delay = self.delay_after(attempt);
                    warn!(
                        op = operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    if e.is_transient() {
                        warn!(
                            op = operation,
                            attempt,
                            error = %e,
                            "Retry attempts exhausted"
                        );
                    }
                    return Err(e);
                }
            }
        }
    }
}
