//! Retry with exponential backoff, jitter and idempotency awareness

use crate::error::RetryError;
use bucketgate_backend::{BackendError, SideEffect};
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Default number of attempts, the first one included
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default delay after the first failure
pub const DEFAULT_BASE_DELAY: Duration = Duration::from_millis(100);

/// Default upper bound for a single backoff delay (before jitter)
pub const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Retry policy configuration
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: DEFAULT_BASE_DELAY,
            max_delay: DEFAULT_MAX_DELAY,
        }
    }
}

impl RetryConfig {
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }
}

/// What to do with a failed attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    /// Retryable kind, but replaying could apply the request twice
    Unsafe,
    Terminal,
}

impl RetryDecision {
    pub fn for_error(error: &BackendError, idempotent: bool) -> Self {
        if !error.is_retryable() {
            Self::Terminal
        } else if !idempotent && error.side_effect == SideEffect::Possible {
            Self::Unsafe
        } else {
            Self::Retry
        }
    }
}

/// Retry engine shared by every gateway operation
#[derive(Clone, Debug, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Backoff before jitter after the `failures`-th failed attempt (1-based):
    /// `min(max_delay, base_delay * 2^(failures - 1))`
    pub fn backoff_delay(&self, failures: u32) -> Duration {
        let factor = 2u32.saturating_pow(failures.saturating_sub(1));
        self.config
            .base_delay
            .saturating_mul(factor)
            .min(self.config.max_delay)
    }

    /// Backoff plus uniform jitter in `[0, delay / 2]`
    fn jittered_delay(&self, failures: u32) -> Duration {
        let delay = self.backoff_delay(failures);
        let max_jitter = delay.as_millis() as u64 / 2;
        let jitter = if max_jitter > 0 {
            rand::thread_rng().gen_range(0..=max_jitter)
        } else {
            0
        };
        delay + Duration::from_millis(jitter)
    }

    /// Run `op` until it succeeds, fails terminally, runs out of attempts
    /// or `cancel` fires.
    ///
    /// Cancellation is checked before every attempt and interrupts backoff
    /// sleeps. An attempt in flight is not interrupted.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        idempotent: bool,
        cancel: &CancellationToken,
        mut op: F,
    ) -> Result<T, RetryError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = bucketgate_backend::Result<T>>,
    {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                debug!(operation = %operation, attempt, "Cancelled before attempt");
                return Err(RetryError::Cancelled);
            }
            attempt += 1;

            let err = match op().await {
                Ok(value) => {
                    if attempt > 1 {
                        info!(operation = %operation, attempt, "Operation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(err) => err,
            };

            match RetryDecision::for_error(&err, idempotent) {
                RetryDecision::Terminal => {
                    debug!(operation = %operation, attempt, error = %err, "Operation failed, not retryable");
                    return Err(RetryError::Terminal(err));
                }
                RetryDecision::Unsafe => {
                    warn!(
                        operation = %operation,
                        attempt,
                        error = %err,
                        "Non-idempotent operation failed after possible side effect, not retrying"
                    );
                    return Err(RetryError::Unsafe(err));
                }
                RetryDecision::Retry if attempt >= max_attempts => {
                    error!(
                        operation = %operation,
                        attempt,
                        max_attempts,
                        error = %err,
                        "Operation failed permanently"
                    );
                    return Err(RetryError::Exhausted {
                        attempts: attempt,
                        last: err,
                    });
                }
                RetryDecision::Retry => {
                    let delay = self.jittered_delay(attempt);
                    warn!(
                        operation = %operation,
                        attempt,
                        max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "Operation failed, will retry"
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(RetryError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
    }
}
