//! Exponential-backoff retries for flaky interactions.
//!
//! Each call is independent: no state survives between invocations. Only
//! errors whose [`FailureKind`] is on the allow-list are retried; anything
//! else is returned immediately.

use std::future::Future;
use std::time::Duration;

use pilot_config::{FailureKind, RetrySettings};
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::{BrowserError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    retry_on: Vec<FailureKind>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, initial_delay: Duration, retry_on: Vec<FailureKind>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay,
            retry_on,
        }
    }

    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self::new(
            settings.max_attempts,
            settings.initial_delay(),
            settings.retry_on.clone(),
        )
    }

    /// A policy that runs the action exactly once.
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Vec::new())
    }

    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_retryable(&self, err: &BrowserError) -> bool {
        self.retry_on.contains(&err.kind())
    }

    /// Delay slept after failed attempt `attempt` (1-based).
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_delay.saturating_mul(factor)
    }

    /// Runs `action` until it succeeds or attempts are exhausted.
    ///
    /// # Errors
    ///
    /// Returns the last error, or the first non-retryable one.
    pub async fn execute<F, Fut>(&self, operation: &str, action: F) -> Result<()>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.execute_value(operation, action).await
    }

    /// Runs `action` until it returns a value.
    ///
    /// # Errors
    ///
    /// Returns the last error, or the first non-retryable one.
    pub async fn execute_value<T, F, Fut>(&self, operation: &str, action: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.execute_until(operation, action, |_| true).await
    }

    /// Runs `action` until it returns a value that `accept` approves.
    ///
    /// A rejected value is always retried. When attempts run out on a
    /// rejection the error is `ResultRejected`.
    ///
    /// # Errors
    ///
    /// Returns the last error, `ResultRejected`, or the first non-retryable error.
    pub async fn execute_until<T, F, Fut, P>(
        &self,
        operation: &str,
        mut action: F,
        accept: P,
    ) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        P: Fn(&T) -> bool,
    {
        let mut attempt = 1;

        loop {
            let failure = match action().await {
                Ok(value) if accept(&value) => {
                    if attempt > 1 {
                        debug!(operation, attempt, "succeeded after retry");
                    }
                    return Ok(value);
                }
                Ok(_) => BrowserError::ResultRejected {
                    operation: operation.to_string(),
                    attempts: attempt,
                },
                Err(err) if self.is_retryable(&err) => err,
                Err(err) => return Err(err),
            };

            if attempt >= self.max_attempts {
                warn!(operation, attempts = attempt, error = %failure, "retries exhausted");
                return Err(failure);
            }

            let delay = self.delay_after(attempt);
            debug!(operation, attempt, ?delay, error = %failure, "attempt failed, retrying");
            sleep(delay).await;
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}
