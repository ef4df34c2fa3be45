//! Explicit waits.
//!
//! An explicit wait repeatedly evaluates a [`Condition`] against a driver
//! until it yields a value or the timeout elapses. Polling sleeps on the tokio
//! timer; there is no cancellation beyond the timeout itself.

use std::time::{Duration, Instant};

use pilot_config::{FailureKind, FrameworkSettings};
use tokio::time::sleep;
use tracing::trace;

use crate::conditions::Condition;
use crate::driver::DriverHandle;
use crate::error::{BrowserError, Result};

/// Timeout used when no settings are supplied.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Gap between two condition checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Timing of an explicit wait. Normally derived from
/// [`FrameworkSettings`] so CI can stretch it through configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitConfig {
    /// Upper bound on the whole wait.
    pub timeout: Duration,

    pub poll_interval: Duration,
}

impl WaitConfig {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
        }
    }

    /// `timeout` with the default poll interval.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new(timeout, DEFAULT_POLL_INTERVAL)
    }

    /// Explicit-wait configuration from framework settings.
    pub fn from_settings(settings: &FrameworkSettings) -> Self {
        Self::new(settings.explicit_wait(), settings.poll_interval())
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

/// Explicit wait bound to one driver.
///
/// # Example
///
/// ```ignore
/// let wait = Wait::new(driver.clone(), WaitConfig::with_timeout(Duration::from_secs(5)));
/// let rows = wait.until(&element_count_at_least(By::css("tr"), 3)).await?;
/// ```
#[derive(Debug, Clone)]
pub struct Wait {
    driver: DriverHandle,
    config: WaitConfig,
    ignored: Vec<FailureKind>,
}

impl Wait {
    /// Creates a wait that treats stale and missing elements as "not yet".
    pub fn new(driver: DriverHandle, config: WaitConfig) -> Self {
        Self {
            driver,
            config,
            ignored: vec![FailureKind::StaleElement, FailureKind::ElementNotFound],
        }
    }

    /// Adds a failure kind that should be polled through instead of propagated.
    #[must_use]
    pub fn ignoring(mut self, kind: FailureKind) -> Self {
        if !self.ignored.contains(&kind) {
            self.ignored.push(kind);
        }
        self
    }

    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    pub fn config(&self) -> WaitConfig {
        self.config
    }

    pub fn driver(&self) -> &DriverHandle {
        &self.driver
    }

    /// Polls `condition` until it yields a value.
    ///
    /// # Errors
    ///
    /// Returns `WaitTimeout` when the timeout elapses, or the condition's own
    /// error when its kind is not ignored.
    pub async fn until<C>(&self, condition: &C) -> Result<C::Output>
    where
        C: Condition + ?Sized,
    {
        let start = Instant::now();

        loop {
            match condition.check(self.driver.as_ref()).await {
                Ok(Some(value)) => return Ok(value),
                Ok(None) => {}
                Err(err) if self.ignored.contains(&err.kind()) => {
                    trace!(condition = %condition.describe(), error = %err, "ignored while waiting");
                }
                Err(err) => return Err(err),
            }

            if start.elapsed() >= self.config.timeout {
                return Err(BrowserError::WaitTimeout {
                    condition: condition.describe(),
                    timeout: self.config.timeout,
                });
            }

            sleep(self.config.poll_interval).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use crate::conditions::document_ready;
    use crate::testing::{FakeCall, FakeDriver};
    use pilot_config::BrowserType;

    fn wait_on(driver: FakeDriver) -> Wait {
        Wait::new(
            Arc::new(driver),
            WaitConfig::new(Duration::from_millis(50), Duration::from_millis(5)),
        )
    }

    #[tokio::test]
    async fn until_returns_as_soon_as_satisfied() {
        let wait = wait_on(FakeDriver::new(BrowserType::Chrome));
        assert!(wait.until(&document_ready()).await.unwrap());
    }

    #[tokio::test]
    async fn until_times_out_with_condition_name() {
        let driver = FakeDriver::new(BrowserType::Chrome);
        driver.set_ready_state("loading");
        let err = wait_on(driver).until(&document_ready()).await.unwrap_err();

        match err {
            BrowserError::WaitTimeout { condition, timeout } => {
                assert_eq!(condition, "document ready");
                assert_eq!(timeout, Duration::from_millis(50));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn until_propagates_errors_that_are_not_ignored() {
        let driver = FakeDriver::new(BrowserType::Chrome).failing(FakeCall::ExecuteScript);
        let err = wait_on(driver).until(&document_ready()).await.unwrap_err();
        assert!(matches!(err, BrowserError::ConnectionFailed(_)));
    }

    #[test]
    fn ignoring_does_not_duplicate_kinds() {
        let wait = wait_on(FakeDriver::new(BrowserType::Chrome))
            .ignoring(FailureKind::StaleElement)
            .ignoring(FailureKind::Script);
        assert_eq!(wait.ignored.len(), 3);
    }

    #[test]
    fn config_from_settings_uses_explicit_wait() {
        let settings = FrameworkSettings {
            explicit_wait_secs: 7,
            poll_interval_ms: 250,
            ..FrameworkSettings::default()
        };
        let config = WaitConfig::from_settings(&settings);
        assert_eq!(config.timeout, Duration::from_secs(7));
        assert_eq!(config.poll_interval, Duration::from_millis(250));
    }
}
