//! Driver termination.
//!
//! Teardown must never fail a test run and must never leave a browser process
//! behind. `quit` tries the graceful path (close, then quit) and falls back to
//! `dispose`; every failure is logged and swallowed.

use tracing::{debug, error, warn};

use crate::driver::DriverHandle;
use crate::error::Result;

#[derive(Debug, Default, Clone, Copy)]
pub struct DriverLifecycle;

impl DriverLifecycle {
    /// Terminates `driver`: close, quit, and dispose on any failure.
    pub async fn quit(&self, driver: &DriverHandle, test_name: &str, correlation_id: &str) {
        let browser = driver.browser();

        let graceful: Result<()> = async {
            driver.close().await?;
            driver.quit().await
        }
        .await;

        match graceful {
            Ok(()) => {
                debug!(test = %test_name, correlation_id, %browser, "driver quit");
            }
            Err(err) => {
                warn!(
                    test = %test_name,
                    correlation_id,
                    %browser,
                    error = %err,
                    "graceful quit failed, disposing driver"
                );
                if let Err(err) = driver.dispose().await {
                    error!(
                        test = %test_name,
                        correlation_id,
                        %browser,
                        error = %err,
                        "driver dispose failed, giving up"
                    );
                }
            }
        }
    }

    /// Terminates a driver that never reached a test (e.g. rejected at construction).
    pub async fn terminate(&self, driver: &DriverHandle, reason: &str) {
        self.quit(driver, reason, "-").await;
    }
}
