//! Driver initialization: settings lookup, factory dispatch, post-construction
//! configuration.

use std::sync::Arc;

use pilot_config::{BrowserType, Settings};
use tracing::{error, info};

use crate::driver::DriverHandle;
use crate::error::{BrowserError, Result};
use crate::factory::BrowserFactoryRegistry;
use crate::lifecycle::DriverLifecycle;

#[derive(Clone)]
pub struct DriverInitializer {
    registry: Arc<BrowserFactoryRegistry>,
    settings: Arc<Settings>,
    lifecycle: DriverLifecycle,
}

impl DriverInitializer {
    pub fn new(registry: Arc<BrowserFactoryRegistry>, settings: Arc<Settings>) -> Self {
        Self {
            registry,
            settings,
            lifecycle: DriverLifecycle,
        }
    }

    /// Creates and configures a driver for one test.
    ///
    /// A driver that fails post-construction configuration is terminated
    /// before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns `MissingSettings` when `browser` has no settings record, or any
    /// construction error from the factory registry.
    pub async fn initialize(
        &self,
        browser: BrowserType,
        test_name: &str,
        correlation_id: &str,
    ) -> Result<DriverHandle> {
        let browser_settings = self
            .settings
            .browser(browser)
            .ok_or(BrowserError::MissingSettings(browser))?;

        let driver = self
            .registry
            .create(browser, browser_settings)
            .await
            .inspect_err(|err| {
                error!(test = %test_name, correlation_id, %browser, error = %err, "driver creation failed");
            })?;

        let implicit_wait = self.settings.framework.implicit_wait();
        if let Err(err) = driver.set_implicit_wait(implicit_wait).await {
            error!(test = %test_name, correlation_id, %browser, error = %err, "driver configuration failed");
            self.lifecycle.quit(&driver, test_name, correlation_id).await;
            return Err(err);
        }

        info!(test = %test_name, correlation_id, %browser, ?implicit_wait, "driver initialized");
        Ok(driver)
    }
}
