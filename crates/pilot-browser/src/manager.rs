//! Per-test driver façade over the store, initializer and lifecycle.

use std::sync::Arc;

use pilot_config::BrowserType;
use tracing::warn;

use crate::driver::DriverHandle;
use crate::error::Result;
use crate::init::DriverInitializer;
use crate::lifecycle::DriverLifecycle;
use crate::store::DriverStore;

/// Owns the driver of one test on the calling worker.
pub struct TestDriverManager {
    store: Arc<DriverStore>,
    initializer: DriverInitializer,
    lifecycle: DriverLifecycle,
    test_name: String,
    correlation_id: String,
}

impl TestDriverManager {
    pub fn new(
        store: Arc<DriverStore>,
        initializer: DriverInitializer,
        test_name: impl Into<String>,
        correlation_id: impl Into<String>,
    ) -> Self {
        Self {
            store,
            initializer,
            lifecycle: DriverLifecycle,
            test_name: test_name.into(),
            correlation_id: correlation_id.into(),
        }
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Starts a driver and stores it for the calling worker.
    ///
    /// An already active driver on this worker is replaced; the old session
    /// is terminated so it cannot leak.
    ///
    /// # Errors
    ///
    /// Propagates initialization and store errors.
    pub async fn initialize(&self, browser: BrowserType) -> Result<DriverHandle> {
        if let Some(previous) = self.store.take_context() {
            warn!(
                test = %self.test_name,
                correlation_id = %self.correlation_id,
                previous_test = %previous.test_name,
                "driver already active on this worker, replacing it"
            );
            self.lifecycle
                .quit(&previous.driver, &previous.test_name, &previous.correlation_id)
                .await;
        }

        let driver = self
            .initializer
            .initialize(browser, &self.test_name, &self.correlation_id)
            .await?;

        if let Err(err) = self
            .store
            .set_context(driver.clone(), &self.test_name, &self.correlation_id)
        {
            self.lifecycle
                .quit(&driver, &self.test_name, &self.correlation_id)
                .await;
            return Err(err);
        }

        Ok(driver)
    }

    /// # Errors
    ///
    /// Returns `NotInitialized` when no driver is active on this worker.
    pub fn driver(&self) -> Result<DriverHandle> {
        self.store.get_driver()
    }

    pub fn is_active(&self) -> bool {
        self.store.is_initialized()
    }

    /// Clears the worker's slot and terminates its driver. Never fails.
    pub async fn quit(&self) {
        if let Some(context) = self.store.take_context() {
            self.lifecycle
                .quit(&context.driver, &context.test_name, &context.correlation_id)
                .await;
        }
    }
}
