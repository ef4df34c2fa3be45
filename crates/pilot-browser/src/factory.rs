//! Browser factory dispatch.
//!
//! The registry maps a [`BrowserType`] to the [`BrowserFactory`] that can
//! construct it, runs the shared option-building step, and rejects browsers
//! older than the supported minimum. A rejected browser is terminated before
//! the error is returned.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use pilot_config::{BrowserSettings, BrowserType};
use tracing::{debug, info};

use crate::chromium::ChromiumDriver;
use crate::driver::DriverHandle;
use crate::error::{BrowserError, Result};
use crate::lifecycle::DriverLifecycle;
use crate::options::BrowserOptions;

/// Oldest chromium major version the framework drives.
pub const MIN_SUPPORTED_VERSION: u32 = 115;

/// Constructs drivers for one or more browser families.
#[async_trait]
pub trait BrowserFactory: Send + Sync {
    /// Shared option-building step; override to add family-specific tweaks.
    fn build_options(&self, browser: BrowserType, settings: &BrowserSettings) -> BrowserOptions {
        BrowserOptions::from_settings(browser, settings)
    }

    async fn create(&self, options: &BrowserOptions) -> Result<DriverHandle>;
}

/// Factory for chromium-based browsers (Chrome, Edge, Brave).
#[derive(Debug, Default, Clone, Copy)]
pub struct ChromiumFactory;

#[async_trait]
impl BrowserFactory for ChromiumFactory {
    async fn create(&self, options: &BrowserOptions) -> Result<DriverHandle> {
        let driver = match &options.remote_url {
            Some(url) => ChromiumDriver::connect(options.browser, url).await?,
            None => ChromiumDriver::launch(options).await?,
        };
        Ok(Arc::new(driver))
    }
}

/// Dispatch table from browser family to factory.
pub struct BrowserFactoryRegistry {
    factories: HashMap<BrowserType, Arc<dyn BrowserFactory>>,
    lifecycle: DriverLifecycle,
}

impl BrowserFactoryRegistry {
    /// An empty registry; every browser is unsupported until registered.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            lifecycle: DriverLifecycle,
        }
    }

    /// Chrome, Edge and Brave through [`ChromiumFactory`].
    pub fn with_defaults() -> Self {
        let chromium: Arc<dyn BrowserFactory> = Arc::new(ChromiumFactory);
        let mut registry = Self::new();
        for browser in [BrowserType::Chrome, BrowserType::Edge, BrowserType::Brave] {
            registry.factories.insert(browser, chromium.clone());
        }
        registry
    }

    /// Registers (or replaces) the factory for `browser`.
    pub fn register(&mut self, browser: BrowserType, factory: Arc<dyn BrowserFactory>) {
        self.factories.insert(browser, factory);
    }

    pub fn supports(&self, browser: BrowserType) -> bool {
        self.factories.contains_key(&browser)
    }

    fn factory(&self, browser: BrowserType) -> Result<&Arc<dyn BrowserFactory>> {
        self.factories
            .get(&browser)
            .ok_or(BrowserError::BrowserNotSupported(browser))
    }

    /// Builds the option set `create` would use, without launching anything.
    ///
    /// # Errors
    ///
    /// Returns `BrowserNotSupported` for unregistered families.
    pub fn options_for(
        &self,
        browser: BrowserType,
        settings: &BrowserSettings,
    ) -> Result<BrowserOptions> {
        Ok(self.factory(browser)?.build_options(browser, settings))
    }

    /// Creates a driver from settings.
    ///
    /// # Errors
    ///
    /// Returns `BrowserNotSupported`, the factory's construction error, or
    /// `UnsupportedVersion` (after terminating the driver).
    pub async fn create(
        &self,
        browser: BrowserType,
        settings: &BrowserSettings,
    ) -> Result<DriverHandle> {
        let options = self.options_for(browser, settings)?;
        self.create_with_options(browser, settings, &options).await
    }

    /// Creates a driver from caller-supplied options.
    ///
    /// # Errors
    ///
    /// See [`BrowserFactoryRegistry::create`].
    pub async fn create_with_options(
        &self,
        browser: BrowserType,
        settings: &BrowserSettings,
        options: &BrowserOptions,
    ) -> Result<DriverHandle> {
        let factory = self.factory(browser)?;
        let driver = factory.create(options).await?;

        let minimum = settings.minimum_version.unwrap_or(MIN_SUPPORTED_VERSION);
        let detected = match driver.browser_version().await {
            Ok(version) => version,
            Err(err) => {
                self.lifecycle.terminate(&driver, "version check").await;
                return Err(err);
            }
        };

        match parse_major_version(&detected) {
            Some(major) if major >= minimum => {
                info!(%browser, version = %detected, remote = options.is_remote(), "browser started");
                Ok(driver)
            }
            _ => {
                debug!(%browser, version = %detected, minimum, "rejecting unsupported browser version");
                self.lifecycle.terminate(&driver, "version check").await;
                Err(BrowserError::UnsupportedVersion {
                    browser,
                    detected,
                    minimum,
                })
            }
        }
    }
}

impl Default for BrowserFactoryRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Extracts the major version from a product string such as
/// `HeadlessChrome/120.0.6099.71` or a bare `120.0.1`.
pub fn parse_major_version(product: &str) -> Option<u32> {
    let version = product.rsplit('/').next()?.trim();
    version.split('.').next()?.parse().ok()
}
