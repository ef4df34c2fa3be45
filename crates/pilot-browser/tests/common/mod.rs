//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;

use pilot_browser::testing::{FakeFactory, RecordingSink};
use pilot_browser::{BrowserFactoryRegistry, FrameworkContext, FrameworkContextBuilder};
use pilot_config::{BrowserType, Settings};

/// Settings tuned for in-memory runs: short waits, fast retries.
pub fn fast_settings() -> Settings {
    let mut settings = Settings::default();
    settings.framework.base_url = Some("http://localhost:4173".to_string());
    settings.framework.explicit_wait_secs = 1;
    settings.framework.poll_interval_ms = 5;
    settings.retry.initial_delay_ms = 1;
    settings.reporting.enabled = false;
    settings
}

/// Registry serving every chromium-family browser from `factory`.
pub fn fake_registry(factory: Arc<FakeFactory>) -> BrowserFactoryRegistry {
    let mut registry = BrowserFactoryRegistry::new();
    for browser in [BrowserType::Chrome, BrowserType::Edge, BrowserType::Brave] {
        registry.register(browser, factory.clone());
    }
    registry
}

/// Context builder wired to fakes with no browser filter.
pub fn fake_context_builder(
    factory: Arc<FakeFactory>,
    sink: Arc<RecordingSink>,
) -> FrameworkContextBuilder {
    FrameworkContext::builder(fast_settings())
        .registry(fake_registry(factory))
        .report_sink(sink)
        .browser_filter(None)
}

pub fn fake_context(factory: Arc<FakeFactory>, sink: Arc<RecordingSink>) -> FrameworkContext {
    fake_context_builder(factory, sink).build()
}
