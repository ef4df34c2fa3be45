//! Factory dispatch and the post-construction version check.

use std::sync::Arc;

use pilot_browser::testing::{FakeCall, FakeFactory};
use pilot_browser::{BrowserError, BrowserFactoryRegistry, BrowserOptions, MIN_SUPPORTED_VERSION};
use pilot_config::{BrowserSettings, BrowserType};

mod common;

#[tokio::test]
async fn old_browser_is_rejected_and_terminated() {
    let factory = Arc::new(FakeFactory::new().with_version("HeadlessChrome/109.0.5414.120"));
    let registry = common::fake_registry(factory.clone());

    let result = registry
        .create(BrowserType::Chrome, &BrowserSettings::default())
        .await;

    match result {
        Err(BrowserError::UnsupportedVersion {
            browser,
            detected,
            minimum,
        }) => {
            assert_eq!(browser, BrowserType::Chrome);
            assert_eq!(detected, "HeadlessChrome/109.0.5414.120");
            assert_eq!(minimum, MIN_SUPPORTED_VERSION);
        }
        other => panic!("expected UnsupportedVersion, got {other:?}"),
    }
    assert!(factory.last_driver().unwrap().is_terminated());
}

#[tokio::test]
async fn unparseable_version_is_rejected() {
    let factory = Arc::new(FakeFactory::new().with_version("Chrome/canary"));
    let registry = common::fake_registry(factory.clone());

    let result = registry
        .create(BrowserType::Brave, &BrowserSettings::default())
        .await;

    assert!(matches!(result, Err(BrowserError::UnsupportedVersion { .. })));
    assert!(factory.last_driver().unwrap().is_terminated());
}

#[tokio::test]
async fn per_browser_minimum_overrides_default() {
    let factory = Arc::new(FakeFactory::new().with_version("Chrome/120.0.0.0"));
    let registry = common::fake_registry(factory.clone());
    let settings = BrowserSettings {
        minimum_version: Some(125),
        ..BrowserSettings::default()
    };

    let result = registry.create(BrowserType::Chrome, &settings).await;
    assert!(matches!(
        result,
        Err(BrowserError::UnsupportedVersion { minimum: 125, .. })
    ));
}

#[tokio::test]
async fn version_query_failure_terminates_driver() {
    let factory = Arc::new(FakeFactory::new().with_driver_failure(FakeCall::BrowserVersion));
    let registry = common::fake_registry(factory.clone());

    let result = registry
        .create(BrowserType::Edge, &BrowserSettings::default())
        .await;

    assert!(result.is_err());
    assert!(factory.last_driver().unwrap().is_terminated());
}

#[tokio::test]
async fn supported_browser_gets_shared_options() {
    let factory = Arc::new(FakeFactory::new());
    let registry = common::fake_registry(factory.clone());
    let settings = BrowserSettings {
        headless: true,
        window_width: 1920,
        window_height: 1080,
        arguments: vec!["--lang=en-GB".to_string()],
        ..BrowserSettings::default()
    };

    let driver = registry.create(BrowserType::Chrome, &settings).await.unwrap();

    let options: Vec<BrowserOptions> = factory.options();
    assert_eq!(options.len(), 1);
    assert!(options[0].has_arg("--headless"));
    assert!(options[0].has_arg("--window-size=1920,1080"));
    assert!(options[0].has_arg("--lang=en-GB"));
    assert_eq!(driver.window_size().await.unwrap(), (1920, 1080));
    assert!(!factory.last_driver().unwrap().is_terminated());
}

#[tokio::test]
async fn launch_failure_propagates() {
    let factory = Arc::new(FakeFactory::new().failing_launch("binary not found"));
    let registry = common::fake_registry(factory.clone());

    let result = registry
        .create(BrowserType::Chrome, &BrowserSettings::default())
        .await;

    assert!(matches!(result, Err(BrowserError::LaunchFailed { .. })));
    assert!(factory.created().is_empty());
}

#[tokio::test]
async fn firefox_is_not_supported_by_default() {
    let registry = BrowserFactoryRegistry::with_defaults();

    let result = registry
        .create(BrowserType::Firefox, &BrowserSettings::default())
        .await;

    assert!(matches!(
        result,
        Err(BrowserError::BrowserNotSupported(BrowserType::Firefox))
    ));
}

#[tokio::test]
async fn custom_factory_can_serve_firefox() {
    let factory = Arc::new(FakeFactory::new());
    let mut registry = BrowserFactoryRegistry::new();
    registry.register(BrowserType::Firefox, factory.clone());

    let driver = registry
        .create(BrowserType::Firefox, &BrowserSettings::default())
        .await
        .unwrap();
    assert_eq!(driver.browser(), BrowserType::Firefox);
}
