//! Tests for layered settings loading.
//!
//! Priority: environment > local overlay > environment file > base file > defaults

use pilot_config::{BrowserType, ConfigError, FailureKind, SettingsLoader};
use serial_test::serial;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

fn write(dir: &TempDir, name: &str, content: &str) {
    fs::write(dir.path().join(name), content).expect("write settings file");
}

#[test]
fn missing_files_yield_defaults() {
    let dir = TempDir::new().expect("tempdir");

    let settings = SettingsLoader::new(dir.path())
        .without_env()
        .load()
        .expect("load defaults");

    assert_eq!(settings.framework.default_browser, BrowserType::Chrome);
    assert_eq!(settings.retry.max_attempts, 3);
    assert!(settings.browser(BrowserType::Chrome).is_some());
    assert!(settings.browser(BrowserType::Firefox).is_none());
}

#[test]
fn base_file_overrides_defaults_and_keeps_unset_fields() {
    let dir = TempDir::new().expect("tempdir");
    write(
        &dir,
        "pilot.json",
        r#"{
            "framework": { "explicit_wait_secs": 25, "base_url": "https://shop.test" },
            "browsers": {
                "chrome": { "headless": false, "window_width": 1280, "window_height": 720 }
            },
            "retry": { "retry_on": ["stale_element"] }
        }"#,
    );

    let settings = SettingsLoader::new(dir.path())
        .without_env()
        .load()
        .expect("load");

    assert_eq!(settings.framework.explicit_wait_secs, 25);
    assert_eq!(settings.framework.poll_interval_ms, 100);
    assert_eq!(settings.framework.base_url.as_deref(), Some("https://shop.test"));

    let chrome = settings.browser(BrowserType::Chrome).expect("chrome");
    assert!(!chrome.headless);
    assert_eq!((chrome.window_width, chrome.window_height), (1280, 720));
    assert_eq!(settings.retry.retry_on, vec![FailureKind::StaleElement]);
}

#[test]
fn environment_overlay_and_local_overlay_stack() {
    let dir = TempDir::new().expect("tempdir");
    write(&dir, "pilot.json", r#"{ "framework": { "explicit_wait_secs": 5 } }"#);
    write(
        &dir,
        "pilot.ci.json",
        r#"{ "framework": { "explicit_wait_secs": 30, "highlight_duration_ms": 0 },
             "browsers": { "firefox": { "grid_url": "http://grid:4444" } } }"#,
    );
    write(&dir, "pilot.local.json", r#"{ "reporting": { "enabled": false } }"#);

    let settings = SettingsLoader::new(dir.path())
        .environment("ci")
        .without_env()
        .load()
        .expect("load");

    assert_eq!(settings.framework.explicit_wait_secs, 30);
    assert!(!settings.reporting.enabled);
    let firefox = settings.browser(BrowserType::Firefox).expect("firefox added");
    assert_eq!(firefox.grid_url.as_deref(), Some("http://grid:4444"));
    assert_eq!(firefox.window_width, 1920);
}

#[test]
fn invalid_file_is_a_load_error() {
    let dir = TempDir::new().expect("tempdir");
    write(&dir, "pilot.json", r#"{ "framework": { "explicit_wait_secs": "soon" } }"#);

    let result = SettingsLoader::new(dir.path()).without_env().load();
    assert!(matches!(result, Err(ConfigError::Load { .. })));
}

#[test]
fn validation_runs_after_merge() {
    let dir = TempDir::new().expect("tempdir");
    write(&dir, "pilot.json", r#"{ "retry": { "max_attempts": 0 } }"#);

    let result = SettingsLoader::new(dir.path()).without_env().load();
    assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
}

#[test]
#[serial]
fn env_vars_override_files() {
    let dir = TempDir::new().expect("tempdir");
    write(&dir, "pilot.json", r#"{ "framework": { "explicit_wait_secs": 5 } }"#);

    unsafe {
        std::env::set_var("PILOT_FRAMEWORK__EXPLICIT_WAIT_SECS", "42");
        std::env::set_var("PILOT_BROWSERS__EDGE__HEADLESS", "false");
    }

    let result = SettingsLoader::new(dir.path()).load();

    unsafe {
        std::env::remove_var("PILOT_FRAMEWORK__EXPLICIT_WAIT_SECS");
        std::env::remove_var("PILOT_BROWSERS__EDGE__HEADLESS");
    }

    let settings = result.expect("load");
    assert_eq!(settings.framework.explicit_wait_secs, 42);
    assert!(!settings.browser(BrowserType::Edge).unwrap().headless);
}

#[test]
#[serial]
fn environment_name_read_from_process_env() {
    let dir = TempDir::new().expect("tempdir");
    write(&dir, "pilot.staging.json", r#"{ "framework": { "explicit_wait_secs": 17 } }"#);

    unsafe {
        std::env::set_var("PILOT_ENVIRONMENT", "staging");
    }
    let result = SettingsLoader::new(dir.path()).load();
    unsafe {
        std::env::remove_var("PILOT_ENVIRONMENT");
    }

    assert_eq!(result.expect("load").framework.explicit_wait_secs, 17);
}

#[test]
#[serial]
fn executable_env_var_overrides_discovery() {
    let dir = TempDir::new().expect("tempdir");

    unsafe {
        std::env::set_var("BRAVE_EXECUTABLE_PATH", "/usr/bin/brave-browser");
    }
    let result = SettingsLoader::new(dir.path()).load();
    unsafe {
        std::env::remove_var("BRAVE_EXECUTABLE_PATH");
    }

    let settings = result.expect("load");
    assert_eq!(
        settings.browser(BrowserType::Brave).unwrap().executable_path,
        Some(PathBuf::from("/usr/bin/brave-browser"))
    );
}
