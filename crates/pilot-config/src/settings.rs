//! Settings records bound from configuration files and the environment.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::browser::{BrowserSettings, BrowserType};

/// Classification of a failure, shared between the retry allow-list and the
/// error types that report it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    StaleElement,
    ElementNotFound,
    ElementNotInteractable,
    WaitTimeout,
    Script,
    Navigation,
    Connection,
    Launch,
    UnsupportedBrowser,
    NotInitialized,
    ResultRejected,
    Report,
    Other,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FailureKind::StaleElement => "stale_element",
            FailureKind::ElementNotFound => "element_not_found",
            FailureKind::ElementNotInteractable => "element_not_interactable",
            FailureKind::WaitTimeout => "wait_timeout",
            FailureKind::Script => "script",
            FailureKind::Navigation => "navigation",
            FailureKind::Connection => "connection",
            FailureKind::Launch => "launch",
            FailureKind::UnsupportedBrowser => "unsupported_browser",
            FailureKind::NotInitialized => "not_initialized",
            FailureKind::ResultRejected => "result_rejected",
            FailureKind::Report => "report",
            FailureKind::Other => "other",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameworkSettings {
    pub default_browser: BrowserType,

    /// Root URL that page-object paths are joined to.
    pub base_url: Option<String>,

    pub explicit_wait_secs: u64,
    pub implicit_wait_ms: u64,
    pub poll_interval_ms: u64,

    /// How long an element stays outlined before an interaction.
    pub highlight_duration_ms: u64,

    pub screenshot_on_failure: bool,
}

impl FrameworkSettings {
    pub fn explicit_wait(&self) -> Duration {
        Duration::from_secs(self.explicit_wait_secs)
    }

    pub fn implicit_wait(&self) -> Duration {
        Duration::from_millis(self.implicit_wait_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn highlight_duration(&self) -> Duration {
        Duration::from_millis(self.highlight_duration_ms)
    }
}

impl Default for FrameworkSettings {
    fn default() -> Self {
        Self {
            default_browser: BrowserType::Chrome,
            base_url: None,
            explicit_wait_secs: 10,
            implicit_wait_ms: 0,
            poll_interval_ms: 100,
            highlight_duration_ms: 0,
            screenshot_on_failure: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub initial_delay_ms: u64,

    /// Failure kinds that are worth another attempt.
    pub retry_on: Vec<FailureKind>,
}

impl RetrySettings {
    pub fn initial_delay(&self) -> Duration {
        Duration::from_millis(self.initial_delay_ms)
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 200,
            retry_on: vec![
                FailureKind::StaleElement,
                FailureKind::ElementNotInteractable,
                FailureKind::WaitTimeout,
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportSettings {
    pub enabled: bool,
    pub results_dir: PathBuf,
}

impl Default for ReportSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            results_dir: PathBuf::from("target/allure-results"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` directive used when `RUST_LOG` is not set.
    pub level: String,
    pub ansi: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}

/// Root settings record. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub framework: FrameworkSettings,
    pub browsers: BTreeMap<BrowserType, BrowserSettings>,
    pub retry: RetrySettings,
    pub reporting: ReportSettings,
    pub logging: LoggingSettings,
}

impl Settings {
    pub fn browser(&self, browser: BrowserType) -> Option<&BrowserSettings> {
        self.browsers.get(&browser)
    }

    /// Applies `*_EXECUTABLE_PATH` overrides using the supplied lookup.
    pub fn apply_executable_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for (browser, settings) in &mut self.browsers {
            let Some(var) = browser.executable_env_var() else {
                continue;
            };
            if let Some(path) = lookup(var).filter(|p| !p.trim().is_empty()) {
                tracing::debug!(%browser, %path, "executable path overridden from {var}");
                settings.executable_path = Some(PathBuf::from(path));
            }
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        let browsers = [BrowserType::Chrome, BrowserType::Edge, BrowserType::Brave]
            .into_iter()
            .map(|browser| (browser, BrowserSettings::default()))
            .collect();

        Self {
            framework: FrameworkSettings::default(),
            browsers,
            retry: RetrySettings::default(),
            reporting: ReportSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executable_overrides_match_browser_family() {
        let mut settings = Settings::default();
        settings.apply_executable_overrides(|var| match var {
            "EDGE_EXECUTABLE_PATH" => Some("/opt/edge/msedge".to_string()),
            "BRAVE_EXECUTABLE_PATH" => Some("  ".to_string()),
            _ => None,
        });

        let edge = settings.browser(BrowserType::Edge).unwrap();
        assert_eq!(edge.executable_path, Some(PathBuf::from("/opt/edge/msedge")));
        assert_eq!(settings.browser(BrowserType::Brave).unwrap().executable_path, None);
        assert_eq!(settings.browser(BrowserType::Chrome).unwrap().executable_path, None);
    }

    #[test]
    fn failure_kind_round_trips_through_serde_names() {
        let kinds: Vec<FailureKind> =
            serde_json::from_str(r#"["stale_element", "wait_timeout"]"#).unwrap();
        assert_eq!(kinds, vec![FailureKind::StaleElement, FailureKind::WaitTimeout]);
        assert_eq!(FailureKind::ElementNotInteractable.to_string(), "element_not_interactable");
    }
}
