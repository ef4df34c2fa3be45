//! Per-browser-family settings.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ConfigError;

/// Environment variable selecting which browsers run in CI.
pub const TARGET_BROWSER_ENV: &str = "TARGET_BROWSER_CI";

/// Browser families the framework knows how to configure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserType {
    Chrome,
    Edge,
    Brave,
    Firefox,
}

impl BrowserType {
    pub const ALL: [BrowserType; 4] = [
        BrowserType::Chrome,
        BrowserType::Edge,
        BrowserType::Brave,
        BrowserType::Firefox,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BrowserType::Chrome => "chrome",
            BrowserType::Edge => "edge",
            BrowserType::Brave => "brave",
            BrowserType::Firefox => "firefox",
        }
    }

    /// Environment variable that overrides binary discovery for this family.
    pub fn executable_env_var(self) -> Option<&'static str> {
        match self {
            BrowserType::Chrome => Some("CHROME_EXECUTABLE_PATH"),
            BrowserType::Edge => Some("EDGE_EXECUTABLE_PATH"),
            BrowserType::Brave => Some("BRAVE_EXECUTABLE_PATH"),
            BrowserType::Firefox => None,
        }
    }
}

impl fmt::Display for BrowserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BrowserType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Ok(BrowserType::Chrome),
            "edge" | "msedge" => Ok(BrowserType::Edge),
            "brave" => Ok(BrowserType::Brave),
            "firefox" => Ok(BrowserType::Firefox),
            other => Err(ConfigError::UnknownBrowser(other.to_string())),
        }
    }
}

/// Launch configuration for one browser family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,

    /// Extra command-line arguments passed verbatim to the browser.
    pub arguments: Vec<String>,

    /// Remote endpoint; when set the driver connects instead of launching.
    pub grid_url: Option<String>,

    /// Profile preferences written into the temporary profile before launch.
    pub preferences: Map<String, Value>,

    pub executable_path: Option<PathBuf>,

    /// Oldest major version accepted after construction.
    pub minimum_version: Option<u32>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            arguments: vec![
                // Required when user namespaces are unavailable (containers).
                "--no-sandbox".to_string(),
                // Prevents /dev/shm exhaustion in containerized environments
                "--disable-dev-shm-usage".to_string(),
            ],
            grid_url: None,
            preferences: Map::new(),
            executable_path: None,
            minimum_version: None,
        }
    }
}

/// Returns true when the `TARGET_BROWSER_CI` filter value admits `browser`.
///
/// An unset, empty or `all` filter admits every browser; otherwise the value
/// is a comma-separated list of browser names.
pub fn browser_filter_allows(filter: Option<&str>, browser: BrowserType) -> bool {
    let Some(filter) = filter.map(str::trim).filter(|f| !f.is_empty()) else {
        return true;
    };
    if filter.eq_ignore_ascii_case("all") {
        return true;
    }
    filter
        .split(',')
        .filter_map(|name| name.parse::<BrowserType>().ok())
        .any(|candidate| candidate == browser)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_browser_names_case_insensitively() {
        assert_eq!("Chrome".parse::<BrowserType>().unwrap(), BrowserType::Chrome);
        assert_eq!(" msedge ".parse::<BrowserType>().unwrap(), BrowserType::Edge);
        assert!(matches!(
            "safari".parse::<BrowserType>(),
            Err(ConfigError::UnknownBrowser(_))
        ));
    }

    #[test]
    fn filter_admits_listed_browsers_only() {
        assert!(browser_filter_allows(None, BrowserType::Edge));
        assert!(browser_filter_allows(Some(""), BrowserType::Edge));
        assert!(browser_filter_allows(Some("ALL"), BrowserType::Brave));
        assert!(browser_filter_allows(Some("chrome,edge"), BrowserType::Edge));
        assert!(!browser_filter_allows(Some("chrome"), BrowserType::Edge));
    }

    #[test]
    fn defaults_are_headless_full_hd() {
        let settings = BrowserSettings::default();
        assert!(settings.headless);
        assert_eq!((settings.window_width, settings.window_height), (1920, 1080));
        assert!(settings.arguments.iter().any(|a| a == "--no-sandbox"));
    }
}
