//! Launch options shared by every chromium-family factory.
//!
//! [`BrowserOptions::from_settings`] is the single place where settings become
//! command-line arguments, so the resulting option set can be inspected before
//! any process is started.

use std::path::{Path, PathBuf};

use chromiumoxide::browser::BrowserConfig;
use pilot_config::{BrowserSettings, BrowserType};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{BrowserError, Result};

/// Argument enabling headless mode.
pub const HEADLESS_ARG: &str = "--headless";

/// Fully resolved launch options for one browser instance.
#[derive(Debug, Clone, PartialEq)]
pub struct BrowserOptions {
    pub browser: BrowserType,
    pub headless: bool,
    pub window_size: (u32, u32),

    /// Arguments in the order they are passed to the browser.
    pub args: Vec<String>,

    /// Isolated profile directory, unique per instance.
    pub user_data_dir: PathBuf,

    pub preferences: Map<String, Value>,

    /// Browser binary (None = let chromiumoxide auto-detect).
    pub executable: Option<PathBuf>,

    /// Remote DevTools endpoint; when set nothing is launched locally.
    pub remote_url: Option<String>,
}

impl BrowserOptions {
    /// Builds options from a settings record.
    pub fn from_settings(browser: BrowserType, settings: &BrowserSettings) -> Self {
        let mut args = Vec::with_capacity(settings.arguments.len() + 3);

        if settings.headless {
            args.push(HEADLESS_ARG.to_string());
        }

        args.push(format!(
            "--window-size={},{}",
            settings.window_width, settings.window_height
        ));

        // A unique user data directory avoids ProcessSingleton conflicts when
        // several browsers run in parallel.
        let unique_id = uuid::Uuid::new_v4();
        let user_data_dir =
            std::env::temp_dir().join(format!("pilot-{}-{unique_id}", browser.as_str()));
        args.push(format!("--user-data-dir={}", user_data_dir.display()));

        args.extend(settings.arguments.iter().cloned());

        let executable = settings
            .executable_path
            .clone()
            .or_else(|| discover_executable(browser));

        Self {
            browser,
            headless: settings.headless,
            window_size: (settings.window_width, settings.window_height),
            args,
            user_data_dir,
            preferences: settings.preferences.clone(),
            executable,
            remote_url: settings.grid_url.clone(),
        }
    }

    /// Returns true if `arg` is present verbatim.
    pub fn has_arg(&self, arg: &str) -> bool {
        self.args.iter().any(|a| a == arg)
    }

    pub fn is_remote(&self) -> bool {
        self.remote_url.is_some()
    }

    /// Writes profile preferences where chromium reads them at startup.
    pub(crate) fn write_preferences(&self) -> Result<()> {
        if self.preferences.is_empty() {
            return Ok(());
        }
        let profile = self.user_data_dir.join("Default");
        std::fs::create_dir_all(&profile)?;
        let contents = serde_json::to_vec_pretty(&Value::Object(self.preferences.clone()))?;
        std::fs::write(profile.join("Preferences"), contents)?;
        debug!(
            browser = %self.browser,
            count = self.preferences.len(),
            "profile preferences written"
        );
        Ok(())
    }

    /// Converts to chromiumoxide `BrowserConfig`.
    pub(crate) fn to_browser_config(&self) -> Result<BrowserConfig> {
        let mut config = BrowserConfig::builder()
            .window_size(self.window_size.0, self.window_size.1)
            .args(self.args.iter().cloned());

        if !self.headless {
            config = config.with_head();
        }

        if let Some(path) = &self.executable {
            config = config.chrome_executable(path.clone());
        }

        config.build().map_err(|e| BrowserError::LaunchFailed {
            browser: self.browser,
            reason: format!("invalid browser configuration: {e}"),
            source: None,
        })
    }
}

/// Binary names searched on `PATH` for families chromiumoxide cannot find itself.
fn executable_candidates(browser: BrowserType) -> &'static [&'static str] {
    match browser {
        BrowserType::Edge => &["microsoft-edge", "microsoft-edge-stable", "msedge"],
        BrowserType::Brave => &["brave-browser", "brave", "brave-browser-stable"],
        BrowserType::Chrome | BrowserType::Firefox => &[],
    }
}

fn discover_executable(browser: BrowserType) -> Option<PathBuf> {
    let candidates = executable_candidates(browser);
    if candidates.is_empty() {
        return None;
    }
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path).find_map(|dir| {
        candidates
            .iter()
            .map(|name| dir.join(name))
            .find(|candidate| is_file(candidate))
    })
}

fn is_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_full_hd_options() {
        let settings = BrowserSettings {
            headless: true,
            window_width: 1920,
            window_height: 1080,
            ..BrowserSettings::default()
        };

        let options = BrowserOptions::from_settings(BrowserType::Chrome, &settings);

        assert!(options.has_arg(HEADLESS_ARG));
        assert!(options.has_arg("--window-size=1920,1080"));
        assert!(options.has_arg("--no-sandbox"));
        assert_eq!(options.window_size, (1920, 1080));
        assert!(!options.is_remote());
    }

    #[test]
    fn visible_mode_omits_headless_arg() {
        let settings = BrowserSettings {
            headless: false,
            ..BrowserSettings::default()
        };
        let options = BrowserOptions::from_settings(BrowserType::Chrome, &settings);
        assert!(!options.has_arg(HEADLESS_ARG));
    }

    #[test]
    fn custom_arguments_follow_shared_ones() {
        let settings = BrowserSettings {
            arguments: vec!["--lang=de".to_string()],
            ..BrowserSettings::default()
        };
        let options = BrowserOptions::from_settings(BrowserType::Edge, &settings);
        assert_eq!(options.args.last().map(String::as_str), Some("--lang=de"));
    }

    #[test]
    fn every_instance_gets_its_own_profile() {
        let settings = BrowserSettings::default();
        let a = BrowserOptions::from_settings(BrowserType::Chrome, &settings);
        let b = BrowserOptions::from_settings(BrowserType::Chrome, &settings);
        assert_ne!(a.user_data_dir, b.user_data_dir);
    }

    #[test]
    fn grid_url_makes_options_remote() {
        let settings = BrowserSettings {
            grid_url: Some("http://grid:9222".to_string()),
            ..BrowserSettings::default()
        };
        let options = BrowserOptions::from_settings(BrowserType::Chrome, &settings);
        assert_eq!(options.remote_url.as_deref(), Some("http://grid:9222"));
    }

    #[test]
    fn configured_executable_wins_over_discovery() {
        let settings = BrowserSettings {
            executable_path: Some(PathBuf::from("/opt/brave/brave")),
            ..BrowserSettings::default()
        };
        let options = BrowserOptions::from_settings(BrowserType::Brave, &settings);
        assert_eq!(options.executable, Some(PathBuf::from("/opt/brave/brave")));
    }

    #[test]
    fn preferences_land_in_default_profile() {
        let mut settings = BrowserSettings::default();
        settings.preferences.insert(
            "download".to_string(),
            serde_json::json!({ "prompt_for_download": false }),
        );
        let mut options = BrowserOptions::from_settings(BrowserType::Chrome, &settings);
        let dir = tempfile::tempdir().unwrap();
        options.user_data_dir = dir.path().to_path_buf();

        options.write_preferences().unwrap();

        let written = std::fs::read_to_string(dir.path().join("Default/Preferences")).unwrap();
        let value: Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["download"]["prompt_for_download"], Value::Bool(false));
    }
}
