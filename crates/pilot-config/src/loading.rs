//! Layered settings loading.
//!
//! Sources are merged lowest to highest priority:
//! defaults, `pilot.json`, `pilot.{environment}.json`, `pilot.local.json`,
//! then `PILOT_`-prefixed environment variables (`__` separates sections).

use std::path::{Path, PathBuf};

use figment::{
    Figment,
    providers::{Env, Format as _, Json, Serialized},
};

use crate::error::Result;
use crate::settings::Settings;
use crate::validation::validate;

/// Base settings file name.
pub const SETTINGS_FILE: &str = "pilot.json";

/// Uncommitted overlay for machine-local values and secrets.
pub const LOCAL_SETTINGS_FILE: &str = "pilot.local.json";

/// Selects the `pilot.{environment}.json` overlay.
pub const ENVIRONMENT_VAR: &str = "PILOT_ENVIRONMENT";

pub const ENV_PREFIX: &str = "PILOT_";

/// Builds and validates [`Settings`] from a settings directory.
///
/// # Example
///
/// ```no_run
/// use pilot_config::SettingsLoader;
///
/// let settings = SettingsLoader::new(".").environment("ci").load().unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct SettingsLoader {
    root: PathBuf,
    environment: Option<String>,
    use_env: bool,
}

impl SettingsLoader {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            environment: None,
            use_env: true,
        }
    }

    /// Forces an environment overlay instead of reading `PILOT_ENVIRONMENT`.
    #[must_use]
    pub fn environment(mut self, name: impl Into<String>) -> Self {
        self.environment = Some(name.into());
        self
    }

    /// Skips environment variables entirely (files and defaults only).
    #[must_use]
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    fn environment_name(&self) -> Option<String> {
        self.environment.clone().or_else(|| {
            if self.use_env {
                std::env::var(ENVIRONMENT_VAR)
                    .ok()
                    .filter(|name| !name.trim().is_empty())
            } else {
                None
            }
        })
    }

    /// Assembles the provider stack without extracting it.
    pub fn figment(&self) -> Figment {
        let mut figment = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Json::file(self.root.join(SETTINGS_FILE)));

        if let Some(environment) = self.environment_name() {
            figment = figment.merge(Json::file(
                self.root.join(format!("pilot.{environment}.json")),
            ));
        }

        figment = figment.merge(Json::file(self.root.join(LOCAL_SETTINGS_FILE)));

        if self.use_env {
            figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        }

        figment
    }

    /// Loads, applies executable overrides and validates.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Load` for malformed sources and
    /// `ConfigError::InvalidValue` / `MissingBrowser` when validation fails.
    pub fn load(&self) -> Result<Settings> {
        let mut settings: Settings = self.figment().extract()?;

        if self.use_env {
            settings.apply_executable_overrides(|var| std::env::var(var).ok());
        }

        validate(&settings)?;

        tracing::debug!(
            root = %self.root.display(),
            environment = ?self.environment_name(),
            browsers = settings.browsers.len(),
            "settings loaded"
        );

        Ok(settings)
    }
}

/// Loads settings from `root` using the process environment.
pub fn load_settings(root: impl AsRef<Path>) -> Result<Settings> {
    SettingsLoader::new(root).load()
}
