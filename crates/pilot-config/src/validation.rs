//! Startup validation of loaded settings.
//!
//! Failures here are fatal: the run aborts before any browser is launched.

use crate::browser::BrowserType;
use crate::error::{ConfigError, Result};
use crate::settings::Settings;

/// Upper bound on `retry.max_attempts`.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

/// Trait for pluggable settings validation strategies
pub trait SettingsValidator {
    fn validate(&self, settings: &Settings) -> Result<()>;
}

/// Structural validation (no filesystem or network checks)
///
/// # Example
///
/// ```
/// use pilot_config::{Settings, SchemaValidator, SettingsValidator};
///
/// SchemaValidator.validate(&Settings::default()).unwrap();
/// ```
pub struct SchemaValidator;

impl SettingsValidator for SchemaValidator {
    fn validate(&self, settings: &Settings) -> Result<()> {
        let framework = &settings.framework;

        if framework.explicit_wait_secs == 0 {
            return Err(ConfigError::invalid(
                "framework.explicit_wait_secs",
                "explicit wait must be at least one second",
                "Set explicit_wait_secs to a positive number of seconds",
            ));
        }

        if framework.poll_interval_ms == 0 {
            return Err(ConfigError::invalid(
                "framework.poll_interval_ms",
                "poll interval cannot be zero",
                "Use a poll interval such as 100",
            ));
        }

        if let Some(base_url) = &framework.base_url {
            check_scheme("framework.base_url", base_url, &["http://", "https://"])?;
        }

        if !settings.browsers.contains_key(&framework.default_browser) {
            return Err(ConfigError::MissingBrowser {
                browser: framework.default_browser.to_string(),
            });
        }

        for (browser, browser_settings) in &settings.browsers {
            validate_browser(*browser, browser_settings)?;
        }

        let retry = &settings.retry;
        if retry.max_attempts == 0 || retry.max_attempts > MAX_RETRY_ATTEMPTS {
            return Err(ConfigError::invalid(
                "retry.max_attempts",
                format!(
                    "max_attempts {} is outside 1..={MAX_RETRY_ATTEMPTS}",
                    retry.max_attempts
                ),
                "Use 1 to disable retries or a small number such as 3",
            ));
        }

        if retry.max_attempts > 1 && retry.retry_on.is_empty() {
            return Err(ConfigError::invalid(
                "retry.retry_on",
                "retries are enabled but no failure kind is retryable",
                "List failure kinds such as \"stale_element\" or set max_attempts to 1",
            ));
        }

        Ok(())
    }
}

fn validate_browser(browser: BrowserType, settings: &crate::BrowserSettings) -> Result<()> {
    if settings.window_width == 0 || settings.window_height == 0 {
        return Err(ConfigError::invalid(
            &format!("browsers.{browser}.window_width"),
            format!(
                "window size {}x{} has a zero dimension",
                settings.window_width, settings.window_height
            ),
            "Use a real viewport size such as 1920x1080",
        ));
    }

    if settings.arguments.iter().any(|arg| arg.trim().is_empty()) {
        return Err(ConfigError::invalid(
            &format!("browsers.{browser}.arguments"),
            "browser arguments cannot be empty",
            "Remove empty strings from the 'arguments' array",
        ));
    }

    if let Some(grid_url) = &settings.grid_url {
        check_scheme(
            &format!("browsers.{browser}.grid_url"),
            grid_url,
            &["http://", "https://", "ws://", "wss://"],
        )?;
    }

    Ok(())
}

fn check_scheme(field: &str, url: &str, schemes: &[&str]) -> Result<()> {
    if schemes.iter().any(|scheme| url.starts_with(scheme)) {
        return Ok(());
    }
    Err(ConfigError::invalid(
        field,
        format!("'{url}' is not an absolute URL"),
        &format!("Use one of the schemes: {}", schemes.join(", ")),
    ))
}

/// Convenience function for schema validation
pub fn validate(settings: &Settings) -> Result<()> {
    SchemaValidator.validate(settings)
}
