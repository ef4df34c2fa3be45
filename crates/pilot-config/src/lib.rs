//! Typed settings for the pilot browser test framework.
//!
//! Settings are bound once at startup from JSON files and `PILOT_` environment
//! variables, validated, and then shared read-only across every test.

pub mod browser;
pub mod error;
pub mod loading;
pub mod settings;
pub mod validation;

pub use browser::{BrowserSettings, BrowserType, TARGET_BROWSER_ENV, browser_filter_allows};
pub use error::{ConfigError, Result};
pub use loading::{SettingsLoader, load_settings};
pub use settings::{
    FailureKind, FrameworkSettings, LoggingSettings, ReportSettings, RetrySettings, Settings,
};
pub use validation::{SchemaValidator, SettingsValidator, validate};
