//! Error types for browser test operations.
//!
//! This module provides a structured error hierarchy that distinguishes between
//! driver construction failures, transient interaction failures, wait timeouts
//! and framework misuse. Every variant maps to a [`FailureKind`] so the retry
//! allow-list from settings can classify it.

use std::time::Duration;

use pilot_config::{BrowserType, ConfigError, FailureKind};
use thiserror::Error;

/// The main error type for all browser test operations.
#[derive(Debug, Error)]
pub enum BrowserError {
    /// Failed to launch the browser process.
    ///
    /// This typically occurs when the browser binary is not installed,
    /// or when there are permission issues with the executable.
    #[error("failed to launch {browser}: {reason}")]
    LaunchFailed {
        /// Browser family that failed to start
        browser: BrowserType,
        /// Human-readable reason for the launch failure
        reason: String,
        /// Optional underlying error that caused the failure
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Failed to establish or keep the DevTools connection.
    #[error("CDP connection failed: {0}")]
    ConnectionFailed(String),

    /// No factory is registered for the requested browser family.
    #[error("browser '{0}' is not supported")]
    BrowserNotSupported(BrowserType),

    /// The launched browser is older than the supported minimum.
    #[error("{browser} version '{detected}' is not supported (minimum major version {minimum})")]
    UnsupportedVersion {
        /// Browser family
        browser: BrowserType,
        /// Version string reported by the browser
        detected: String,
        /// Oldest accepted major version
        minimum: u32,
    },

    /// No settings record exists for the requested browser family.
    #[error("no settings configured for browser '{0}'")]
    MissingSettings(BrowserType),

    /// No driver is stored for the calling worker.
    #[error("driver is not initialized for this worker")]
    NotInitialized,

    /// The context passed to the driver store was incomplete.
    #[error("invalid driver context: {0}")]
    InvalidContext(String),

    /// Navigation to a URL failed or timed out.
    #[error("navigation to '{url}' failed: {reason}")]
    NavigationFailed {
        /// The URL that failed to load
        url: String,
        /// Reason for the navigation failure
        reason: String,
    },

    /// No element matched the locator.
    #[error("no element found for {locator}")]
    ElementNotFound {
        /// Display form of the locator
        locator: String,
    },

    /// The element was detached from the DOM after it was located.
    #[error("stale element reference: {0}")]
    StaleElement(String),

    /// The element exists but cannot receive the interaction.
    #[error("element not interactable: {0}")]
    ElementNotInteractable(String),

    /// The locator kind cannot be used in this context.
    #[error("unsupported locator {0}")]
    UnsupportedLocator(String),

    /// A wait condition was not satisfied within the timeout.
    #[error("wait condition '{condition}' timed out after {timeout:?}")]
    WaitTimeout {
        /// Description of the condition that timed out
        condition: String,
        /// How long we waited before timing out
        timeout: Duration,
    },

    /// A retried operation kept producing results the caller rejected.
    #[error("'{operation}' produced no acceptable result after {attempts} attempts")]
    ResultRejected {
        /// Name of the retried operation
        operation: String,
        /// Number of attempts made
        attempts: u32,
    },

    /// JavaScript execution in the page context failed.
    #[error("JavaScript execution failed: {0}")]
    ScriptExecutionFailed(String),

    /// An operation was attempted on a closed browser instance.
    #[error("browser instance is already closed")]
    AlreadyClosed,

    /// A test scope transition was requested from the wrong state.
    #[error("test scope is {actual}, expected {expected}")]
    InvalidScopeState {
        /// State required by the transition
        expected: &'static str,
        /// State the scope was in
        actual: &'static str,
    },

    /// Writing report results failed.
    #[error("report error: {0}")]
    Report(String),

    /// Settings could not be loaded or were invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Wraps errors from the chromiumoxide library.
    #[error("chromiumoxide error: {0}")]
    ChromiumOxide(#[from] chromiumoxide::error::CdpError),

    /// Generic I/O errors (file access, network, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BrowserError {
    /// Classifies the error for retry decisions and reporting.
    pub fn kind(&self) -> FailureKind {
        match self {
            BrowserError::LaunchFailed { .. } | BrowserError::UnsupportedVersion { .. } => {
                FailureKind::Launch
            }
            BrowserError::ConnectionFailed(_) | BrowserError::AlreadyClosed => {
                FailureKind::Connection
            }
            BrowserError::BrowserNotSupported(_) | BrowserError::MissingSettings(_) => {
                FailureKind::UnsupportedBrowser
            }
            BrowserError::NotInitialized | BrowserError::InvalidContext(_) => {
                FailureKind::NotInitialized
            }
            BrowserError::NavigationFailed { .. } => FailureKind::Navigation,
            BrowserError::ElementNotFound { .. } => FailureKind::ElementNotFound,
            BrowserError::StaleElement(_) => FailureKind::StaleElement,
            BrowserError::ElementNotInteractable(_) => FailureKind::ElementNotInteractable,
            BrowserError::WaitTimeout { .. } => FailureKind::WaitTimeout,
            BrowserError::ResultRejected { .. } => FailureKind::ResultRejected,
            BrowserError::ScriptExecutionFailed(_) | BrowserError::Json(_) => FailureKind::Script,
            BrowserError::Report(_) => FailureKind::Report,
            BrowserError::ChromiumOxide(err) => classify_cdp_message(&err.to_string()),
            BrowserError::UnsupportedLocator(_)
            | BrowserError::InvalidScopeState { .. }
            | BrowserError::Config(_)
            | BrowserError::Io(_) => FailureKind::Other,
        }
    }

    /// Maps a raw protocol error onto the most specific variant.
    pub(crate) fn from_cdp(err: chromiumoxide::error::CdpError) -> Self {
        let message = err.to_string();
        match classify_cdp_message(&message) {
            FailureKind::StaleElement => BrowserError::StaleElement(message),
            FailureKind::ElementNotInteractable => BrowserError::ElementNotInteractable(message),
            _ => BrowserError::ChromiumOxide(err),
        }
    }
}

/// DevTools reports detached nodes and unclickable targets only via message text.
fn classify_cdp_message(message: &str) -> FailureKind {
    let lower = message.to_ascii_lowercase();
    if lower.contains("node with given id")
        || lower.contains("could not find node")
        || lower.contains("cannot find context with specified id")
        || lower.contains("object reference chain is too long")
    {
        FailureKind::StaleElement
    } else if lower.contains("not visible")
        || lower.contains("does not have a layout object")
        || lower.contains("node is either not visible or not an htmlelement")
    {
        FailureKind::ElementNotInteractable
    } else if lower.contains("timeout") {
        FailureKind::WaitTimeout
    } else {
        FailureKind::Connection
    }
}

/// A specialized Result type for browser operations.
pub type Result<T> = std::result::Result<T, BrowserError>;
