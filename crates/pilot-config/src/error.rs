//! Error types for settings loading and validation.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    // Layered loading errors (file syntax, type mismatches, env overrides)
    #[error("failed to load settings: {message}")]
    Load { message: String },

    // Schema validation errors
    #[error("invalid setting '{field}': {message}")]
    InvalidValue {
        field: String,
        message: String,
        hint: Option<String>,
    },

    #[error("no settings configured for default browser '{browser}'")]
    MissingBrowser { browser: String },

    #[error("unknown browser '{0}' (expected chrome, edge, brave or firefox)")]
    UnknownBrowser(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &str, message: impl Into<String>, hint: &str) -> Self {
        ConfigError::InvalidValue {
            field: field.to_string(),
            message: message.into(),
            hint: Some(hint.to_string()),
        }
    }

    /// Returns the remediation hint attached to validation failures, if any.
    pub fn hint(&self) -> Option<&str> {
        match self {
            ConfigError::InvalidValue { hint, .. } => hint.as_deref(),
            _ => None,
        }
    }
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        ConfigError::Load {
            message: err.to_string(),
        }
    }
}
