//! Logging setup on the `tracing` ecosystem.
//!
//! `RUST_LOG` wins when set; otherwise the level from [`LoggingSettings`]
//! applies to the pilot crates. Initialisation is idempotent so every test can
//! call it, whichever runs first installs the subscriber.
//!
//! ```rust,no_run
//! use pilot_browser::logger::init_logging;
//! use pilot_config::LoggingSettings;
//!
//! init_logging(&LoggingSettings::default());
//! tracing::info!("starting suite");
//! ```

use pilot_config::LoggingSettings;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directive for `level`, scoped to the pilot crates.
pub fn default_directive(level: &str) -> String {
    format!("pilot_browser={level},pilot_config={level}")
}

/// Installs the global subscriber.
///
/// Returns false when a subscriber was already installed.
pub fn init_logging(settings: &LoggingSettings) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(&settings.level)));

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_level(true)
        .with_ansi(settings.ansi)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .try_init()
        .is_ok()
}
