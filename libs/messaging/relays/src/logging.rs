//! Logging initialisation
//!
//! `RUST_LOG` takes precedence over the configured level. Installing twice is
//! harmless: the second call leaves the existing subscriber in place.

use config::LoggingConfig;
use tracing_subscriber::EnvFilter;

const FALLBACK_LEVEL: &str = "info";

/// Filter from `RUST_LOG`, else the configured level, else `info`
pub fn env_filter(config: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.level.to_lowercase()))
        .unwrap_or_else(|_| EnvFilter::new(FALLBACK_LEVEL))
}

/// Install the global fmt subscriber. Returns `false` if one was already set.
pub fn init(config: &LoggingConfig) -> bool {
    let filter = env_filter(config);
    let installed = if config.json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
            .is_ok()
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .is_ok()
    };

    if installed {
        tracing::debug!(
            "Logging initialised (level {}, json {})",
            config.level,
            config.json
        );
    }
    installed
}
