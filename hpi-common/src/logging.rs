//! Tracing subscriber bootstrap
//!
//! `RUST_LOG` takes precedence over the configured level so operators can raise
//! verbosity for one run without editing the TOML file.

use crate::config::LoggingConfig;
use crate::{Error, Result};
use tracing_subscriber::{fmt, EnvFilter};

/// Install the global fmt subscriber.
///
/// Returns `Error::Config` if a global subscriber is already installed or the
/// configured level cannot be parsed as a filter directive.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.level)
            .map_err(|e| Error::Config(format!("Invalid log level '{}': {}", config.level, e)))?,
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {}", e)))
}
