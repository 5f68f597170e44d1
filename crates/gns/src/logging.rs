//! Structured logging setup.
//!
//! `RUST_LOG` always wins over the configured level.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::{LogFormat, LoggingConfig};
use crate::error::{GnsError, Result};

/// Human-readable logs at `info` unless `RUST_LOG` says otherwise.
pub fn init() -> Result<()> {
    init_with(&LoggingConfig::default())
}

/// JSON logs for aggregation.
pub fn init_json() -> Result<()> {
    init_with(&LoggingConfig {
        format: LogFormat::Json,
        ..LoggingConfig::default()
    })
}

/// Install a global subscriber. Fails if one is already installed.
pub fn init_with(config: &LoggingConfig) -> Result<()> {
    let filter = env_filter(&config.level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.format {
        LogFormat::Text => registry.with(fmt::layer().with_target(true)).try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_target(true))
            .try_init(),
    };
    installed.map_err(|e| GnsError::Config(format!("logging: {e}")))
}

fn env_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| GnsError::Config(format!("invalid log level {level:?}: {e}"))),
    }
}
