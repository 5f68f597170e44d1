//! Engine configuration, loadable from TOML.
//!
//! ```toml
//! h3_resolution = 7
//! min_breadcrumbs_for_epoch = 100
//! epoch_block_size = 10
//!
//! [trust]
//! max_speed_kmh = 300.0
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```

use std::path::Path;
use std::time::Duration;

use gns_core::{TrustConfig, DEFAULT_BLOCK_SIZE};
use serde::{Deserialize, Serialize};

use crate::error::{GnsError, Result};

/// Top-level configuration. Every field has a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GnsConfig {
    /// H3 resolution used when collecting from coordinates.
    #[serde(default = "default_h3_resolution")]
    pub h3_resolution: u8,
    /// Pending breadcrumbs required before an epoch can be published.
    #[serde(default = "default_min_breadcrumbs")]
    pub min_breadcrumbs_for_epoch: usize,
    /// Breadcrumbs per Merkle leaf block.
    #[serde(default = "default_block_size")]
    pub epoch_block_size: usize,
    /// Advisory collection cadence, reported in collection status.
    #[serde(default = "default_interval")]
    pub breadcrumb_collection_interval_secs: u64,
    #[serde(default)]
    pub trust: TrustConfig,
    #[serde(default)]
    pub relay_urls: Vec<String>,
    #[serde(default = "default_timeout_ms")]
    pub network_timeout_ms: u64,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

fn default_h3_resolution() -> u8 {
    7
}
fn default_min_breadcrumbs() -> usize {
    100
}
fn default_block_size() -> usize {
    DEFAULT_BLOCK_SIZE
}
fn default_interval() -> u64 {
    300
}
fn default_timeout_ms() -> u64 {
    30_000
}
fn default_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            format: LogFormat::Text,
        }
    }
}

impl Default for GnsConfig {
    fn default() -> Self {
        Self {
            h3_resolution: default_h3_resolution(),
            min_breadcrumbs_for_epoch: default_min_breadcrumbs(),
            epoch_block_size: default_block_size(),
            breadcrumb_collection_interval_secs: default_interval(),
            trust: TrustConfig::default(),
            relay_urls: Vec::new(),
            network_timeout_ms: default_timeout_ms(),
            logging: LoggingConfig::default(),
        }
    }
}

impl GnsConfig {
    /// Low publication threshold and debug logging.
    pub fn development() -> Self {
        Self {
            min_breadcrumbs_for_epoch: 10,
            logging: LoggingConfig {
                level: "debug".to_string(),
                format: LogFormat::Text,
            },
            ..Self::default()
        }
    }

    pub fn production() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Self = toml::from_str(s).map_err(|e| GnsError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| GnsError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        if self.h3_resolution > 15 {
            return Err(GnsError::Config(format!(
                "h3_resolution must be 0-15, got {}",
                self.h3_resolution
            )));
        }
        if self.min_breadcrumbs_for_epoch == 0 {
            return Err(GnsError::Config(
                "min_breadcrumbs_for_epoch must be at least 1".into(),
            ));
        }
        if self.epoch_block_size == 0 {
            return Err(GnsError::Config("epoch_block_size must be at least 1".into()));
        }
        if self.trust.max_speed_kmh.is_nan() || self.trust.max_speed_kmh <= 0.0 {
            return Err(GnsError::Config("trust.max_speed_kmh must be positive".into()));
        }
        Ok(())
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }
}
