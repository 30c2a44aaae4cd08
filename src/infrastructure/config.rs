//! Configuration management
//!
//! Loads configuration from config.toml at startup, then applies the small
//! set of environment overrides. All knobs are configurable to avoid
//! hardcoded constants; anything absent from the file keeps its default.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::detector::BoxConfig;

/// Scanner configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Universe selection settings
    #[serde(default)]
    pub universe: UniverseConfig,

    /// Box-spread detector knobs
    #[serde(default)]
    pub detector: BoxConfig,

    /// Channel capacities
    #[serde(default)]
    pub channels: ChannelConfig,
}

/// Universe selection settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UniverseConfig {
    /// Option currency to scan
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Index name for the spot price query
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// Upper bound in days on far-expiry selection (HEDGE_WINDOW_DAYS)
    #[serde(default = "default_window_days")]
    pub window_days: u32,
}

/// Channel capacities
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelConfig {
    /// Update channel (feed → detector)
    #[serde(default = "default_update_capacity")]
    pub update_capacity: usize,

    /// Signal sink (detector → executor)
    #[serde(default = "default_signal_capacity")]
    pub signal_capacity: usize,
}

impl Default for UniverseConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            index_name: default_index_name(),
            window_days: default_window_days(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            update_capacity: default_update_capacity(),
            signal_capacity: default_signal_capacity(),
        }
    }
}

fn default_currency() -> String {
    "BTC".to_string()
}

fn default_index_name() -> String {
    "btc_usd".to_string()
}

fn default_window_days() -> u32 {
    7
}

fn default_update_capacity() -> usize {
    2048
}

fn default_signal_capacity() -> usize {
    crate::detector::SIGNAL_QUEUE_CAPACITY
}

impl Config {
    /// Load from `$CONFIG_PATH` (default `config.toml`), then apply
    /// environment overrides. A missing file yields the defaults; a file
    /// that exists but does not parse is an error.
    pub fn load() -> Result<Self, ConfigError> {
        let path = std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.toml".to_string());

        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => {
                toml::from_str(&contents).map_err(|e| ConfigError::Parse(e.to_string()))?
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Config::default(),
            Err(e) => return Err(ConfigError::Io(e)),
        };

        config.apply_env()?;
        Ok(config)
    }

    /// Environment overrides: `HEDGE_WINDOW_DAYS` bounds far-expiry
    /// selection.
    pub fn apply_env(&mut self) -> Result<(), ConfigError> {
        if let Ok(raw) = std::env::var("HEDGE_WINDOW_DAYS") {
            let raw = raw.trim();
            if !raw.is_empty() {
                let days: u32 = raw
                    .parse()
                    .ok()
                    .filter(|&d| d > 0)
                    .ok_or_else(|| ConfigError::BadEnv("HEDGE_WINDOW_DAYS", raw.to_string()))?;
                self.universe.window_days = days;
            }
        }
        Ok(())
    }
}

/// `DATA_OB_DEBUG=1` enables verbose book-write logging.
pub fn book_debug_from_env() -> bool {
    std::env::var("DATA_OB_DEBUG").map(|v| v == "1").unwrap_or(false)
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(String),

    #[error("Invalid {0}={1}")]
    BadEnv(&'static str, String),
}
