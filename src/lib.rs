//! Box-spread scanner for crypto options
//!
//! Core library for the market-data → detection → signal pipeline.

pub mod core;
pub mod detector;
pub mod engine;
pub mod feed;
pub mod infrastructure;
pub mod universe;

// Re-export commonly used types
pub use infrastructure::config::{ChannelConfig, Config, UniverseConfig};

use thiserror::Error;

/// Main error type for the scanner
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Configuration error: {0}")]
    Config(#[from] infrastructure::config::ConfigError),

    #[error("Discovery error: {0}")]
    Discovery(#[from] universe::discovery::DiscoveryError),

    #[error("Universe error: {0}")]
    Universe(#[from] universe::UniverseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, ScanError>;
