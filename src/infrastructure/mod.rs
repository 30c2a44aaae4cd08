//! Infrastructure - cold path only
//!
//! Non-latency-critical code: configuration, logging setup, and the
//! pipeline counters (which are written from the hot path but only read
//! here).

pub mod config;
pub mod logging;
pub mod metrics;

pub use metrics::PipelineMetrics;
