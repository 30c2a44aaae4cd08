//! Pipeline counters
//!
//! Lock-free counters updated from the hot path, snapshotted in the cold
//! path for periodic status logging.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Shared counters for one scanner pipeline
pub struct PipelineMetrics {
    /// Feed events received from the session layer
    events: AtomicU64,
    /// Events for symbols outside the universe
    unknown_symbols: AtomicU64,
    /// Entries dropped for non-finite price/qty
    malformed_entries: AtomicU64,
    /// Updates enqueued toward the detector
    updates_enqueued: AtomicU64,
    /// Updates dropped on a full channel
    updates_dropped: AtomicU64,
    start_time: Instant,
}

/// Point-in-time view for logging
#[derive(Debug, Clone, Copy)]
pub struct MetricsSnapshot {
    pub events: u64,
    pub unknown_symbols: u64,
    pub malformed_entries: u64,
    pub updates_enqueued: u64,
    pub updates_dropped: u64,
    pub update_rate: f64,
    pub uptime_seconds: u64,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        Self {
            events: AtomicU64::new(0),
            unknown_symbols: AtomicU64::new(0),
            malformed_entries: AtomicU64::new(0),
            updates_enqueued: AtomicU64::new(0),
            updates_dropped: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    #[inline]
    pub fn record_event(&self) {
        self.events.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_unknown_symbol(&self) {
        self.unknown_symbols.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_malformed_entry(&self) {
        self.malformed_entries.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_update_enqueued(&self) {
        self.updates_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    #[inline]
    pub fn record_update_dropped(&self) {
        self.updates_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let enqueued = self.updates_enqueued.load(Ordering::Relaxed);
        let uptime = self.start_time.elapsed().as_secs();
        let rate = if uptime > 0 {
            enqueued as f64 / uptime as f64
        } else {
            0.0
        };

        MetricsSnapshot {
            events: self.events.load(Ordering::Relaxed),
            unknown_symbols: self.unknown_symbols.load(Ordering::Relaxed),
            malformed_entries: self.malformed_entries.load(Ordering::Relaxed),
            updates_enqueued: enqueued,
            updates_dropped: self.updates_dropped.load(Ordering::Relaxed),
            update_rate: rate,
            uptime_seconds: uptime,
        }
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_start_at_zero() {
        let metrics = PipelineMetrics::new();
        let snap = metrics.snapshot();
        assert_eq!(snap.events, 0);
        assert_eq!(snap.updates_enqueued, 0);
        assert_eq!(snap.updates_dropped, 0);
    }

    #[test]
    fn test_record_and_snapshot() {
        let metrics = PipelineMetrics::new();
        metrics.record_event();
        metrics.record_event();
        metrics.record_unknown_symbol();
        metrics.record_update_enqueued();
        metrics.record_update_dropped();

        let snap = metrics.snapshot();
        assert_eq!(snap.events, 2);
        assert_eq!(snap.unknown_symbols, 1);
        assert_eq!(snap.updates_enqueued, 1);
        assert_eq!(snap.updates_dropped, 1);
        assert!(snap.update_rate >= 0.0);
    }
}
