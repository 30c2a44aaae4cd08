//! Signal type and bounded sink
//!
//! The sink is a multi-producer / single-consumer queue with fixed capacity.
//! Producers never block: on a full queue the signal is dropped and counted.
//! Signals are advisory hints; the consumer must tolerate gaps.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use crossbeam_queue::ArrayQueue;
use tokio::sync::Notify;

use crate::core::clock;

/// Default sink capacity
pub const SIGNAL_QUEUE_CAPACITY: usize = 128;

/// Minimum spacing between drop warnings
const DROP_LOG_INTERVAL_NS: i64 = 1_000_000_000;

/// Which box the taker executes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoxSide {
    Long,
    Short,
}

impl BoxSide {
    /// +1 for Long, -1 for Short
    #[inline]
    pub const fn as_i8(self) -> i8 {
        match self {
            BoxSide::Long => 1,
            BoxSide::Short => -1,
        }
    }
}

/// One detected box-spread opportunity
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Signal {
    pub low_call_idx: i16,
    pub low_put_idx: i16,
    pub high_call_idx: i16,
    pub high_put_idx: i16,
    pub low_strike: f64,
    pub high_strike: f64,
    pub profit_floor_usd: f64,
    pub side: BoxSide,
    pub ts_ns: i64,
}

/// Bounded non-blocking signal queue.
pub struct SignalSink {
    queue: ArrayQueue<Signal>,
    notify: Notify,
    emitted: AtomicU64,
    dropped: AtomicU64,
    last_drop_log_ns: AtomicI64,
}

impl SignalSink {
    pub fn new() -> Self {
        Self::with_capacity(SIGNAL_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity),
            notify: Notify::new(),
            emitted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
            last_drop_log_ns: AtomicI64::new(0),
        }
    }

    /// Enqueue without blocking. Returns false when the queue was full and
    /// the signal was dropped.
    pub fn try_emit(&self, signal: Signal) -> bool {
        match self.queue.push(signal) {
            Ok(()) => {
                self.emitted.fetch_add(1, Ordering::Relaxed);
                self.notify.notify_one();
                true
            }
            Err(_) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                let now = clock::now_ns();
                let last = self.last_drop_log_ns.load(Ordering::Relaxed);
                if now - last >= DROP_LOG_INTERVAL_NS
                    && self
                        .last_drop_log_ns
                        .compare_exchange(last, now, Ordering::Relaxed, Ordering::Relaxed)
                        .is_ok()
                {
                    tracing::warn!(dropped, "signal queue full, dropping");
                }
                false
            }
        }
    }

    /// Non-blocking dequeue.
    #[inline]
    pub fn try_recv(&self) -> Option<Signal> {
        self.queue.pop()
    }

    /// Await the next signal.
    pub async fn recv(&self) -> Signal {
        loop {
            if let Some(signal) = self.queue.pop() {
                return signal;
            }
            self.notify.notified().await;
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn emitted(&self) -> u64 {
        self.emitted.load(Ordering::Relaxed)
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl Default for SignalSink {
    fn default() -> Self {
        Self::new()
    }
}
