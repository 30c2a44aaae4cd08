//! Atomic top-of-book store
//!
//! Fixed-capacity table of per-option quote slots plus one shared index
//! price. Each slot has a single logical writer (the feed adapter) and many
//! readers. Fields are stored as f64 bit patterns in `AtomicU64` so every
//! store is word-atomic; a reader may observe a torn *combination* of
//! fields, never a torn value. The detector re-validates all four legs
//! before acting, so per-slot eventual consistency is sufficient.
//!
//! `Book` is pure storage. The Update fan-out lives in `BookWriter`, the
//! single handle that owns the channel `Sender`: dropping every writer
//! closes the channel, which is how the detector loop is told to drain and
//! stop. Readers (the detector) hold only `Arc<Book>` and keep no sender
//! alive.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc;

use crate::core::clock;
use crate::infrastructure::metrics::PipelineMetrics;

/// Maximum number of options tracked by one book
pub const MAX_OPTIONS: usize = 40;

/// One top-of-book slot, padded to a cache line to avoid false sharing
/// between feed writers on adjacent slots.
#[repr(align(64))]
#[derive(Debug, Default)]
struct Slot {
    bid_price: AtomicU64,
    bid_qty: AtomicU64,
    ask_price: AtomicU64,
    ask_qty: AtomicU64,
    last_update_ns: AtomicI64,
}

/// Plain-value snapshot of one slot
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DepthSnapshot {
    pub bid_price: f64,
    pub bid_qty: f64,
    pub ask_price: f64,
    pub ask_qty: f64,
    pub last_update_ns: i64,
}

/// Event produced on every successful slot write
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Update {
    pub slot_idx: u16,
    pub is_bid: bool,
    pub price: f64,
    pub qty: f64,
    pub index_price: f64,
    pub ts_ns: i64,
}

/// Fixed-capacity quote storage with a shared index price.
///
/// Owned value: tests instantiate isolated books, production wires one
/// through `Arc`. Slot memory is never reallocated after construction.
pub struct Book {
    slots: Box<[Slot; MAX_OPTIONS]>,
    index_price: AtomicU64,
    index_update_ns: AtomicI64,
    debug_writes: bool,
}

impl Book {
    pub fn new() -> Self {
        Self {
            slots: Box::new(std::array::from_fn(|_| Slot::default())),
            index_price: AtomicU64::new(0),
            index_update_ns: AtomicI64::new(0),
            debug_writes: false,
        }
    }

    /// Enable per-write debug logging (DATA_OB_DEBUG=1)
    pub fn with_debug_writes(mut self, enabled: bool) -> Self {
        self.debug_writes = enabled;
        self
    }

    /// Overwrite all four quote fields of slot `idx`. Last writer wins.
    /// Out-of-range indices are ignored.
    pub fn write_depth(&self, idx: usize, bid: f64, bid_qty: f64, ask: f64, ask_qty: f64) {
        let Some(slot) = self.slots.get(idx) else {
            return;
        };
        slot.bid_price.store(bid.to_bits(), Ordering::Release);
        slot.bid_qty.store(bid_qty.to_bits(), Ordering::Release);
        slot.ask_price.store(ask.to_bits(), Ordering::Release);
        slot.ask_qty.store(ask_qty.to_bits(), Ordering::Release);
        slot.last_update_ns.store(clock::now_ns(), Ordering::Release);

        if self.debug_writes {
            tracing::debug!(
                target: "book",
                idx,
                bid,
                bid_qty,
                ask,
                ask_qty,
                "depth write"
            );
        }
    }

    /// Field-by-field acquire read of slot `idx`. Out-of-range indices
    /// return the zeroed snapshot.
    #[inline]
    pub fn read_depth(&self, idx: usize) -> DepthSnapshot {
        let Some(slot) = self.slots.get(idx) else {
            return DepthSnapshot::default();
        };
        DepthSnapshot {
            bid_price: f64::from_bits(slot.bid_price.load(Ordering::Acquire)),
            bid_qty: f64::from_bits(slot.bid_qty.load(Ordering::Acquire)),
            ask_price: f64::from_bits(slot.ask_price.load(Ordering::Acquire)),
            ask_qty: f64::from_bits(slot.ask_qty.load(Ordering::Acquire)),
            last_update_ns: slot.last_update_ns.load(Ordering::Acquire),
        }
    }

    pub fn set_index_price(&self, value: f64) {
        self.index_price.store(value.to_bits(), Ordering::Release);
        self.index_update_ns
            .store(clock::now_ns(), Ordering::Release);
    }

    #[inline]
    pub fn index_price(&self) -> f64 {
        f64::from_bits(self.index_price.load(Ordering::Acquire))
    }

    #[inline]
    pub fn index_update_ns(&self) -> i64 {
        self.index_update_ns.load(Ordering::Acquire)
    }
}

impl Default for Book {
    fn default() -> Self {
        Self::new()
    }
}

/// Writer handle: storage access plus the Update fan-out.
///
/// This is the only owner of the channel `Sender`. The feed adapter holds
/// it for the process lifetime; dropping the last writer closes the Update
/// channel and lets the detector drain and exit cooperatively.
pub struct BookWriter {
    book: Arc<Book>,
    updates: mpsc::Sender<Update>,
    metrics: Arc<PipelineMetrics>,
}

impl BookWriter {
    pub fn new(
        book: Arc<Book>,
        updates: mpsc::Sender<Update>,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            book,
            updates,
            metrics,
        }
    }

    /// Shared storage behind this writer.
    #[inline]
    pub fn book(&self) -> &Arc<Book> {
        &self.book
    }

    pub fn set_index_price(&self, value: f64) {
        self.book.set_index_price(value);
    }

    /// Overwrite one side of slot `idx`, optionally refresh the index price,
    /// and enqueue an `Update` without blocking. A full channel drops the
    /// event; the next update on the same symbol re-evaluates, so detection
    /// stays correct.
    pub fn apply_update(&self, idx: usize, is_bid: bool, price: f64, qty: f64, index_price: f64) {
        if idx >= MAX_OPTIONS {
            return;
        }

        let current = self.book.read_depth(idx);
        if is_bid {
            self.book
                .write_depth(idx, price, qty, current.ask_price, current.ask_qty);
        } else {
            self.book
                .write_depth(idx, current.bid_price, current.bid_qty, price, qty);
        }

        if index_price > 0.0 && index_price.is_finite() {
            self.book.set_index_price(index_price);
        }

        let update = Update {
            slot_idx: idx as u16,
            is_bid,
            price,
            qty,
            index_price,
            ts_ns: clock::now_ns(),
        };
        match self.updates.try_send(update) {
            Ok(()) => self.metrics.record_update_enqueued(),
            Err(_) => self.metrics.record_update_dropped(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_writer(capacity: usize) -> (BookWriter, Arc<Book>, mpsc::Receiver<Update>) {
        let book = Arc::new(Book::new());
        let (tx, rx) = mpsc::channel(capacity);
        let writer = BookWriter::new(book.clone(), tx, Arc::new(PipelineMetrics::new()));
        (writer, book, rx)
    }

    #[test]
    fn test_write_read_roundtrip() {
        let book = Book::new();
        book.write_depth(3, 0.021, 5.0, 0.023, 7.5);

        let snap = book.read_depth(3);
        assert_eq!(snap.bid_price, 0.021);
        assert_eq!(snap.bid_qty, 5.0);
        assert_eq!(snap.ask_price, 0.023);
        assert_eq!(snap.ask_qty, 7.5);
        assert!(snap.last_update_ns > 0);
    }

    #[test]
    fn test_empty_slot_is_zero() {
        let book = Book::new();
        let snap = book.read_depth(0);
        assert_eq!(snap.bid_price, 0.0);
        assert_eq!(snap.ask_qty, 0.0);
        assert_eq!(snap.last_update_ns, 0);
    }

    #[test]
    fn test_out_of_range_ignored() {
        let (writer, book, mut rx) = make_writer(16);
        book.write_depth(MAX_OPTIONS, 1.0, 1.0, 2.0, 2.0);
        writer.apply_update(MAX_OPTIONS, true, 1.0, 1.0, 0.0);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_apply_update_overwrites_one_side() {
        let (writer, book, mut rx) = make_writer(16);
        book.write_depth(1, 0.02, 10.0, 0.03, 20.0);
        writer.apply_update(1, true, 0.025, 12.0, 0.0);

        let snap = book.read_depth(1);
        assert_eq!(snap.bid_price, 0.025);
        assert_eq!(snap.bid_qty, 12.0);
        // Ask side untouched
        assert_eq!(snap.ask_price, 0.03);
        assert_eq!(snap.ask_qty, 20.0);

        let update = rx.try_recv().unwrap();
        assert_eq!(update.slot_idx, 1);
        assert!(update.is_bid);
        assert_eq!(update.price, 0.025);
    }

    #[test]
    fn test_index_price_gating() {
        let (writer, book, _rx) = make_writer(16);
        book.set_index_price(65_000.0);
        assert_eq!(book.index_price(), 65_000.0);

        // Non-positive or non-finite index values on updates are ignored
        writer.apply_update(0, true, 0.01, 1.0, 0.0);
        assert_eq!(book.index_price(), 65_000.0);
        writer.apply_update(0, true, 0.01, 1.0, f64::NAN);
        assert_eq!(book.index_price(), 65_000.0);
        writer.apply_update(0, true, 0.01, 1.0, 66_000.0);
        assert_eq!(book.index_price(), 66_000.0);
    }

    #[test]
    fn test_update_channel_drop_on_full() {
        let (writer, _book, mut rx) = make_writer(2);
        for _ in 0..5 {
            writer.apply_update(0, true, 0.01, 1.0, 0.0);
        }
        // Only the channel capacity survives; the rest were dropped
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_dropping_writer_closes_channel() {
        let (writer, _book, mut rx) = make_writer(16);
        writer.apply_update(0, true, 0.01, 1.0, 0.0);
        drop(writer);

        // Buffered updates drain, then the channel reports closed
        assert!(rx.try_recv().is_ok());
        assert!(matches!(
            rx.try_recv(),
            Err(mpsc::error::TryRecvError::Disconnected)
        ));
    }

    #[test]
    fn test_idempotent_rewrite() {
        let book = Book::new();
        book.write_depth(2, 0.02, 10.0, 0.03, 20.0);
        let first = book.read_depth(2);
        book.write_depth(2, 0.02, 10.0, 0.03, 20.0);
        let second = book.read_depth(2);
        assert_eq!(first.bid_price, second.bid_price);
        assert_eq!(first.bid_qty, second.bid_qty);
        assert_eq!(first.ask_price, second.ask_price);
        assert_eq!(first.ask_qty, second.ask_qty);
    }
}
