//! Feed adapter
//!
//! Consumes parsed market-data events from the exchange session layer and
//! folds them into the book. The session/transport itself (connection,
//! auth, reconnect) lives outside the core; on reconnect it replays a full
//! snapshot and the book converges.
//!
//! Snapshot events carry the full ladder for one symbol: the adapter picks
//! the best level per side (highest bid, lowest ask, positive qty).
//! Incremental events are authoritative replacements of the top level on
//! the side they name; a delete collapses that side's qty to zero.

pub mod decode;

use std::sync::Arc;

use crate::core::{BookWriter, SymbolRegistry};
use crate::infrastructure::metrics::PipelineMetrics;

/// Message kind from the session layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Snapshot,
    Incremental,
}

/// Entry classification within one event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    Bid,
    Ask,
    /// Index / underlying price tick
    Index,
}

/// Incremental action on one entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryAction {
    New,
    Change,
    Delete,
}

/// One price level (or index tick) inside an event
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BookEntry {
    pub kind: EntryKind,
    pub action: EntryAction,
    pub price: f64,
    pub qty: f64,
}

impl BookEntry {
    pub fn new(kind: EntryKind, action: EntryAction, price: f64, qty: f64) -> Self {
        Self {
            kind,
            action,
            price,
            qty,
        }
    }
}

/// Parsed market-data event, as delivered by the session layer
#[derive(Debug, Clone, PartialEq)]
pub struct MarketDataEvent {
    pub kind: MessageKind,
    pub symbol: String,
    pub entries: Vec<BookEntry>,
    pub underlying_price: Option<f64>,
}

/// Folds events into the shared book and fans Updates out to the detector.
/// Owns the book's writer handle: dropping the adapter (and any other
/// writer clones) closes the Update channel, which is the cooperative stop
/// signal for the detector loop.
pub struct FeedAdapter {
    registry: Arc<SymbolRegistry>,
    writer: BookWriter,
    metrics: Arc<PipelineMetrics>,
}

impl FeedAdapter {
    pub fn new(
        registry: Arc<SymbolRegistry>,
        writer: BookWriter,
        metrics: Arc<PipelineMetrics>,
    ) -> Self {
        Self {
            registry,
            writer,
            metrics,
        }
    }

    /// Decode and apply one raw subscription frame.
    pub fn on_raw(&self, raw: &[u8]) {
        if let Some(event) = decode::decode_event(raw) {
            self.on_event(&event);
        }
    }

    /// Apply one event. Malformed entries and unknown symbols are dropped;
    /// there are no retries at this layer.
    pub fn on_event(&self, event: &MarketDataEvent) {
        self.metrics.record_event();

        // The index may ride on any event, including ones for symbols we do
        // not track (a dedicated index symbol, or the underlying_price field
        // on an option update).
        let index_price = self.extract_index(event);

        let Some(idx) = self.registry.index_of(&event.symbol) else {
            if event
                .entries
                .iter()
                .any(|e| matches!(e.kind, EntryKind::Bid | EntryKind::Ask))
            {
                self.metrics.record_unknown_symbol();
                tracing::debug!(symbol = %event.symbol, "event for untracked symbol dropped");
            } else if index_price > 0.0 {
                self.writer.set_index_price(index_price);
            }
            return;
        };
        let idx = idx as usize;

        match event.kind {
            MessageKind::Snapshot => self.apply_snapshot(idx, event, index_price),
            MessageKind::Incremental => self.apply_incremental(idx, event, index_price),
        }
    }

    fn apply_snapshot(&self, idx: usize, event: &MarketDataEvent, index_price: f64) {
        let mut best_bid: Option<(f64, f64)> = None;
        let mut best_ask: Option<(f64, f64)> = None;

        for entry in &event.entries {
            let is_bid = match entry.kind {
                EntryKind::Bid => true,
                EntryKind::Ask => false,
                EntryKind::Index => continue,
            };
            if !is_well_formed(entry) {
                self.metrics.record_malformed_entry();
                tracing::debug!(symbol = %event.symbol, ?entry, "malformed snapshot entry dropped");
                continue;
            }
            if entry.qty <= 0.0 || entry.action == EntryAction::Delete {
                continue;
            }
            if is_bid {
                if best_bid.is_none_or(|(p, _)| entry.price > p) {
                    best_bid = Some((entry.price, entry.qty));
                }
            } else if best_ask.is_none_or(|(p, _)| entry.price < p) {
                best_ask = Some((entry.price, entry.qty));
            }
        }

        if let Some((price, qty)) = best_bid {
            self.writer.apply_update(idx, true, price, qty, index_price);
        }
        if let Some((price, qty)) = best_ask {
            self.writer.apply_update(idx, false, price, qty, index_price);
        }
    }

    fn apply_incremental(&self, idx: usize, event: &MarketDataEvent, index_price: f64) {
        for entry in &event.entries {
            let is_bid = match entry.kind {
                EntryKind::Bid => true,
                EntryKind::Ask => false,
                EntryKind::Index => continue,
            };
            if !is_well_formed(entry) {
                self.metrics.record_malformed_entry();
                tracing::debug!(symbol = %event.symbol, ?entry, "malformed entry dropped");
                continue;
            }
            match entry.action {
                EntryAction::New | EntryAction::Change => {
                    self.writer
                        .apply_update(idx, is_bid, entry.price, entry.qty, index_price);
                }
                EntryAction::Delete => {
                    self.writer.apply_update(idx, is_bid, 0.0, 0.0, index_price);
                }
            }
        }
    }

    /// Best index price carried by this event, 0.0 when absent.
    fn extract_index(&self, event: &MarketDataEvent) -> f64 {
        if let Some(price) = event.underlying_price {
            if price.is_finite() && price > 0.0 {
                return price;
            }
        }
        for entry in &event.entries {
            if entry.kind == EntryKind::Index && entry.price.is_finite() && entry.price > 0.0 {
                return entry.price;
            }
        }
        0.0
    }
}

fn is_well_formed(entry: &BookEntry) -> bool {
    entry.price.is_finite() && entry.qty.is_finite() && entry.price >= 0.0 && entry.qty >= 0.0
}
