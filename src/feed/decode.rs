//! Wire decoding for exchange notifications
//!
//! Translates raw subscription frames (Deribit-style JSON-RPC) into
//! `MarketDataEvent`s. Handles three frame families:
//! - `book.<instrument>...` with full ladders (snapshot) or tagged
//!   `[action, price, qty]` triples (change),
//! - `deribit_price_index.<name>` index ticks,
//! - everything else (acks, heartbeats, unknown channels) → ignored.
//!
//! Malformed frames decode to `None`; the session layer does not retry.

use serde::Deserialize;

use crate::feed::{BookEntry, EntryAction, EntryKind, MarketDataEvent, MessageKind};

/// Decode one raw frame. `None` means "nothing for the book": an ack, an
/// unknown channel, or a malformed frame (logged at debug).
pub fn decode_event(raw: &[u8]) -> Option<MarketDataEvent> {
    let frame: Frame = match serde_json::from_slice(raw) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::debug!(error = %e, "malformed frame dropped");
            return None;
        }
    };

    // Only subscription notifications carry data
    if frame.method.as_deref() != Some("subscription") {
        return None;
    }
    let params = frame.params?;
    let channel = params.channel.as_str();

    if channel.starts_with("book.") {
        decode_book(params.data)
    } else if channel.starts_with("deribit_price_index.") {
        decode_index(params.data)
    } else {
        None
    }
}

fn decode_book(data: serde_json::Value) -> Option<MarketDataEvent> {
    let book: BookData = match serde_json::from_value(data) {
        Ok(book) => book,
        Err(e) => {
            tracing::debug!(error = %e, "malformed book frame dropped");
            return None;
        }
    };

    let kind = match book.update_type.as_deref() {
        Some("change") => MessageKind::Incremental,
        // Full ladders and untyped frames are authoritative snapshots
        _ => MessageKind::Snapshot,
    };

    let mut entries = Vec::with_capacity(book.bids.len() + book.asks.len());
    collect_levels(&mut entries, EntryKind::Bid, &book.bids);
    collect_levels(&mut entries, EntryKind::Ask, &book.asks);

    Some(MarketDataEvent {
        kind,
        symbol: book.instrument_name,
        entries,
        underlying_price: book.underlying_price,
    })
}

fn collect_levels(entries: &mut Vec<BookEntry>, kind: EntryKind, levels: &[RawLevel]) {
    for level in levels {
        match level {
            RawLevel::Plain(price, qty) => {
                entries.push(BookEntry::new(kind, EntryAction::New, *price, *qty));
            }
            RawLevel::Tagged(action, price, qty) => {
                let action = match action.as_str() {
                    "new" => EntryAction::New,
                    "change" => EntryAction::Change,
                    "delete" => EntryAction::Delete,
                    other => {
                        tracing::debug!(action = other, "unknown level action dropped");
                        continue;
                    }
                };
                entries.push(BookEntry::new(kind, action, *price, *qty));
            }
        }
    }
}

fn decode_index(data: serde_json::Value) -> Option<MarketDataEvent> {
    let tick: IndexTick = match serde_json::from_value(data) {
        Ok(tick) => tick,
        Err(e) => {
            tracing::debug!(error = %e, "malformed index frame dropped");
            return None;
        }
    };
    Some(MarketDataEvent {
        kind: MessageKind::Incremental,
        symbol: tick.index_name,
        entries: vec![BookEntry::new(
            EntryKind::Index,
            EntryAction::Change,
            tick.price,
            0.0,
        )],
        underlying_price: None,
    })
}

// === Frame shapes ===

#[derive(Debug, Deserialize)]
struct Frame {
    method: Option<String>,
    params: Option<Params>,
}

#[derive(Debug, Deserialize)]
struct Params {
    channel: String,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct BookData {
    instrument_name: String,
    #[serde(rename = "type")]
    update_type: Option<String>,
    #[serde(default)]
    bids: Vec<RawLevel>,
    #[serde(default)]
    asks: Vec<RawLevel>,
    underlying_price: Option<f64>,
}

/// Either a `[price, qty]` ladder level or an `[action, price, qty]`
/// change triple.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RawLevel {
    Tagged(String, f64, f64),
    Plain(f64, f64),
}

#[derive(Debug, Deserialize)]
struct IndexTick {
    index_name: String,
    price: f64,
}
