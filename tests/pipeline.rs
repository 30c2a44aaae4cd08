//! End-to-end pipeline tests: raw frames → feed adapter → book → detector
//! → signal sink, over the real tokio wiring.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use boxarb::core::{Book, BookWriter, SymbolRegistry};
use boxarb::detector::{BoxConfig, BoxSide, SignalSink};
use boxarb::engine::{self, BoxSpreadRuntime};
use boxarb::feed::{
    BookEntry, EntryAction, EntryKind, FeedAdapter, MarketDataEvent, MessageKind,
};
use boxarb::infrastructure::PipelineMetrics;

const SYMBOLS: [&str; 4] = [
    "BTC-10AUG25-100-C",
    "BTC-10AUG25-100-P",
    "BTC-10AUG25-110-C",
    "BTC-10AUG25-110-P",
];

fn permissive_config() -> BoxConfig {
    BoxConfig {
        min_strike_gap: 1.0,
        debounce_ns: 0,
        flatness_max: 0.0,
        fee_per_leg_rate: 0.0,
        ..BoxConfig::default()
    }
}

fn pipeline(cfg: BoxConfig) -> (FeedAdapter, Arc<Book>, BoxSpreadRuntime) {
    let registry = Arc::new(SymbolRegistry::register(&SYMBOLS));
    let metrics = Arc::new(PipelineMetrics::new());
    let book = Arc::new(Book::new());
    let (tx, rx) = mpsc::channel(1024);
    let sink = Arc::new(SignalSink::new());
    let runtime = engine::start_box_spread(registry.clone(), book.clone(), rx, sink, cfg);
    let writer = BookWriter::new(book.clone(), tx, metrics.clone());
    let adapter = FeedAdapter::new(registry, writer, metrics);
    (adapter, book, runtime)
}

fn two_sided(symbol: &str, bid: f64, ask: f64, qty: f64) -> MarketDataEvent {
    MarketDataEvent {
        kind: MessageKind::Incremental,
        symbol: symbol.to_string(),
        entries: vec![
            BookEntry::new(EntryKind::Bid, EntryAction::Change, bid, qty),
            BookEntry::new(EntryKind::Ask, EntryAction::Change, ask, qty),
        ],
        underlying_price: Some(1000.0),
    }
}

async fn expect_signal(runtime: &BoxSpreadRuntime) -> boxarb::detector::Signal {
    tokio::time::timeout(Duration::from_secs(1), runtime.sink.recv())
        .await
        .expect("signal within deadline")
}

#[tokio::test]
async fn test_events_to_long_box_signal() {
    let (adapter, _book, runtime) = pipeline(permissive_config());

    // The profitable long-box quote set, delivered as feed events
    adapter.on_event(&two_sided("BTC-10AUG25-100-C", 0.06, 0.03, 10.0));
    adapter.on_event(&two_sided("BTC-10AUG25-100-P", 0.07, 0.04, 10.0));
    adapter.on_event(&two_sided("BTC-10AUG25-110-C", 0.055, 0.02, 10.0));
    adapter.on_event(&two_sided("BTC-10AUG25-110-P", 0.08, 0.05, 10.0));

    // Early partial-book passes may have burned the dedup bucket; clear it
    // the way the janitor does and nudge the pair once more.
    tokio::time::sleep(Duration::from_millis(20)).await;
    runtime.engine.reset_signal_mask();
    adapter.on_event(&two_sided("BTC-10AUG25-100-C", 0.06, 0.03, 10.0));

    let mut signal = expect_signal(&runtime).await;
    while signal.side != BoxSide::Long {
        signal = expect_signal(&runtime).await;
    }
    assert_eq!(signal.low_strike, 100.0);
    assert_eq!(signal.high_strike, 110.0);
    assert!((signal.profit_floor_usd - 550.0).abs() < 1e-9);

    runtime.detector.abort();
    runtime.janitor.abort();
}

#[tokio::test]
async fn test_fair_quotes_stay_silent() {
    let (adapter, _book, runtime) = pipeline(permissive_config());

    // Combined cost above the fixed payoff on both sides
    adapter.on_event(&two_sided("BTC-10AUG25-100-C", 0.02, 0.03, 10.0));
    adapter.on_event(&two_sided("BTC-10AUG25-100-P", 0.03, 0.04, 10.0));
    adapter.on_event(&two_sided("BTC-10AUG25-110-C", 0.015, 0.02, 10.0));
    adapter.on_event(&two_sided("BTC-10AUG25-110-P", 0.04, 0.05, 10.0));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(runtime.sink.try_recv().is_none());
    assert_eq!(runtime.sink.emitted(), 0);

    runtime.detector.abort();
    runtime.janitor.abort();
}

#[tokio::test]
async fn test_reconnect_snapshot_restores_state() {
    let (adapter, book, runtime) = pipeline(permissive_config());

    // Stale incremental state from before a disconnect
    adapter.on_event(&two_sided("BTC-10AUG25-100-C", 0.01, 0.09, 1.0));

    // The session layer reconnects and replays full snapshots
    for (symbol, bid, ask) in [
        ("BTC-10AUG25-100-C", 0.06, 0.03),
        ("BTC-10AUG25-100-P", 0.07, 0.04),
        ("BTC-10AUG25-110-C", 0.055, 0.02),
        ("BTC-10AUG25-110-P", 0.08, 0.05),
    ] {
        adapter.on_event(&MarketDataEvent {
            kind: MessageKind::Snapshot,
            symbol: symbol.to_string(),
            entries: vec![
                BookEntry::new(EntryKind::Bid, EntryAction::New, bid, 10.0),
                BookEntry::new(EntryKind::Bid, EntryAction::New, bid - 0.005, 20.0),
                BookEntry::new(EntryKind::Ask, EntryAction::New, ask, 10.0),
                BookEntry::new(EntryKind::Ask, EntryAction::New, ask + 0.005, 20.0),
            ],
            underlying_price: Some(1000.0),
        });
    }

    let snap = book.read_depth(0);
    assert_eq!(snap.bid_price, 0.06);
    assert_eq!(snap.ask_price, 0.03);

    tokio::time::sleep(Duration::from_millis(20)).await;
    runtime.engine.reset_signal_mask();
    adapter.on_event(&two_sided("BTC-10AUG25-100-C", 0.06, 0.03, 10.0));

    let signal = expect_signal(&runtime).await;
    assert_eq!(signal.low_strike, 100.0);

    runtime.detector.abort();
    runtime.janitor.abort();
}

#[tokio::test]
async fn test_untracked_and_index_frames_are_harmless() {
    let (adapter, book, runtime) = pipeline(permissive_config());

    adapter.on_event(&two_sided("ETH-10AUG25-3000-C", 0.5, 0.6, 1.0));
    adapter.on_event(&MarketDataEvent {
        kind: MessageKind::Incremental,
        symbol: "btc_usd".to_string(),
        entries: vec![BookEntry::new(
            EntryKind::Index,
            EntryAction::Change,
            1000.0,
            0.0,
        )],
        underlying_price: None,
    });

    assert_eq!(book.index_price(), 1000.0);
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(runtime.sink.emitted(), 0);

    runtime.detector.abort();
    runtime.janitor.abort();
}

#[tokio::test]
async fn test_dropping_adapter_stops_detector_cooperatively() {
    let (adapter, _book, runtime) = pipeline(permissive_config());

    adapter.on_event(&two_sided("BTC-10AUG25-100-C", 0.02, 0.03, 10.0));

    // The adapter's writer holds the only Update sender in the wiring.
    // Dropping it closes the channel; the detector drains and stops
    // without being cancelled.
    drop(adapter);
    tokio::time::timeout(Duration::from_secs(1), runtime.detector)
        .await
        .expect("detector drains and stops")
        .expect("no panic");
    runtime.janitor.abort();
}

#[tokio::test]
async fn test_raw_frames_drive_the_book() {
    let (adapter, book, runtime) = pipeline(permissive_config());

    adapter.on_raw(
        br#"{
        "method": "subscription",
        "params": {
            "channel": "book.BTC-10AUG25-100-C.none.10.100ms",
            "data": {
                "instrument_name": "BTC-10AUG25-100-C",
                "bids": [[0.021, 5.0], [0.020, 9.0]],
                "asks": [[0.023, 4.0]],
                "underlying_price": 1000.0
            }
        }
    }"#,
    );
    adapter.on_raw(b"garbage frame");

    let snap = book.read_depth(0);
    assert_eq!(snap.bid_price, 0.021);
    assert_eq!(snap.ask_price, 0.023);
    assert_eq!(book.index_price(), 1000.0);

    runtime.detector.abort();
    runtime.janitor.abort();
}
