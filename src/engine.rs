//! Application engine
//!
//! Strategy selection and wiring: spawns the detector reader loop, the
//! dedup janitor, and the built-in signal consumer. The strategy factory is
//! a tagged variant; only the box-spread engine is built here, derived
//! strategies live behind the same seam.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::core::{Book, SymbolRegistry, Update};
use crate::detector::{BoxConfig, BoxSide, BoxSpreadEngine, SignalSink};
use crate::infrastructure::metrics::PipelineMetrics;

/// Dedup bitmask clear period
pub const JANITOR_PERIOD: Duration = Duration::from_millis(100);

/// Selected strategy engine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    BoxSpread,
}

impl StrategyKind {
    /// Resolve from `STRATEGY` (text) then `STRATEGY_NUM` (number).
    /// Values naming other strategies are external to this core; they log
    /// and fall back to the box spread.
    pub fn from_env() -> Self {
        if let Ok(raw) = std::env::var("STRATEGY") {
            let s = raw.trim().to_lowercase();
            if !s.is_empty() {
                match s.as_str() {
                    "1" | "box_spread" | "box" | "boxspread" => return Self::BoxSpread,
                    other => {
                        tracing::warn!(strategy = other, "unsupported STRATEGY, using box_spread")
                    }
                }
                return Self::BoxSpread;
            }
        }
        if let Ok(raw) = std::env::var("STRATEGY_NUM") {
            let n = raw.trim();
            if !n.is_empty() && n != "1" {
                tracing::warn!(strategy_num = n, "unsupported STRATEGY_NUM, using box_spread");
            }
        }
        Self::BoxSpread
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::BoxSpread => "box_spread",
        }
    }
}

/// Handles of one running box-spread pipeline
pub struct BoxSpreadRuntime {
    pub engine: Arc<BoxSpreadEngine>,
    pub sink: Arc<SignalSink>,
    pub detector: JoinHandle<()>,
    pub janitor: JoinHandle<()>,
}

/// Spawn the detector loop and its janitor.
pub fn start_box_spread(
    registry: Arc<SymbolRegistry>,
    book: Arc<Book>,
    updates: mpsc::Receiver<Update>,
    sink: Arc<SignalSink>,
    cfg: BoxConfig,
) -> BoxSpreadRuntime {
    let engine = Arc::new(BoxSpreadEngine::new(registry, book, sink.clone(), cfg));
    let detector = tokio::spawn(engine.clone().run(updates));
    let janitor = spawn_janitor(engine.clone(), JANITOR_PERIOD);
    BoxSpreadRuntime {
        engine,
        sink,
        detector,
        janitor,
    }
}

/// Periodic dedup reset. No other side effects.
pub fn spawn_janitor(engine: Arc<BoxSpreadEngine>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            engine.reset_signal_mask();
        }
    })
}

/// Built-in consumer: logs each signal with all four legs' live quotes.
/// An executor/notifier would replace this; signals are advisory and the
/// consumer tolerates queue gaps.
pub fn spawn_signal_consumer(
    registry: Arc<SymbolRegistry>,
    book: Arc<Book>,
    sink: Arc<SignalSink>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            let sig = sink.recv().await;

            let low_call = book.read_depth(sig.low_call_idx as usize);
            let low_put = book.read_depth(sig.low_put_idx as usize);
            let high_call = book.read_depth(sig.high_call_idx as usize);
            let high_put = book.read_depth(sig.high_put_idx as usize);
            let index = book.index_price();

            let (verb_lo_call, verb_hi_call, verb_lo_put, verb_hi_put) = match sig.side {
                BoxSide::Long => ("buy ", "sell", "sell", "buy "),
                BoxSide::Short => ("sell", "buy ", "buy ", "sell"),
            };

            tracing::info!(
                side = sig.side.as_i8(),
                floor_usd = sig.profit_floor_usd,
                "[BOX-SPREAD] strikes={:.0}→{:.0} index={:.2}\n\
                 {verb_lo_call} callLo: {}  bid@{:.4} ask@{:.4} (qty {:.4}/{:.4})\n\
                 {verb_hi_call} callHi: {}  bid@{:.4} ask@{:.4} (qty {:.4}/{:.4})\n\
                 {verb_lo_put} putLo : {}  bid@{:.4} ask@{:.4} (qty {:.4}/{:.4})\n\
                 {verb_hi_put} putHi : {}  bid@{:.4} ask@{:.4} (qty {:.4}/{:.4})",
                sig.low_strike,
                sig.high_strike,
                index,
                registry.name_of(sig.low_call_idx),
                low_call.bid_price,
                low_call.ask_price,
                low_call.bid_qty,
                low_call.ask_qty,
                registry.name_of(sig.high_call_idx),
                high_call.bid_price,
                high_call.ask_price,
                high_call.bid_qty,
                high_call.ask_qty,
                registry.name_of(sig.low_put_idx),
                low_put.bid_price,
                low_put.ask_price,
                low_put.bid_qty,
                low_put.ask_qty,
                registry.name_of(sig.high_put_idx),
                high_put.bid_price,
                high_put.ask_price,
                high_put.bid_qty,
                high_put.ask_qty,
            );
        }
    })
}

/// Periodic pipeline status line.
pub fn spawn_stats_logger(metrics: Arc<PipelineMetrics>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.tick().await; // skip the immediate first tick
        loop {
            ticker.tick().await;
            let snap = metrics.snapshot();
            tracing::info!(
                events = snap.events,
                updates = snap.updates_enqueued,
                dropped = snap.updates_dropped,
                unknown = snap.unknown_symbols,
                rate_per_sec = snap.update_rate,
                "pipeline stats"
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::BookWriter;
    use crate::detector::Signal;

    #[test]
    fn test_strategy_from_env() {
        // Env-var tests share process state; exercise the cases in order.
        std::env::remove_var("STRATEGY");
        std::env::remove_var("STRATEGY_NUM");
        assert_eq!(StrategyKind::from_env(), StrategyKind::BoxSpread);

        std::env::set_var("STRATEGY", "box_spread");
        assert_eq!(StrategyKind::from_env(), StrategyKind::BoxSpread);

        std::env::set_var("STRATEGY", "protective_collar");
        assert_eq!(StrategyKind::from_env(), StrategyKind::BoxSpread);

        std::env::remove_var("STRATEGY");
        std::env::set_var("STRATEGY_NUM", "2");
        assert_eq!(StrategyKind::from_env(), StrategyKind::BoxSpread);
        std::env::remove_var("STRATEGY_NUM");

        assert_eq!(StrategyKind::BoxSpread.name(), "box_spread");
    }

    fn pipeline(cfg: BoxConfig) -> (BookWriter, Arc<Book>, BoxSpreadRuntime) {
        let registry = Arc::new(SymbolRegistry::register(&[
            "BTC-10AUG25-100-C",
            "BTC-10AUG25-100-P",
            "BTC-10AUG25-110-C",
            "BTC-10AUG25-110-P",
        ]));
        let metrics = Arc::new(PipelineMetrics::new());
        let book = Arc::new(Book::new());
        let (tx, rx) = mpsc::channel(256);
        let writer = BookWriter::new(book.clone(), tx, metrics);
        let sink = Arc::new(SignalSink::new());
        let runtime = start_box_spread(registry, book.clone(), rx, sink, cfg);
        (writer, book, runtime)
    }

    fn profitable_quotes(book: &Book) {
        book.write_depth(0, 0.06, 10.0, 0.03, 10.0);
        book.write_depth(1, 0.07, 10.0, 0.04, 10.0);
        book.write_depth(2, 0.055, 10.0, 0.02, 10.0);
        book.write_depth(3, 0.08, 10.0, 0.05, 10.0);
    }

    #[tokio::test]
    async fn test_end_to_end_update_to_signal() {
        let cfg = BoxConfig {
            min_strike_gap: 1.0,
            flatness_max: 0.0,
            fee_per_leg_rate: 0.0,
            ..BoxConfig::default()
        };
        let (writer, book, runtime) = pipeline(cfg);

        profitable_quotes(&book);
        writer.apply_update(0, true, 0.06, 10.0, 1000.0);

        let signal: Signal = tokio::time::timeout(Duration::from_secs(1), runtime.sink.recv())
            .await
            .expect("signal within deadline");
        assert_eq!(signal.side, BoxSide::Long);
        assert_eq!(signal.low_strike, 100.0);

        runtime.detector.abort();
        runtime.janitor.abort();
    }

    #[tokio::test]
    async fn test_detector_stops_when_writer_drops() {
        let (writer, _book, runtime) = pipeline(BoxConfig::default());

        // The writer owns the only Update sender. Dropping it closes the
        // channel and ends the reader loop after draining, with no abort.
        writer.apply_update(0, true, 0.01, 1.0, 0.0);
        drop(writer);
        tokio::time::timeout(Duration::from_secs(1), runtime.detector)
            .await
            .expect("detector terminates")
            .expect("no panic");
        runtime.janitor.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn test_janitor_reenables_suppressed_pairs() {
        let cfg = BoxConfig {
            min_strike_gap: 1.0,
            flatness_max: 0.0,
            fee_per_leg_rate: 0.0,
            debounce_ns: 0,
            ..BoxConfig::default()
        };
        let (writer, book, runtime) = pipeline(cfg);
        profitable_quotes(&book);

        // Let the janitor consume its immediate first tick so the next
        // clear lands at the 100 ms mark.
        tokio::time::sleep(Duration::from_millis(1)).await;

        writer.apply_update(0, true, 0.06, 10.0, 1000.0);
        tokio::time::sleep(Duration::from_millis(10)).await;
        let before = runtime.sink.emitted();
        assert!(before > 0);

        // Suppressed within the janitor period
        writer.apply_update(0, true, 0.06, 10.0, 1000.0);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(runtime.sink.emitted(), before);

        // After the 100 ms clear the same input fires again
        tokio::time::sleep(Duration::from_millis(150)).await;
        writer.apply_update(0, true, 0.06, 10.0, 1000.0);
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(runtime.sink.emitted() > before);

        runtime.detector.abort();
        runtime.janitor.abort();
    }
}
