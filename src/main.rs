//! Box-spread scanner binary
//!
//! # Architecture
//! - **core**: clock, atomic book, symbol registry
//! - **universe**: instrument discovery and ATM universe selection
//! - **feed**: market-data event adapter (session layer attaches here)
//! - **detector**: box-spread engine and signal sink
//! - **infrastructure**: cold path (logging, config, counters)
//!
//! Start-up builds the universe, wires the pipeline and serves until
//! SIGINT/SIGTERM. Exit is 0 on clean shutdown, non-zero on fatal start-up
//! errors (empty universe, no expiries in window, discovery failure).

use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;

use boxarb::core::{Book, BookWriter, SymbolRegistry};
use boxarb::detector::SignalSink;
use boxarb::engine::{self, StrategyKind};
use boxarb::feed::FeedAdapter;
use boxarb::infrastructure::config::{book_debug_from_env, Config};
use boxarb::infrastructure::{logging, PipelineMetrics};
use boxarb::universe::{build_universe, discovery::InstrumentDiscovery};

/// How long a draining detector gets before it is cancelled outright
const DRAIN_DEADLINE: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> ExitCode {
    let _guards = logging::init_logging();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> boxarb::Result<()> {
    let config = Config::load()?;
    let strategy = StrategyKind::from_env();
    tracing::info!(strategy = strategy.name(), "starting scanner");

    // One-shot discovery: spot index + active instrument list
    let discovery = InstrumentDiscovery::new();
    let spot = discovery
        .fetch_index_price(&config.universe.index_name)
        .await?;
    tracing::info!(index = %config.universe.index_name, spot, "index price");
    let instruments = discovery
        .fetch_instruments(&config.universe.currency)
        .await?;

    let now_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64;
    let universe = build_universe(&instruments, spot, now_ms, config.universe.window_days)?;

    // Frozen for the process lifetime
    let registry = Arc::new(SymbolRegistry::register(&universe.symbols));
    let metrics = Arc::new(PipelineMetrics::new());

    let book = Arc::new(Book::new().with_debug_writes(book_debug_from_env()));
    book.set_index_price(spot);

    let (update_tx, update_rx) = mpsc::channel(config.channels.update_capacity);
    let sink = Arc::new(SignalSink::with_capacity(config.channels.signal_capacity));
    let runtime = match strategy {
        StrategyKind::BoxSpread => engine::start_box_spread(
            registry.clone(),
            book.clone(),
            update_rx,
            sink.clone(),
            config.detector.clone(),
        ),
    };
    let consumer = engine::spawn_signal_consumer(registry.clone(), book.clone(), sink);
    let stats = engine::spawn_stats_logger(metrics.clone(), Duration::from_secs(60));

    // The exchange session layer (external) drives this adapter with parsed
    // market-data events; it owns reconnects and re-snapshots. The adapter
    // holds the sole Update sender via its BookWriter.
    let adapter = FeedAdapter::new(
        registry,
        BookWriter::new(book.clone(), update_tx, metrics.clone()),
        metrics,
    );

    shutdown_signal().await;
    tracing::info!("shutting down");

    // Cooperative stop: dropping the last writer closes the Update channel;
    // the detector drains what is queued and exits on its own. Signals left
    // in the sink are discarded with the consumer.
    drop(adapter);
    let mut detector = runtime.detector;
    if tokio::time::timeout(DRAIN_DEADLINE, &mut detector)
        .await
        .is_err()
    {
        tracing::warn!("detector did not drain within {DRAIN_DEADLINE:?}, cancelling");
        detector.abort();
    }
    runtime.janitor.abort();
    consumer.abort();
    stats.abort();
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = signal(SignalKind::terminate()).expect("install SIGTERM handler");
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = term.recv() => {}
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
