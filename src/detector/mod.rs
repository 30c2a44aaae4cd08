//! Detection engines
//!
//! `box_spread` is the algorithmic core: it consumes book Updates and emits
//! `Signal`s through the bounded `SignalSink`.

pub mod box_spread;
pub mod signal;

pub use box_spread::{BoxConfig, BoxSpreadEngine};
pub use signal::{BoxSide, Signal, SignalSink, SIGNAL_QUEUE_CAPACITY};
