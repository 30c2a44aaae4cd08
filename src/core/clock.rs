//! Monotonic nanosecond clock
//!
//! Timestamps are relative to the first call in the process. `Instant` is
//! vDSO-backed on Linux, so the hot path pays no syscall.

use std::sync::OnceLock;
use std::time::Instant;

static ANCHOR: OnceLock<Instant> = OnceLock::new();

/// Monotonic nanoseconds since process start
#[inline(always)]
pub fn now_ns() -> i64 {
    let anchor = ANCHOR.get_or_init(Instant::now);
    anchor.elapsed().as_nanos() as i64
}
