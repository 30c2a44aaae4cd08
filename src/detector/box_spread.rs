//! Box-spread detection engine
//!
//! A box spread is long a call and short a put at `K_low`, short a call and
//! long a put at `K_high`, same expiry. At expiry the combination pays
//! `K_high − K_low` per unit regardless of the underlying, so whenever the
//! tradable quotes imply a combined cost below (Long Box) or a credit above
//! (Short Box) that fixed payoff, after fees and worst-case settlement
//! drift, the difference is locked in.
//!
//! The engine consumes one `Update` at a time from a single cooperative
//! reader loop. Per update it walks the precomputed strike-pair row for the
//! touched slot, locates the four legs, snapshots their top of book and
//! evaluates both the Long and the Short execution. Premia are quoted in
//! the base coin, so the net outlay is settled at the worst underlying
//! price `S*` over the configured band before it is compared against the
//! fixed USD payoff.
//!
//! Every gate failure is a silent skip: the next update on the same pair
//! re-evaluates from fresh snapshots.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::core::{clock, Book, DepthSnapshot, SymbolRegistry, Update};
use crate::detector::signal::{BoxSide, Signal, SignalSink};

/// Runtime-tunable detection parameters.
///
/// Read once at engine construction. Runtime reconfiguration would be an
/// atomic swap of the whole record, never per-field mutation.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BoxConfig {
    /// Reject pairs with `K_high − K_low` below this (quote ccy)
    #[serde(default = "default_min_strike_gap")]
    pub min_strike_gap: f64,

    /// Skip detection if fewer ns elapsed since the last full pass
    #[serde(default = "default_debounce_ns")]
    pub debounce_ns: i64,

    /// Emission threshold on the worst-case profit floor (USD)
    #[serde(default = "default_min_profit_usd")]
    pub min_profit_usd: f64,

    /// Cap on `|net_base|/Q`; 0 disables the gate
    #[serde(default = "default_flatness_max")]
    pub flatness_max: f64,

    /// Upper bound for executable qty; 0 = unlimited
    #[serde(default)]
    pub max_qty: f64,

    /// Flat fee per leg (quote ccy × qty)
    #[serde(default)]
    pub fee_per_leg_fixed: f64,

    /// Fractional fee on notional per leg
    #[serde(default = "default_fee_per_leg_rate")]
    pub fee_per_leg_rate: f64,

    /// Evaluate against a worst-case underlying band instead of spot
    #[serde(default)]
    pub use_band_check: bool,

    /// Fallback half-width of the band around the index when smin/smax unset
    #[serde(default = "default_band_pct")]
    pub band_pct: f64,

    /// Explicit band bounds (USD); 0 = use the fallback band
    #[serde(default)]
    pub smin: f64,
    #[serde(default)]
    pub smax: f64,
}

fn default_min_strike_gap() -> f64 {
    1000.0
}
fn default_debounce_ns() -> i64 {
    10_000
}
fn default_min_profit_usd() -> f64 {
    1.0
}
fn default_flatness_max() -> f64 {
    0.02
}
fn default_fee_per_leg_rate() -> f64 {
    0.0001
}
fn default_band_pct() -> f64 {
    0.10
}

impl Default for BoxConfig {
    fn default() -> Self {
        Self {
            min_strike_gap: default_min_strike_gap(),
            debounce_ns: default_debounce_ns(),
            min_profit_usd: default_min_profit_usd(),
            flatness_max: default_flatness_max(),
            max_qty: 0.0,
            fee_per_leg_fixed: 0.0,
            fee_per_leg_rate: default_fee_per_leg_rate(),
            use_band_check: false,
            band_pct: default_band_pct(),
            smin: 0.0,
            smax: 0.0,
        }
    }
}

/// Slot indices of the four legs of one box
#[derive(Debug, Clone, Copy)]
struct BoxLegs {
    low_call: i16,
    low_put: i16,
    high_call: i16,
    high_put: i16,
}

pub struct BoxSpreadEngine {
    registry: Arc<SymbolRegistry>,
    book: Arc<Book>,
    sink: Arc<SignalSink>,
    cfg: BoxConfig,

    /// Coarse dedup over hash(K_low, K_high), cleared by the janitor
    recent_signals: AtomicU64,
    /// Debounce anchor; only the reader loop writes it
    last_check_ns: AtomicI64,
}

impl BoxSpreadEngine {
    pub fn new(
        registry: Arc<SymbolRegistry>,
        book: Arc<Book>,
        sink: Arc<SignalSink>,
        cfg: BoxConfig,
    ) -> Self {
        Self {
            registry,
            book,
            sink,
            cfg,
            recent_signals: AtomicU64::new(0),
            last_check_ns: AtomicI64::new(0),
        }
    }

    /// Reader loop. Terminates when all Update senders are dropped; signals
    /// still in the sink are left for the consumer to discard.
    pub async fn run(self: Arc<Self>, mut updates: mpsc::Receiver<Update>) {
        tracing::info!("box-spread engine running");
        while let Some(update) = updates.recv().await {
            self.process_update(&update);
        }
        tracing::info!("update channel closed, box-spread engine stopped");
    }

    /// Clear the coarse dedup bitmask, re-enabling suppressed pair hashes.
    pub fn reset_signal_mask(&self) {
        self.recent_signals.store(0, Ordering::Release);
    }

    /// Evaluate all eligible strike-pair peers of the updated slot.
    pub fn process_update(&self, update: &Update) {
        let idx = update.slot_idx as usize;
        let count = self.registry.count() as usize;
        if idx >= count {
            return;
        }

        let now = update.ts_ns;
        if now - self.last_check_ns.load(Ordering::Relaxed) < self.cfg.debounce_ns {
            return;
        }
        self.last_check_ns.store(now, Ordering::Relaxed);

        // Updates from index-less feeds fall back to the shared book index
        let index_price = if update.index_price > 0.0 {
            update.index_price
        } else {
            self.book.index_price()
        };

        for peer in 0..count {
            if !self.registry.pair(idx, peer) {
                continue;
            }
            self.check_box(idx, peer, index_price);
        }
    }

    fn check_box(&self, idx1: usize, idx2: usize, index_price: f64) {
        let (Some(opt1), Some(opt2)) = (
            self.registry.meta(idx1 as i16),
            self.registry.meta(idx2 as i16),
        ) else {
            return;
        };

        let (low_strike, high_strike) = if opt1.strike < opt2.strike {
            (opt1.strike, opt2.strike)
        } else {
            (opt2.strike, opt1.strike)
        };
        if high_strike - low_strike < self.cfg.min_strike_gap {
            return;
        }

        // Coarse hash dedup: one atomic test-and-set per pair. The bit is
        // recorded even when the evaluation below ends in a skip or a queue
        // drop; the janitor re-enables the bucket.
        let hash = (low_strike as u64)
            .wrapping_mul(1000)
            .wrapping_add(high_strike as u64);
        let bit = hash & 63;
        let prev = self
            .recent_signals
            .fetch_or(1u64 << bit, Ordering::AcqRel);
        if (prev >> bit) & 1 == 1 {
            return;
        }

        let Some(legs) = self.find_legs(opt1.expiry_tag, low_strike, high_strike) else {
            return;
        };

        let low_call = self.book.read_depth(legs.low_call as usize);
        let low_put = self.book.read_depth(legs.low_put as usize);
        let high_call = self.book.read_depth(legs.high_call as usize);
        let high_put = self.book.read_depth(legs.high_put as usize);

        if !all_sides_positive(&low_call)
            || !all_sides_positive(&low_put)
            || !all_sides_positive(&high_call)
            || !all_sides_positive(&high_put)
        {
            return;
        }
        if index_price <= 0.0 || !index_price.is_finite() {
            return;
        }

        let (smin, smax) = self.resolve_band(index_price);

        // Long box: buy C_low and P_high at the ask, sell P_low and C_high
        // at the bid.
        let long_qty = min4(
            low_call.ask_qty,
            high_put.ask_qty,
            low_put.bid_qty,
            high_call.bid_qty,
        );
        let long_net_unit =
            low_call.ask_price + high_put.ask_price - low_put.bid_price - high_call.bid_price;
        self.eval_side(
            BoxSide::Long,
            &legs,
            low_strike,
            high_strike,
            long_qty,
            long_net_unit,
            smin,
            smax,
        );

        // Short box: the mirror execution
        let short_qty = min4(
            high_call.ask_qty,
            low_put.ask_qty,
            low_call.bid_qty,
            high_put.bid_qty,
        );
        let short_net_unit =
            high_call.ask_price + low_put.ask_price - low_call.bid_price - high_put.bid_price;
        self.eval_side(
            BoxSide::Short,
            &legs,
            low_strike,
            high_strike,
            short_qty,
            short_net_unit,
            smin,
            smax,
        );
    }

    /// Worst-case underlying band for settlement.
    fn resolve_band(&self, index_price: f64) -> (f64, f64) {
        if !self.cfg.use_band_check {
            return (index_price, index_price);
        }
        let (smin, smax) = (self.cfg.smin, self.cfg.smax);
        if smin <= 0.0 || smax <= 0.0 || smax < smin {
            (
                index_price * (1.0 - self.cfg.band_pct),
                index_price * (1.0 + self.cfg.band_pct),
            )
        } else {
            (smin, smax)
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn eval_side(
        &self,
        side: BoxSide,
        legs: &BoxLegs,
        low_strike: f64,
        high_strike: f64,
        qty: f64,
        net_unit: f64,
        smin: f64,
        smax: f64,
    ) {
        let mut qty = qty;
        if self.cfg.max_qty > 0.0 && qty > self.cfg.max_qty {
            qty = self.cfg.max_qty;
        }
        if qty <= 0.0 {
            return;
        }

        // Net outlay in the base coin; PnL(S) = fixed − net_base·S − fees,
        // so the worst underlying is smax when net_base ≥ 0, else smin.
        let net_base = net_unit * qty;
        let s_star = if net_base >= 0.0 { smax } else { smin };

        let fees = self.cfg.fee_per_leg_fixed * 4.0 * qty
            + self.cfg.fee_per_leg_rate * s_star * 4.0 * qty;

        let fixed_usd = match side {
            BoxSide::Long => (high_strike - low_strike) * qty,
            BoxSide::Short => -(high_strike - low_strike) * qty,
        };
        let profit_floor = fixed_usd - net_base * s_star - fees;

        if self.cfg.flatness_max > 0.0 && (net_base.abs() / qty) > self.cfg.flatness_max {
            return;
        }
        if !profit_floor.is_finite() || profit_floor < self.cfg.min_profit_usd {
            return;
        }

        let signal = Signal {
            low_call_idx: legs.low_call,
            low_put_idx: legs.low_put,
            high_call_idx: legs.high_call,
            high_put_idx: legs.high_put,
            low_strike,
            high_strike,
            profit_floor_usd: profit_floor,
            side,
            ts_ns: clock::now_ns(),
        };
        self.sink.try_emit(signal);
    }

    /// Locate the four legs in one registry scan with early exit. First
    /// slot in index order wins on (impossible post-registration)
    /// duplicates.
    fn find_legs(&self, expiry_tag: u16, low_strike: f64, high_strike: f64) -> Option<BoxLegs> {
        let (mut lc, mut lp, mut hc, mut hp) = (-1i16, -1i16, -1i16, -1i16);

        for (i, meta) in self.registry.metas().iter().enumerate() {
            let Some(m) = meta else { continue };
            if m.expiry_tag != expiry_tag {
                continue;
            }
            if m.strike == low_strike {
                if m.is_call {
                    if lc < 0 {
                        lc = i as i16;
                    }
                } else if lp < 0 {
                    lp = i as i16;
                }
            } else if m.strike == high_strike {
                if m.is_call {
                    if hc < 0 {
                        hc = i as i16;
                    }
                } else if hp < 0 {
                    hp = i as i16;
                }
            }
            if lc >= 0 && lp >= 0 && hc >= 0 && hp >= 0 {
                break;
            }
        }

        if lc < 0 || lp < 0 || hc < 0 || hp < 0 {
            return None;
        }
        Some(BoxLegs {
            low_call: lc,
            low_put: lp,
            high_call: hc,
            high_put: hp,
        })
    }
}

#[inline(always)]
fn all_sides_positive(depth: &DepthSnapshot) -> bool {
    depth.bid_price > 0.0 && depth.bid_qty > 0.0 && depth.ask_price > 0.0 && depth.ask_qty > 0.0
}

#[inline(always)]
fn min4(a: f64, b: f64, c: f64, d: f64) -> f64 {
    a.min(b).min(c).min(d)
}
