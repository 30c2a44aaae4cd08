//! Universe selection
//!
//! Builds the frozen option universe once at start-up: one near and one far
//! expiry within a configurable window, ATM ±20% strikes around the spot
//! index, balanced calls/puts, capped at the book capacity. The selection
//! itself is a pure function over the discovered instrument list so it can
//! be tested without the network; `discovery` owns the one-shot REST calls.

pub mod discovery;

use thiserror::Error;

use crate::core::book::MAX_OPTIONS;

const MS_PER_DAY: i64 = 24 * 60 * 60 * 1000;

/// Fraction of the spot price an eligible strike may deviate by
const ATM_BAND: f64 = 0.20;

/// One instrument as reported by discovery
#[derive(Debug, Clone)]
pub struct Instrument {
    pub name: String,
    pub is_active: bool,
    pub expiration_ms: i64,
}

/// Frozen symbol universe plus the two selected expiry labels
#[derive(Debug, Clone, PartialEq)]
pub struct Universe {
    pub symbols: Vec<String>,
    pub near_label: String,
    pub far_label: String,
}

#[derive(Debug, Error, PartialEq)]
pub enum UniverseError {
    #[error("no active instruments")]
    NoActiveInstruments,

    #[error("no future expiries within {0} days")]
    NoExpiriesInWindow(u32),
}

/// Select the trading universe.
///
/// Deterministic given its inputs. `now_ms` is wall-clock milliseconds; the
/// caller supplies it so tests can pin time.
pub fn build_universe(
    instruments: &[Instrument],
    spot: f64,
    now_ms: i64,
    window_days: u32,
) -> Result<Universe, UniverseError> {
    let active: Vec<&Instrument> = instruments
        .iter()
        .filter(|inst| inst.is_active && inst.expiration_ms > now_ms)
        .collect();
    if active.is_empty() {
        return Err(UniverseError::NoActiveInstruments);
    }

    let limit_ms = now_ms + window_days as i64 * MS_PER_DAY;

    // Distinct expiries inside the window, keyed by label
    let mut expiries: Vec<(String, i64)> = Vec::new();
    for inst in &active {
        if inst.expiration_ms > limit_ms {
            continue;
        }
        let Some(label) = expiry_label(&inst.name) else {
            continue;
        };
        if expiries.iter().any(|(l, _)| l == label) {
            continue;
        }
        expiries.push((label.to_string(), inst.expiration_ms));
    }
    if expiries.is_empty() {
        return Err(UniverseError::NoExpiriesInWindow(window_days));
    }
    expiries.sort_by_key(|&(_, ms)| ms);

    let (near_label, near_ms) = expiries[0].clone();
    let (far_label, far_ms) = expiries[expiries.len() - 1].clone();

    // Per-expiry cap: the book capacity split 1:1 between near and far
    let per_cap = MAX_OPTIONS / 2;
    let near_syms = select_atm_balanced(&active, near_ms, spot, per_cap);
    let far_syms = select_atm_balanced(&active, far_ms, spot, per_cap);

    // near == far collapses to one expiry; dedup preserves order
    let mut symbols: Vec<String> = Vec::with_capacity(MAX_OPTIONS);
    for sym in near_syms.into_iter().chain(far_syms) {
        if symbols.contains(&sym) {
            continue;
        }
        symbols.push(sym);
        if symbols.len() >= MAX_OPTIONS {
            break;
        }
    }

    tracing::info!(
        near = %near_label,
        far = %far_label,
        count = symbols.len(),
        "universe selected within {window_days}d window, ATM ±{:.0}%",
        ATM_BAND * 100.0
    );

    Ok(Universe {
        symbols,
        near_label,
        far_label,
    })
}

/// Strikes within ATM ±20% of `spot` for one expiry, nearest-to-ATM first,
/// balanced between calls and puts, at most `cap` entries.
fn select_atm_balanced(
    instruments: &[&Instrument],
    expiration_ms: i64,
    spot: f64,
    cap: usize,
) -> Vec<String> {
    struct Candidate<'a> {
        name: &'a str,
        distance: f64,
        is_call: bool,
    }

    let mut list: Vec<Candidate> = Vec::new();
    for inst in instruments {
        if inst.expiration_ms != expiration_ms {
            continue;
        }
        let Some((strike, is_call)) = strike_and_side(&inst.name) else {
            continue;
        };
        let distance = (strike - spot).abs();
        if distance > spot * ATM_BAND {
            continue;
        }
        list.push(Candidate {
            name: &inst.name,
            distance,
            is_call,
        });
    }
    list.sort_by(|a, b| a.distance.total_cmp(&b.distance));

    let call_cap = cap / 2;
    let put_cap = cap / 2;
    let (mut calls, mut puts) = (0usize, 0usize);
    let mut out = Vec::with_capacity(cap);
    for c in &list {
        if c.is_call && calls < call_cap {
            out.push(c.name.to_string());
            calls += 1;
        } else if !c.is_call && puts < put_cap {
            out.push(c.name.to_string());
            puts += 1;
        }
        if out.len() >= cap {
            break;
        }
    }
    out
}

fn expiry_label(name: &str) -> Option<&str> {
    name.split('-').nth(1)
}

fn strike_and_side(name: &str) -> Option<(f64, bool)> {
    let mut parts = name.split('-').skip(2);
    let strike: f64 = parts.next()?.parse().ok()?;
    let is_call = match parts.next()? {
        "C" => true,
        "P" => false,
        _ => return None,
    };
    Some((strike, is_call))
}
