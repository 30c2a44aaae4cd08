//! Symbol registry
//!
//! Maps option symbols to dense slot indices and parses each symbol into
//! `(strike, expiry_tag, is_call)` once at registration, so the hot path
//! never touches strings. Expiry labels are interned to dense `u16` tags.
//!
//! Symbols use the canonical form `<UNDERLYING>-<EXPIRY>-<STRIKE>-<C|P>`,
//! e.g. `BTC-10AUG25-115000-C`. A symbol that fails to parse keeps its book
//! slot (quotes are still stored) but carries no metadata and no pair
//! entries, which excludes it from detection.

use std::collections::HashMap;

use crate::core::book::MAX_OPTIONS;

/// Maximum number of distinct expiry labels
pub const MAX_EXPIRY_TAGS: usize = 16;

/// Parsed per-option metadata
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionMeta {
    pub strike: f64,
    pub expiry_tag: u16,
    pub is_call: bool,
}

/// Immutable after registration: built once at start-up, then shared
/// read-only with the feed adapter and the detector.
pub struct SymbolRegistry {
    names: Vec<String>,
    index: HashMap<String, i16>,
    meta: Vec<Option<OptionMeta>>,
    expiry_labels: Vec<String>,
    pair: Box<[[bool; MAX_OPTIONS]; MAX_OPTIONS]>,
}

impl SymbolRegistry {
    /// Register a symbol universe, silently truncating to capacity.
    pub fn register<S: AsRef<str>>(symbols: &[S]) -> Self {
        let count = symbols.len().min(MAX_OPTIONS);

        let mut names = Vec::with_capacity(count);
        let mut index = HashMap::with_capacity(count);
        let mut meta = Vec::with_capacity(count);
        let mut expiry_labels: Vec<String> = Vec::new();

        for (i, symbol) in symbols.iter().take(count).enumerate() {
            let name = symbol.as_ref().to_string();
            let parsed = parse_symbol(&name).and_then(|(label, strike, is_call)| {
                let tag = match expiry_labels.iter().position(|l| l == label) {
                    Some(pos) => pos as u16,
                    None => {
                        if expiry_labels.len() >= MAX_EXPIRY_TAGS {
                            tracing::warn!(symbol = %name, "expiry tag table full, symbol excluded");
                            return None;
                        }
                        expiry_labels.push(label.to_string());
                        (expiry_labels.len() - 1) as u16
                    }
                };
                Some(OptionMeta {
                    strike,
                    expiry_tag: tag,
                    is_call,
                })
            });
            if parsed.is_none() {
                tracing::warn!(symbol = %name, "unparsable symbol, excluded from detection");
            }

            index.insert(name.clone(), i as i16);
            names.push(name);
            meta.push(parsed);
        }

        let pair = build_pair_lookup(&meta);

        Self {
            names,
            index,
            meta,
            expiry_labels,
            pair,
        }
    }

    #[inline]
    pub fn index_of(&self, symbol: &str) -> Option<i16> {
        self.index.get(symbol).copied()
    }

    #[inline]
    pub fn name_of(&self, idx: i16) -> &str {
        self.names
            .get(idx as usize)
            .map(String::as_str)
            .unwrap_or("")
    }

    #[inline]
    pub fn count(&self) -> i32 {
        self.names.len() as i32
    }

    #[inline]
    pub fn meta(&self, idx: i16) -> Option<OptionMeta> {
        self.meta.get(idx as usize).copied().flatten()
    }

    /// Full metadata table, indexed by slot. Used by the detector's leg scan.
    #[inline]
    pub fn metas(&self) -> &[Option<OptionMeta>] {
        &self.meta
    }

    /// True iff slots `i` and `j` share an expiry tag and have distinct
    /// strikes. Symmetric; diagonal is false.
    #[inline(always)]
    pub fn pair(&self, i: usize, j: usize) -> bool {
        i < MAX_OPTIONS && j < MAX_OPTIONS && self.pair[i][j]
    }

    pub fn expiry_label(&self, tag: u16) -> &str {
        self.expiry_labels
            .get(tag as usize)
            .map(String::as_str)
            .unwrap_or("")
    }
}

/// Split `BTC-10AUG25-115000-C` into (expiry label, strike, is_call).
fn parse_symbol(name: &str) -> Option<(&str, f64, bool)> {
    let mut parts = name.split('-');
    let _underlying = parts.next()?;
    let expiry = parts.next()?;
    let strike: f64 = parts.next()?.parse().ok()?;
    let side = parts.next()?;
    if parts.next().is_some() {
        return None;
    }
    if !strike.is_finite() || strike <= 0.0 {
        return None;
    }
    let is_call = match side {
        "C" => true,
        "P" => false,
        _ => return None,
    };
    Some((expiry, strike, is_call))
}

fn build_pair_lookup(meta: &[Option<OptionMeta>]) -> Box<[[bool; MAX_OPTIONS]; MAX_OPTIONS]> {
    let mut pair = Box::new([[false; MAX_OPTIONS]; MAX_OPTIONS]);
    for i in 0..meta.len() {
        let Some(mi) = meta[i] else { continue };
        for j in (i + 1)..meta.len() {
            let Some(mj) = meta[j] else { continue };
            if mi.expiry_tag == mj.expiry_tag && mi.strike != mj.strike {
                pair[i][j] = true;
                pair[j][i] = true;
            }
        }
    }
    pair
}
