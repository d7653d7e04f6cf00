//! Desired subscription set, replayed after every reconnect.

use std::collections::BTreeMap;

/// Tracks which symbols should be subscribed and at what candle interval.
///
/// This is the only place intervals are kept; the aggregator is handed the
/// interval with every tick.
///
/// Keys are normalized symbols. The registry outlives individual
/// connections: only [`SubscriptionRegistry::clear`] (called from
/// `disconnect`) empties it.
#[derive(Debug, Default, Clone)]
pub struct SubscriptionRegistry {
    intervals: BTreeMap<String, u64>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `symbols` with `interval_ms`, overwriting earlier intervals.
    pub fn insert(&mut self, symbols: &[String], interval_ms: u64) {
        for symbol in symbols {
            self.intervals.insert(symbol.clone(), interval_ms);
        }
    }

    /// Forgets `symbols`. Unknown symbols are ignored.
    pub fn remove(&mut self, symbols: &[String]) {
        for symbol in symbols {
            self.intervals.remove(symbol);
        }
    }

    /// Candle interval for a registered symbol; `None` means not subscribed.
    pub fn interval(&self, symbol: &str) -> Option<u64> {
        self.intervals.get(symbol).copied()
    }

    /// Every registered symbol, sorted.
    pub fn symbols(&self) -> Vec<String> {
        self.intervals.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn clear(&mut self) {
        self.intervals.clear();
    }
}
