//! Tick-to-candle aggregation.
//!
//! Each symbol has at most one open candle. A tick lands in bucket
//! `floor(t / interval) * interval`; a bucket different from the open
//! candle's replaces it outright. There is no separate "candle closed"
//! event: consumers see a new `start` instead.
//!
//! Intervals are owned by the [`SubscriptionRegistry`](crate::registry::SubscriptionRegistry)
//! and passed in with every tick.

use std::collections::HashMap;

use tracing::warn;

use crate::models::{Candle, Tick};

/// Builds fixed-interval OHLC candles from a stream of ticks.
#[derive(Debug, Default, Clone)]
pub struct CandleAggregator {
    open: HashMap<String, Candle>,
}

impl CandleAggregator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Folds `tick` into the open `interval_ms` candle for `symbol` and
    /// returns a snapshot.
    ///
    /// `symbol` must already be normalized. `received_at` (epoch ms) stands
    /// in for ticks without a provider timestamp. A zero interval is
    /// replaced by [`DEFAULT_INTERVAL_MS`](crate::config::DEFAULT_INTERVAL_MS).
    /// Returns `None`, leaving the open candle untouched, for ticks without
    /// any price or with a timestamp whose bucket is out of range.
    pub fn apply(
        &mut self,
        symbol: &str,
        tick: &Tick,
        interval_ms: u64,
        received_at: i64,
    ) -> Option<Candle> {
        let price = tick.price()?;
        let volume = tick.size().unwrap_or(0.0);
        let timestamp = tick.timestamp.unwrap_or(received_at);
        let Some(start) = bucket_start(timestamp, non_zero_interval(interval_ms)) else {
            warn!(symbol, timestamp, interval_ms, "Tick timestamp out of range, dropped");
            return None;
        };

        match self.open.get_mut(symbol) {
            Some(candle) if candle.start == start => {
                candle.update(price, volume);
                Some(candle.clone())
            }
            _ => {
                let candle = Candle::open_at(symbol, start, price, volume);
                self.open.insert(symbol.to_string(), candle.clone());
                Some(candle)
            }
        }
    }

    /// The open candle for `symbol`, if any.
    pub fn current(&self, symbol: &str) -> Option<&Candle> {
        self.open.get(symbol)
    }

    /// Drops the open candle for `symbol`.
    pub fn remove(&mut self, symbol: &str) {
        self.open.remove(symbol);
    }

    pub fn clear(&mut self) {
        self.open.clear();
    }
}

/// Start of the bucket containing `timestamp`, flooring toward negative infinity.
///
/// Returns `None` if the interval is zero or the bucket start does not fit
/// in an `i64`.
pub fn bucket_start(timestamp: i64, interval_ms: u64) -> Option<i64> {
    let interval = i64::try_from(interval_ms).ok().filter(|i| *i > 0)?;
    timestamp.div_euclid(interval).checked_mul(interval)
}

fn non_zero_interval(interval_ms: u64) -> u64 {
    if interval_ms == 0 {
        crate::config::DEFAULT_INTERVAL_MS
    } else {
        interval_ms
    }
}
