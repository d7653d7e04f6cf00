//! OHLC candlestick models.

use serde::{Deserialize, Serialize};

/// A single OHLC bar covering `[start, start + interval)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    #[serde(default)]
    pub symbol: String,
    /// Bucket start in epoch milliseconds.
    #[serde(alias = "time")]
    pub start: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(default)]
    pub volume: f64,
}

impl Candle {
    /// Opens a new candle with every price set to `price`.
    #[must_use]
    pub fn open_at(symbol: impl Into<String>, start: i64, price: f64, volume: f64) -> Self {
        Self {
            symbol: symbol.into(),
            start,
            open: price,
            high: price,
            low: price,
            close: price,
            volume,
        }
    }

    /// Folds one more trade into this candle.
    pub fn update(&mut self, price: f64, volume: f64) {
        self.high = self.high.max(price);
        self.low = self.low.min(price);
        self.close = price;
        self.volume += volume;
    }
}
