//! Price tick models.

use serde::{Deserialize, Deserializer};

/// A single price update for one symbol.
///
/// Wire form: `{"s": "AAPL", "t": 1700000000000, "lp": 189.5, "ls": 100}`.
/// Every field but the symbol is optional; a tick is only usable for
/// aggregation when [`Tick::price`] returns a value.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Tick {
    #[serde(rename = "s")]
    pub symbol: String,
    /// Provider timestamp in epoch milliseconds. Fractional values are truncated.
    #[serde(rename = "t", default, deserialize_with = "epoch_millis")]
    pub timestamp: Option<i64>,
    #[serde(rename = "lp", default)]
    pub last_price: Option<f64>,
    #[serde(rename = "ap", default)]
    pub ask_price: Option<f64>,
    #[serde(rename = "bp", default)]
    pub bid_price: Option<f64>,
    #[serde(rename = "ls", default)]
    pub last_size: Option<f64>,
    #[serde(rename = "as", default)]
    pub ask_size: Option<f64>,
    #[serde(rename = "bs", default)]
    pub bid_size: Option<f64>,
}

impl Tick {
    /// Creates a last-trade tick.
    #[must_use]
    pub fn trade(symbol: impl Into<String>, timestamp: i64, price: f64, size: f64) -> Self {
        Self {
            symbol: symbol.into(),
            timestamp: Some(timestamp),
            last_price: Some(price),
            ask_price: None,
            bid_price: None,
            last_size: Some(size),
            ask_size: None,
            bid_size: None,
        }
    }

    /// Best available price: last trade, then ask, then bid.
    pub fn price(&self) -> Option<f64> {
        self.last_price.or(self.ask_price).or(self.bid_price)
    }

    /// Size on the same side as [`Tick::price`].
    pub fn size(&self) -> Option<f64> {
        if self.last_price.is_some() {
            self.last_size
        } else if self.ask_price.is_some() {
            self.ask_size
        } else if self.bid_price.is_some() {
            self.bid_size
        } else {
            None
        }
    }
}

fn epoch_millis<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Millis {
        Int(i64),
        Float(f64),
    }

    Ok(match Option::<Millis>::deserialize(deserializer)? {
        Some(Millis::Int(ms)) => Some(ms),
        // `as` saturates at the i64 bounds.
        Some(Millis::Float(ms)) if ms.is_finite() => Some(ms.trunc() as i64),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_full_tick() {
        let json = r#"{"s":"AAPL","t":1700000000000,"lp":189.5,"ap":189.55,"bp":189.45,"ls":100,"as":20,"bs":30}"#;
        let tick: Tick = serde_json::from_str(json).unwrap();

        assert_eq!(tick.symbol, "AAPL");
        assert_eq!(tick.timestamp, Some(1_700_000_000_000));
        assert_eq!(tick.price(), Some(189.5));
        assert_eq!(tick.size(), Some(100.0));
    }

    #[test]
    fn price_falls_back_to_ask_then_bid() {
        let ask_only: Tick = serde_json::from_str(r#"{"s":"MSFT","ap":410.2,"as":5}"#).unwrap();
        assert_eq!(ask_only.price(), Some(410.2));
        assert_eq!(ask_only.size(), Some(5.0));
        assert_eq!(ask_only.timestamp, None);

        let bid_only: Tick = serde_json::from_str(r#"{"s":"MSFT","bp":409.9}"#).unwrap();
        assert_eq!(bid_only.price(), Some(409.9));
        assert_eq!(bid_only.size(), None);
    }

    #[test]
    fn no_price_fields_means_no_price() {
        let tick: Tick = serde_json::from_str(r#"{"s":"TSLA","t":1}"#).unwrap();
        assert_eq!(tick.price(), None);
        assert_eq!(tick.size(), None);
    }

    #[test]
    fn float_timestamp_is_truncated() {
        let tick: Tick = serde_json::from_str(r#"{"s":"AAPL","t":1.7e12,"lp":1.0}"#).unwrap();
        assert_eq!(tick.timestamp, Some(1_700_000_000_000));

        let tick: Tick =
            serde_json::from_str(r#"{"s":"AAPL","t":1700000000000.9,"lp":1.0}"#).unwrap();
        assert_eq!(tick.timestamp, Some(1_700_000_000_000));
    }

    #[test]
    fn null_or_non_numeric_timestamp() {
        let tick: Tick = serde_json::from_str(r#"{"s":"AAPL","t":null,"lp":1.0}"#).unwrap();
        assert_eq!(tick.timestamp, None);

        assert!(serde_json::from_str::<Tick>(r#"{"s":"AAPL","t":"yesterday","lp":1.0}"#).is_err());
    }
}
