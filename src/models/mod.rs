//! Wire models for the streaming protocol.
//!
//! Outbound frames are `{"event": ..., "data": {...}}` objects; inbound
//! frames are classified by [`crate::websocket::parse_frame`].

pub mod candle;
pub mod tick;

use serde::{Deserialize, Serialize};

pub use candle::Candle;
pub use tick::Tick;

/// Status code the provider uses for a successful login.
pub const AUTH_SUCCESS_STATUS: i64 = 200;

/// Protocol event names.
pub enum Event {
    Login,
    Subscribe,
    Unsubscribe,
    Heartbeat,
}

impl Event {
    /// Returns the wire-format event name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::Login => "login",
            Event::Subscribe => "subscribe",
            Event::Unsubscribe => "unsubscribe",
            Event::Heartbeat => "heartbeat",
        }
    }
}

/// A `login` request carrying the API key.
#[derive(Serialize)]
pub struct LoginRequest {
    pub event: &'static str,
    pub data: LoginParams,
}

#[derive(Serialize)]
pub struct LoginParams {
    #[serde(rename = "apiKey")]
    pub api_key: String,
}

impl LoginRequest {
    #[must_use]
    pub fn new(api_key: &str) -> Self {
        Self {
            event: Event::Login.as_str(),
            data: LoginParams {
                api_key: api_key.to_string(),
            },
        }
    }
}

/// One symbol is sent as a bare string, several as an array.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Tickers {
    One(String),
    Many(Vec<String>),
}

/// Ticker parameters used in subscribe/unsubscribe requests.
#[derive(Serialize)]
pub struct TickerParams {
    pub ticker: Tickers,
}

/// A `subscribe` request.
#[derive(Serialize)]
pub struct SubscribeRequest {
    pub event: &'static str,
    pub data: TickerParams,
}

impl SubscribeRequest {
    #[must_use]
    pub fn new(symbols: &[String]) -> Self {
        let ticker = match symbols {
            [single] => Tickers::One(single.clone()),
            many => Tickers::Many(many.to_vec()),
        };
        Self {
            event: Event::Subscribe.as_str(),
            data: TickerParams { ticker },
        }
    }
}

/// An `unsubscribe` request. Always carries an array.
#[derive(Serialize)]
pub struct UnsubscribeRequest {
    pub event: &'static str,
    pub data: TickerParams,
}

impl UnsubscribeRequest {
    #[must_use]
    pub fn new(symbols: &[String]) -> Self {
        Self {
            event: Event::Unsubscribe.as_str(),
            data: TickerParams {
                ticker: Tickers::Many(symbols.to_vec()),
            },
        }
    }
}

/// Provider response to a [`LoginRequest`].
#[derive(Debug, Clone, Deserialize)]
pub struct AuthAck {
    pub status: i64,
    #[serde(default)]
    pub message: String,
}

impl AuthAck {
    pub fn is_success(&self) -> bool {
        self.status == AUTH_SUCCESS_STATUS
    }
}

/// Normalizes a symbol for lookups: trimmed and upper-cased.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Normalizes a batch of symbols, dropping empties and duplicates while
/// preserving first-seen order.
pub fn normalize_symbols<S: AsRef<str>>(symbols: &[S]) -> Vec<String> {
    let mut normalized: Vec<String> = Vec::with_capacity(symbols.len());
    for symbol in symbols {
        let symbol = normalize_symbol(symbol.as_ref());
        if !symbol.is_empty() && !normalized.contains(&symbol) {
            normalized.push(symbol);
        }
    }
    normalized
}
