//! REST backend client for data the stream does not carry.
//!
//! Charts are seeded from historical candles before live ticks arrive, and
//! symbol search backs ticker pickers. Both are plain JSON `GET` endpoints.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::Result;
use crate::error::FeedError;
use crate::models::{Candle, normalize_symbol};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// One result from [`RestClient::search_symbols`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SymbolMatch {
    pub symbol: String,
    pub name: String,
    #[serde(default)]
    pub exchange: Option<String>,
}

/// Typed client for the REST backend.
#[derive(Debug, Clone)]
pub struct RestClient {
    http: Client,
    base_url: String,
}

impl RestClient {
    /// Creates a client for `base_url` (trailing slashes are ignored).
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Http`] if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetches candles for `symbol` in `[from_ms, to_ms]`.
    ///
    /// `GET {base}/stocks/{SYMBOL}/candles?interval=&from=&to=`
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Http`] on transport failures or non-2xx
    /// responses and [`FeedError::Config`] for an empty symbol.
    pub async fn historical_candles(
        &self,
        symbol: &str,
        interval_ms: u64,
        from_ms: i64,
        to_ms: i64,
    ) -> Result<Vec<Candle>> {
        let symbol = normalize_symbol(symbol);
        if symbol.is_empty() {
            return Err(FeedError::Config("symbol must not be empty".to_string()));
        }

        let url = format!("{}/stocks/{}/candles", self.base_url, symbol);
        let response = self
            .http
            .get(&url)
            .query(&[
                ("interval", interval_ms.to_string()),
                ("from", from_ms.to_string()),
                ("to", to_ms.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?;

        let mut candles: Vec<Candle> = response.json().await?;
        for candle in &mut candles {
            candle.symbol.clone_from(&symbol);
        }
        candles.sort_by_key(|c| c.start);
        debug!(symbol = %symbol, count = candles.len(), "Fetched historical candles");

        Ok(candles)
    }

    /// Searches symbols by ticker or company name.
    ///
    /// `GET {base}/stocks/search?q=`
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::Http`] on transport failures or non-2xx responses.
    pub async fn search_symbols(&self, query: &str) -> Result<Vec<SymbolMatch>> {
        let query = query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let url = format!("{}/stocks/search", self.base_url);
        let matches: Vec<SymbolMatch> = self
            .http
            .get(&url)
            .query(&[("q", query)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        debug!(query, count = matches.len(), "Symbol search");

        Ok(matches)
    }
}
