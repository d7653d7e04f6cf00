//! Real-time market data client.
//!
//! Maintains one authenticated WebSocket connection per data source,
//! subscribes ticker symbols, builds fixed-interval OHLC candles from the
//! tick stream, fans ticks and candles out to registered callbacks, and
//! reconnects with exponential backoff when the connection drops.

pub mod aggregator;
pub mod client;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod models;
pub mod registry;
pub mod rest;
pub mod websocket;

pub use client::{ConnectionPhase, ConnectionStatus, MarketDataClient};
pub use error::{FeedError, Result};
