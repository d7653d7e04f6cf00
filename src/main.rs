use std::sync::Arc;

use marketfeed::config::fetch_config;
use marketfeed::models::Candle;
use marketfeed::{FeedError, MarketDataClient};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), FeedError> {
    // Initialize tracing subscriber for logging output.
    tracing_subscriber::fmt::init();

    let app_config = fetch_config()?;

    let mut symbols: Vec<String> = std::env::args().skip(1).collect();
    if symbols.is_empty() {
        symbols.push("AAPL".to_string());
    }
    let interval_ms = app_config.feed.default_interval_ms;

    let client = MarketDataClient::new(app_config.feed);
    for symbol in &symbols {
        client.on_candle(
            symbol,
            Arc::new(|candle: &Candle| {
                info!(
                    symbol = %candle.symbol,
                    start = candle.start,
                    open = candle.open,
                    high = candle.high,
                    low = candle.low,
                    close = candle.close,
                    volume = candle.volume,
                    "Candle update"
                );
            }),
        );
    }

    client.connect().await?;
    client.subscribe(&symbols, interval_ms)?;

    tokio::signal::ctrl_c().await?;

    let status = client.connection_status();
    info!(
        subscriptions = ?status.subscriptions,
        reconnect_attempts = status.reconnect_attempts,
        "Shutting down"
    );
    client.disconnect();

    Ok(())
}
