//! Login and subscription frames.

use futures_util::SinkExt;
use tracing::{debug, info};
use tungstenite::Message;

use super::WsWriter;
use crate::Result;
use crate::models::{LoginRequest, SubscribeRequest, UnsubscribeRequest};

/// Sends the login frame carrying `api_key`.
///
/// # Errors
///
/// Returns a [`FeedError`](crate::FeedError) if sending the message fails.
pub async fn login(write: &mut WsWriter, api_key: &str) -> Result<()> {
    let json = serde_json::to_string(&LoginRequest::new(api_key))?;
    write.send(Message::Text(json.into())).await?;
    info!("Sent login request");

    Ok(())
}

/// Builds a subscribe frame for already-normalized `symbols`.
///
/// # Errors
///
/// Returns a [`FeedError`](crate::FeedError) if serialization fails.
pub fn subscribe_message(symbols: &[String]) -> Result<Message> {
    let json = serde_json::to_string(&SubscribeRequest::new(symbols))?;
    debug!("Built subscribe request: {}", json);
    Ok(Message::Text(json.into()))
}

/// Builds an unsubscribe frame for already-normalized `symbols`.
///
/// # Errors
///
/// Returns a [`FeedError`](crate::FeedError) if serialization fails.
pub fn unsubscribe_message(symbols: &[String]) -> Result<Message> {
    let json = serde_json::to_string(&UnsubscribeRequest::new(symbols))?;
    debug!("Built unsubscribe request: {}", json);
    Ok(Message::Text(json.into()))
}

/// Subscribes to `symbols` directly on the writer.
///
/// # Errors
///
/// Returns a [`FeedError`](crate::FeedError) if sending the subscription message fails.
pub async fn subscribe(write: &mut WsWriter, symbols: &[String]) -> Result<()> {
    write.send(subscribe_message(symbols)?).await?;
    info!(?symbols, "Subscribed to symbols");

    Ok(())
}
