//! WebSocket transport for the market data stream.
//!
//! This module is organized by domain:
//! - [`subscription`] - Login and subscribe/unsubscribe frames
//! - [`handler`] - Incoming frame classification
//! - [`connection`] - Session lifecycle: authentication, liveness, reconnects
//!
//! The socket itself is opened through a [`Connector`] so that the session
//! logic can run against an in-memory transport in tests.

mod connection;
mod handler;
mod subscription;

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Sink, Stream, StreamExt};
use tokio_tungstenite::connect_async;
use tracing::info;
use tungstenite::Message;

use crate::Result;

pub(crate) use connection::Session;
pub use handler::{Frame, parse_frame};
pub use subscription::{login, subscribe, subscribe_message, unsubscribe_message};

/// Write half of a market data connection.
pub type WsWriter = Pin<Box<dyn Sink<Message, Error = tungstenite::Error> + Send>>;

/// Read half of a market data connection.
pub type WsReader = Pin<Box<dyn Stream<Item = std::result::Result<Message, tungstenite::Error>> + Send>>;

/// Opens transport connections for a session.
///
/// Called once per connection attempt, including every reconnect.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, url: &str) -> Result<(WsWriter, WsReader)>;
}

/// Production [`Connector`] backed by `tokio-tungstenite`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TungsteniteConnector;

#[async_trait]
impl Connector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<(WsWriter, WsReader)> {
        connect(url).await
    }
}

/// Establishes a WebSocket connection to the given URL.
///
/// # Errors
///
/// Returns a [`FeedError`](crate::FeedError) if the connection or TLS handshake fails.
pub async fn connect(url: &str) -> Result<(WsWriter, WsReader)> {
    let (ws_stream, _) = connect_async(url).await?;
    info!("WebSocket handshake completed");

    let (write, read) = ws_stream.split();
    let write: WsWriter = Box::pin(write);
    let read: WsReader = Box::pin(read);
    Ok((write, read))
}
