//! Crate-level error types.
//!
//! [`FeedError`] unifies every error source (configuration, WebSocket,
//! JSON, HTTP, protocol) behind a single enum so callers can match on the
//! variant they care about while still using the `?` operator for easy
//! propagation.

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, FeedError>;

/// Top-level error type returned by all public APIs.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Environment configuration is missing or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A WebSocket operation (connect, send, receive) failed.
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    /// JSON serialization or deserialization failed.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A request to the REST backend failed.
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// An I/O operation outside the socket failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// An inbound frame could not be decoded.
    #[error("malformed message: {0}")]
    MalformedMessage(String),

    /// The operation needs a live, authenticated connection.
    #[error("not connected")]
    NotConnected,

    /// The provider answered the login frame with a non-success status.
    #[error("authentication rejected ({status}): {message}")]
    AuthRejected { status: i64, message: String },

    /// Automatic reconnection gave up after the configured number of attempts.
    #[error("reconnect attempts exhausted after {attempts} tries")]
    ReconnectExhausted { attempts: u32 },

    /// The client was disconnected while the operation was pending.
    #[error("client closed")]
    Closed,
}
