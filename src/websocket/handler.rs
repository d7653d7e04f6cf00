//! Incoming frame classification.
//!
//! Every text frame is decoded into a closed set of variants before any
//! field is read, so unexpected shapes can never reach the aggregator.

use serde_json::Value;

use crate::Result;
use crate::error::FeedError;
use crate::models::{AuthAck, Event, Tick};

/// A decoded inbound frame.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `{"event":"heartbeat"}`
    Heartbeat,
    /// `{"event":"login","status":200,"message":"..."}`
    AuthAck { status: i64, message: String },
    /// A price tick: `s` is a string and `lp` is present.
    Tick { tick: Tick, raw: Value },
    /// Any other JSON object. Only reaches message callbacks.
    Other(Value),
}

impl Frame {
    /// Converts an [`Frame::AuthAck`] into an [`AuthAck`].
    pub fn auth_ack(&self) -> Option<AuthAck> {
        match self {
            Frame::AuthAck { status, message } => Some(AuthAck {
                status: *status,
                message: message.clone(),
            }),
            _ => None,
        }
    }
}

/// Classifies a text frame.
///
/// # Errors
///
/// Returns [`FeedError::MalformedMessage`] if the text is not a JSON object.
pub fn parse_frame(text: &str) -> Result<Frame> {
    let value: Value =
        serde_json::from_str(text).map_err(|e| FeedError::MalformedMessage(e.to_string()))?;

    if !value.is_object() {
        return Err(FeedError::MalformedMessage(format!(
            "expected a JSON object, got: {}",
            truncate(text)
        )));
    }

    let event = value.get("event").and_then(Value::as_str);

    if event == Some(Event::Heartbeat.as_str()) {
        return Ok(Frame::Heartbeat);
    }

    if event == Some(Event::Login.as_str())
        && let Some(status) = value.get("status").and_then(Value::as_i64)
    {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        return Ok(Frame::AuthAck { status, message });
    }

    let is_price_tick = value.get("s").is_some_and(Value::is_string)
        && value.get("lp").is_some_and(|lp| !lp.is_null());

    if is_price_tick {
        return match serde_json::from_value::<Tick>(value.clone()) {
            Ok(tick) => Ok(Frame::Tick { tick, raw: value }),
            Err(_) => Ok(Frame::Other(value)),
        };
    }

    Ok(Frame::Other(value))
}

fn truncate(text: &str) -> &str {
    match text.char_indices().nth(64) {
        Some((index, _)) => &text[..index],
        None => text,
    }
}
