//! Per-symbol callback fan-out.
//!
//! Callbacks are shared `Arc<dyn Fn>` values so that removal can match on
//! identity: two registrations of the same `Arc` are two entries, and
//! `off_*` removes the first one. Dispatch always iterates over a snapshot,
//! so callbacks may register or remove callbacks while being invoked.

use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{Candle, Tick};

/// Receives every decoded tick for one symbol.
pub type TickCallback = Arc<dyn Fn(&Tick) + Send + Sync>;

/// Receives a snapshot of the open candle after every tick.
pub type CandleCallback = Arc<dyn Fn(&Candle) + Send + Sync>;

/// Receives every inbound frame other than heartbeats and login acks.
pub type MessageCallback = Arc<dyn Fn(&serde_json::Value) + Send + Sync>;

/// Ordered callback lists keyed by normalized symbol.
#[derive(Default, Clone)]
pub struct CallbackRegistry {
    tick: HashMap<String, Vec<TickCallback>>,
    candle: HashMap<String, Vec<CandleCallback>>,
    message: Vec<MessageCallback>,
}

impl CallbackRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_tick(&mut self, symbol: &str, callback: TickCallback) {
        self.tick.entry(symbol.to_string()).or_default().push(callback);
    }

    pub fn remove_tick(&mut self, symbol: &str, callback: &TickCallback) {
        remove_keyed(&mut self.tick, symbol, callback);
    }

    pub fn add_candle(&mut self, symbol: &str, callback: CandleCallback) {
        self.candle
            .entry(symbol.to_string())
            .or_default()
            .push(callback);
    }

    pub fn remove_candle(&mut self, symbol: &str, callback: &CandleCallback) {
        remove_keyed(&mut self.candle, symbol, callback);
    }

    pub fn add_message(&mut self, callback: MessageCallback) {
        self.message.push(callback);
    }

    pub fn remove_message(&mut self, callback: &MessageCallback) {
        remove_first(&mut self.message, callback);
    }

    /// Tick callbacks for `symbol` in registration order.
    pub fn tick_snapshot(&self, symbol: &str) -> Vec<TickCallback> {
        self.tick.get(symbol).cloned().unwrap_or_default()
    }

    /// Candle callbacks for `symbol` in registration order.
    pub fn candle_snapshot(&self, symbol: &str) -> Vec<CandleCallback> {
        self.candle.get(symbol).cloned().unwrap_or_default()
    }

    pub fn message_snapshot(&self) -> Vec<MessageCallback> {
        self.message.clone()
    }

    pub fn clear(&mut self) {
        self.tick.clear();
        self.candle.clear();
        self.message.clear();
    }
}

/// Invokes each callback in order with `value`.
pub fn dispatch<T: ?Sized>(callbacks: &[Arc<dyn Fn(&T) + Send + Sync>], value: &T) {
    for callback in callbacks {
        callback(value);
    }
}

fn remove_keyed<T: ?Sized>(map: &mut HashMap<String, Vec<Arc<T>>>, symbol: &str, target: &Arc<T>) {
    if let Some(list) = map.get_mut(symbol) {
        remove_first(list, target);
        if list.is_empty() {
            map.remove(symbol);
        }
    }
}

fn remove_first<T: ?Sized>(list: &mut Vec<Arc<T>>, target: &Arc<T>) {
    if let Some(index) = list.iter().position(|cb| Arc::ptr_eq(cb, target)) {
        list.remove(index);
    }
}
