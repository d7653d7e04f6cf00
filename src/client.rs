//! Consumer-facing market data client.
//!
//! [`MarketDataClient`] is a cheap, cloneable handle. All clones share one
//! connection, one subscription registry, one candle aggregator and one set
//! of callbacks; construct one client per data source and hand clones to
//! every consumer.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use tungstenite::Message;

use crate::aggregator::CandleAggregator;
use crate::config::ClientConfig;
use crate::dispatch::{CallbackRegistry, CandleCallback, MessageCallback, TickCallback};
use crate::error::FeedError;
use crate::models::{Candle, normalize_symbol, normalize_symbols};
use crate::registry::SubscriptionRegistry;
use crate::websocket::{
    Connector, Session, TungsteniteConnector, subscribe_message, unsubscribe_message,
};
use crate::Result;

/// Where the connection is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    /// Never connected, or reconnect attempts were exhausted.
    Disconnected,
    /// Opening the transport.
    Connecting,
    /// Login sent, waiting for the acknowledgement.
    Authenticating,
    /// Authenticated and streaming.
    Live,
    /// Waiting out the backoff before the next attempt.
    Reconnecting,
    /// Torn down by [`MarketDataClient::disconnect`].
    Closed,
}

/// Snapshot returned by [`MarketDataClient::connection_status`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub is_connected: bool,
    pub phase: ConnectionPhase,
    /// Registered symbols, sorted.
    pub subscriptions: Vec<String>,
    pub reconnect_attempts: u32,
}

/// Mutable state shared between the client handle and its session task.
pub(crate) struct State {
    pub(crate) phase: ConnectionPhase,
    /// Identifies the current session; bumped on every new session and on disconnect.
    pub(crate) generation: u64,
    pub(crate) reconnect_attempts: u32,
    pub(crate) registry: SubscriptionRegistry,
    pub(crate) aggregator: CandleAggregator,
    pub(crate) callbacks: CallbackRegistry,
    /// Present only while the session is live.
    pub(crate) outbound: Option<mpsc::UnboundedSender<Message>>,
    pub(crate) shutdown: Option<oneshot::Sender<()>>,
}

pub(crate) struct Shared {
    pub(crate) config: ClientConfig,
    pub(crate) connector: Arc<dyn Connector>,
    pub(crate) state: Mutex<State>,
    phase_tx: watch::Sender<ConnectionPhase>,
}

impl Shared {
    /// Updates the phase and notifies watchers. Caller holds the state lock.
    pub(crate) fn set_phase(&self, state: &mut State, phase: ConnectionPhase) {
        if state.phase != phase {
            debug!(from = ?state.phase, to = ?phase, "Connection phase changed");
        }
        state.phase = phase;
        self.phase_tx.send_replace(phase);
    }
}

/// Real-time market data client: connection, subscriptions, candles, callbacks.
#[derive(Clone)]
pub struct MarketDataClient {
    shared: Arc<Shared>,
}

impl MarketDataClient {
    /// Creates a client that connects with `tokio-tungstenite`.
    #[must_use]
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, Arc::new(TungsteniteConnector))
    }

    /// Creates a client that opens connections through `connector`.
    #[must_use]
    pub fn with_connector(config: ClientConfig, connector: Arc<dyn Connector>) -> Self {
        let (phase_tx, _) = watch::channel(ConnectionPhase::Disconnected);
        let state = State {
            phase: ConnectionPhase::Disconnected,
            generation: 0,
            reconnect_attempts: 0,
            registry: SubscriptionRegistry::new(),
            aggregator: CandleAggregator::new(),
            callbacks: CallbackRegistry::new(),
            outbound: None,
            shutdown: None,
        };

        Self {
            shared: Arc::new(Shared {
                config,
                connector,
                state: Mutex::new(state),
                phase_tx,
            }),
        }
    }

    /// Connects and authenticates.
    ///
    /// Returns immediately when already live. If another call is already
    /// connecting, waits for that attempt instead of starting a second one.
    /// Otherwise starts a fresh session with the attempt counter reset; a
    /// pending reconnect backoff is abandoned in favor of the new attempt.
    ///
    /// A login acknowledgement that never arrives within the auth timeout
    /// counts as success.
    ///
    /// # Errors
    ///
    /// - the transport error if the socket could not be opened
    /// - [`FeedError::AuthRejected`] if the provider refused the login
    /// - [`FeedError::Closed`] if [`disconnect`](Self::disconnect) ran meanwhile
    ///
    /// In the first two cases a reconnect is already scheduled.
    pub async fn connect(&self) -> Result<()> {
        let outcome = {
            let mut state = self.shared.state.lock();
            match state.phase {
                ConnectionPhase::Live => {
                    debug!("Already connected");
                    return Ok(());
                }
                ConnectionPhase::Connecting | ConnectionPhase::Authenticating => None,
                ConnectionPhase::Disconnected
                | ConnectionPhase::Reconnecting
                | ConnectionPhase::Closed => Some(self.start_session(&mut state)),
            }
        };

        match outcome {
            Some(outcome) => outcome.await.unwrap_or(Err(FeedError::Closed)),
            None => self.wait_for_attempt().await,
        }
    }

    /// Tears the connection down and forgets every subscription, candle and
    /// callback.
    ///
    /// The session is detached before its transport closes, so the close
    /// never triggers a reconnect. Pending heartbeat and backoff timers are
    /// cancelled with it.
    pub fn disconnect(&self) {
        let mut state = self.shared.state.lock();
        state.generation += 1;
        if let Some(shutdown) = state.shutdown.take() {
            let _ = shutdown.send(());
        }
        state.outbound = None;
        state.reconnect_attempts = 0;
        state.registry.clear();
        state.aggregator.clear();
        state.callbacks.clear();
        self.shared.set_phase(&mut state, ConnectionPhase::Closed);
        info!("Disconnected from market data stream");
    }

    /// Subscribes `symbols` at `interval_ms` candles (zero selects the default).
    ///
    /// Symbols are recorded in the registry as soon as the frame is queued;
    /// the protocol has no per-symbol acknowledgement.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::NotConnected`] if the session is not live. Nothing
    /// is queued for later in that case.
    pub fn subscribe<S: AsRef<str>>(&self, symbols: &[S], interval_ms: u64) -> Result<()> {
        let symbols = normalize_symbols(symbols);
        if symbols.is_empty() {
            return Ok(());
        }
        let interval_ms = if interval_ms == 0 {
            self.shared.config.default_interval_ms
        } else {
            interval_ms
        };

        let mut state = self.shared.state.lock();
        let outbound = live_outbound(&state).ok_or_else(|| {
            warn!(?symbols, "Cannot subscribe while not connected");
            FeedError::NotConnected
        })?;
        outbound
            .send(subscribe_message(&symbols)?)
            .map_err(|_| FeedError::NotConnected)?;

        state.registry.insert(&symbols, interval_ms);
        info!(?symbols, interval_ms, "Subscription requested");

        Ok(())
    }

    /// Unsubscribes `symbols` and drops their open candles.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError::NotConnected`] if the session is not live.
    pub fn unsubscribe<S: AsRef<str>>(&self, symbols: &[S]) -> Result<()> {
        let symbols = normalize_symbols(symbols);
        if symbols.is_empty() {
            return Ok(());
        }

        let mut state = self.shared.state.lock();
        let outbound = live_outbound(&state).ok_or_else(|| {
            warn!(?symbols, "Cannot unsubscribe while not connected");
            FeedError::NotConnected
        })?;
        outbound
            .send(unsubscribe_message(&symbols)?)
            .map_err(|_| FeedError::NotConnected)?;

        state.registry.remove(&symbols);
        for symbol in &symbols {
            state.aggregator.remove(symbol);
        }
        info!(?symbols, "Unsubscription requested");

        Ok(())
    }

    /// Registers a callback for every tick of `symbol`.
    pub fn on_tick(&self, symbol: &str, callback: TickCallback) {
        let symbol = normalize_symbol(symbol);
        self.shared.state.lock().callbacks.add_tick(&symbol, callback);
    }

    /// Removes the first registration of `callback` for `symbol`.
    pub fn off_tick(&self, symbol: &str, callback: &TickCallback) {
        let symbol = normalize_symbol(symbol);
        self.shared
            .state
            .lock()
            .callbacks
            .remove_tick(&symbol, callback);
    }

    /// Registers a callback for every candle update of `symbol`.
    pub fn on_candle(&self, symbol: &str, callback: CandleCallback) {
        let symbol = normalize_symbol(symbol);
        self.shared
            .state
            .lock()
            .callbacks
            .add_candle(&symbol, callback);
    }

    /// Removes the first registration of `callback` for `symbol`.
    pub fn off_candle(&self, symbol: &str, callback: &CandleCallback) {
        let symbol = normalize_symbol(symbol);
        self.shared
            .state
            .lock()
            .callbacks
            .remove_candle(&symbol, callback);
    }

    /// Registers a callback for every decoded frame except heartbeats and
    /// login acknowledgements.
    pub fn on_message(&self, callback: MessageCallback) {
        self.shared.state.lock().callbacks.add_message(callback);
    }

    pub fn off_message(&self, callback: &MessageCallback) {
        self.shared.state.lock().callbacks.remove_message(callback);
    }

    /// Current connection state and registered symbols.
    pub fn connection_status(&self) -> ConnectionStatus {
        let state = self.shared.state.lock();
        ConnectionStatus {
            is_connected: state.phase == ConnectionPhase::Live,
            phase: state.phase,
            subscriptions: state.registry.symbols(),
            reconnect_attempts: state.reconnect_attempts,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().phase == ConnectionPhase::Live
    }

    /// Observes phase changes without polling.
    pub fn watch_phase(&self) -> watch::Receiver<ConnectionPhase> {
        self.shared.phase_tx.subscribe()
    }

    /// The open candle for `symbol`, if any.
    pub fn current_candle(&self, symbol: &str) -> Option<Candle> {
        let symbol = normalize_symbol(symbol);
        self.shared.state.lock().aggregator.current(&symbol).cloned()
    }

    /// Starts a new session task, retiring any previous one.
    fn start_session(&self, state: &mut State) -> oneshot::Receiver<Result<()>> {
        state.generation += 1;
        if let Some(previous) = state.shutdown.take() {
            let _ = previous.send(());
        }
        state.outbound = None;
        state.reconnect_attempts = 0;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        state.shutdown = Some(shutdown_tx);
        self.shared.set_phase(state, ConnectionPhase::Connecting);

        let session = Session::new(self.shared.clone(), state.generation, shutdown_rx, outcome_tx);
        tokio::spawn(session.run());

        outcome_rx
    }

    /// Waits for an in-flight connection attempt to settle.
    async fn wait_for_attempt(&self) -> Result<()> {
        let mut phases = self.shared.phase_tx.subscribe();
        let settled = phases
            .wait_for(|phase| {
                !matches!(
                    phase,
                    ConnectionPhase::Connecting | ConnectionPhase::Authenticating
                )
            })
            .await
            .map(|phase| *phase)
            .map_err(|_| FeedError::Closed)?;

        match settled {
            ConnectionPhase::Live => Ok(()),
            ConnectionPhase::Closed => Err(FeedError::Closed),
            ConnectionPhase::Disconnected => Err(FeedError::ReconnectExhausted {
                attempts: self.shared.state.lock().reconnect_attempts,
            }),
            ConnectionPhase::Reconnecting
            | ConnectionPhase::Connecting
            | ConnectionPhase::Authenticating => Err(FeedError::NotConnected),
        }
    }
}

fn live_outbound(state: &State) -> Option<mpsc::UnboundedSender<Message>> {
    if state.phase == ConnectionPhase::Live {
        state.outbound.clone()
    } else {
        None
    }
}
