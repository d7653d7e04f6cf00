//! WebSocket session lifecycle.
//!
//! A [`Session`] is one spawned task that owns the socket halves, the
//! heartbeat deadline and the reconnect backoff. It connects, logs in,
//! replays the subscription registry, then reads frames until the
//! connection drops, at which point it backs off and tries again. It stops
//! when the client disconnects, when a newer session replaces it, or when
//! the reconnect budget runs out.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{Instant, sleep};
use tracing::{debug, error, info, warn};
use tungstenite::Message;

use super::{Frame, WsReader, WsWriter, login, parse_frame, subscribe};
use crate::Result;
use crate::client::{ConnectionPhase, Shared};
use crate::dispatch::dispatch;
use crate::error::FeedError;
use crate::models::{AuthAck, Tick, normalize_symbol};

/// How one connection attempt ended.
enum SessionEnd {
    /// Connection lost; the session should back off and retry.
    Dropped,
    /// Disconnected or superseded; the session must stop.
    Shutdown,
}

/// Outcome of waiting for the login acknowledgement.
enum AuthOutcome {
    Accepted,
    /// No acknowledgement in time; treated as accepted.
    TimedOut,
    Rejected(AuthAck),
    Closed,
    Shutdown,
}

/// Why the reader loop exited.
enum DisconnectReason {
    ConnectionLost,
    HeartbeatTimeout,
    AuthRejected,
    Shutdown,
}

/// A running connection session. See the module docs.
pub(crate) struct Session {
    shared: Arc<Shared>,
    generation: u64,
    shutdown: oneshot::Receiver<()>,
    /// Resolves the `connect()` call that started this session.
    outcome: Option<oneshot::Sender<Result<()>>>,
}

impl Session {
    pub(crate) fn new(
        shared: Arc<Shared>,
        generation: u64,
        shutdown: oneshot::Receiver<()>,
        outcome: oneshot::Sender<Result<()>>,
    ) -> Self {
        Self {
            shared,
            generation,
            shutdown,
            outcome: Some(outcome),
        }
    }

    /// Runs connection attempts until shutdown or the reconnect budget is spent.
    pub(crate) async fn run(mut self) {
        loop {
            match self.connect_once().await {
                SessionEnd::Shutdown => {
                    debug!(generation = self.generation, "Session stopped");
                    return;
                }
                SessionEnd::Dropped => {}
            }

            if !self.back_off().await {
                return;
            }
        }
    }

    /// One connect, login, replay and read cycle.
    async fn connect_once(&mut self) -> SessionEnd {
        if !self.set_phase(ConnectionPhase::Connecting) {
            return SessionEnd::Shutdown;
        }

        let url = self.shared.config.websocket_url.clone();
        info!(url = %url, "Connecting to market data stream");
        let connector = self.shared.connector.clone();
        let connected = tokio::select! {
            result = connector.connect(&url) => result,
            _ = &mut self.shutdown => return SessionEnd::Shutdown,
        };
        let (mut write, mut read) = match connected {
            Ok(pair) => pair,
            Err(e) => {
                error!("Connection failed: {e}");
                self.report(Err(e));
                return SessionEnd::Dropped;
            }
        };

        if !self.set_phase(ConnectionPhase::Authenticating) {
            let _ = write.close().await;
            return SessionEnd::Shutdown;
        }
        if let Err(e) = login(&mut write, &self.shared.config.api_key).await {
            warn!("Login request failed: {e}");
            self.report(Err(e));
            return SessionEnd::Dropped;
        }

        match self.await_auth(&mut read).await {
            AuthOutcome::Accepted => info!("Login acknowledged"),
            AuthOutcome::TimedOut => {
                info!(
                    timeout_ms = millis(self.shared.config.auth_timeout),
                    "No login acknowledgement, assuming authenticated"
                );
            }
            AuthOutcome::Rejected(ack) => {
                error!(status = ack.status, message = %ack.message, "Authentication rejected");
                self.report(Err(FeedError::AuthRejected {
                    status: ack.status,
                    message: ack.message,
                }));
                let _ = write.close().await;
                return SessionEnd::Dropped;
            }
            AuthOutcome::Closed => {
                warn!("Connection closed during authentication");
                self.report(Err(FeedError::NotConnected));
                return SessionEnd::Dropped;
            }
            AuthOutcome::Shutdown => {
                let _ = write.close().await;
                return SessionEnd::Shutdown;
            }
        }

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let symbols = {
            let mut state = self.shared.state.lock();
            if state.generation == self.generation {
                state.reconnect_attempts = 0;
                state.outbound = Some(outbound_tx);
                self.shared.set_phase(&mut state, ConnectionPhase::Live);
                Some(state.registry.symbols())
            } else {
                None
            }
        };
        let Some(symbols) = symbols else {
            let _ = write.close().await;
            return SessionEnd::Shutdown;
        };

        if !symbols.is_empty() {
            if let Err(e) = subscribe(&mut write, &symbols).await {
                warn!("Subscription replay failed: {e}");
                self.detach_outbound();
                self.report(Err(e));
                return SessionEnd::Dropped;
            }
            info!(count = symbols.len(), "Replayed subscriptions");
        }
        self.report(Ok(()));

        let reason = self.read_loop(&mut write, &mut read, outbound_rx).await;
        self.detach_outbound();

        match reason {
            DisconnectReason::Shutdown => {
                let _ = write.close().await;
                SessionEnd::Shutdown
            }
            DisconnectReason::HeartbeatTimeout | DisconnectReason::AuthRejected => {
                let _ = write.close().await;
                SessionEnd::Dropped
            }
            DisconnectReason::ConnectionLost => SessionEnd::Dropped,
        }
    }

    /// Waits for the login acknowledgement, bounded by the auth timeout.
    ///
    /// Other frames arriving meanwhile are handled normally.
    async fn await_auth(&mut self, read: &mut WsReader) -> AuthOutcome {
        let deadline = sleep(self.shared.config.auth_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                () = &mut deadline => return AuthOutcome::TimedOut,
                _ = &mut self.shutdown => return AuthOutcome::Shutdown,
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                        Ok(frame) => {
                            if let Some(ack) = frame.auth_ack() {
                                return if ack.is_success() {
                                    AuthOutcome::Accepted
                                } else {
                                    AuthOutcome::Rejected(ack)
                                };
                            }
                            if !self.handle_frame(frame) {
                                return AuthOutcome::Shutdown;
                            }
                        }
                        Err(e) => warn!("Dropping malformed frame: {e}"),
                    },
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "Close frame during authentication");
                        return AuthOutcome::Closed;
                    }
                    Some(Ok(_)) => {} // Binary/Ping/Pong frames
                    Some(Err(e)) => {
                        warn!("WebSocket error: {e}");
                        return AuthOutcome::Closed;
                    }
                    None => return AuthOutcome::Closed,
                },
            }
        }
    }

    /// Reads frames and forwards outbound requests until the connection ends.
    async fn read_loop(
        &mut self,
        write: &mut WsWriter,
        read: &mut WsReader,
        mut outbound: mpsc::UnboundedReceiver<Message>,
    ) -> DisconnectReason {
        let heartbeat_timeout = self.shared.config.heartbeat_timeout;
        let heartbeat = sleep(heartbeat_timeout);
        tokio::pin!(heartbeat);

        loop {
            tokio::select! {
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => match parse_frame(&text) {
                            Ok(Frame::Heartbeat) => {
                                debug!("Received heartbeat");
                                heartbeat.as_mut().reset(Instant::now() + heartbeat_timeout);
                            }
                            Ok(Frame::AuthAck { status, message }) => {
                                if status == crate::models::AUTH_SUCCESS_STATUS {
                                    debug!("Late login acknowledgement");
                                } else {
                                    error!(status, message = %message, "Authentication rejected");
                                    return DisconnectReason::AuthRejected;
                                }
                            }
                            Ok(frame) => {
                                if !self.handle_frame(frame) {
                                    return DisconnectReason::Shutdown;
                                }
                            }
                            Err(e) => warn!("Dropping malformed frame: {e}"),
                        },
                        Some(Ok(Message::Close(frame))) => {
                            warn!(?frame, "Server closed the connection");
                            return DisconnectReason::ConnectionLost;
                        }
                        Some(Ok(_)) => {} // Binary/Ping/Pong frames
                        Some(Err(e)) => {
                            warn!("WebSocket error: {e}");
                            return DisconnectReason::ConnectionLost;
                        }
                        None => {
                            warn!("WebSocket stream ended");
                            return DisconnectReason::ConnectionLost;
                        }
                    }
                }

                request = outbound.recv() => {
                    match request {
                        Some(message) => {
                            if let Err(e) = write.send(message).await {
                                warn!("Failed to send request: {e}");
                                return DisconnectReason::ConnectionLost;
                            }
                        }
                        // The client dropped the sender: disconnected or superseded.
                        None => return DisconnectReason::Shutdown,
                    }
                }

                () = &mut heartbeat => {
                    warn!(
                        timeout_ms = millis(heartbeat_timeout),
                        "No heartbeat received, treating connection as dead"
                    );
                    return DisconnectReason::HeartbeatTimeout;
                }

                _ = &mut self.shutdown => return DisconnectReason::Shutdown,
            }
        }
    }

    /// Routes a tick or other frame to the aggregator and callbacks.
    ///
    /// Returns `false` if this session has been superseded, in which case
    /// nothing is dispatched.
    fn handle_frame(&self, frame: Frame) -> bool {
        match frame {
            Frame::Tick { tick, raw } => self.handle_tick(tick, &raw),
            Frame::Other(raw) => {
                let callbacks = {
                    let state = self.shared.state.lock();
                    if state.generation != self.generation {
                        return false;
                    }
                    state.callbacks.message_snapshot()
                };
                dispatch(&callbacks, &raw);
                true
            }
            Frame::Heartbeat | Frame::AuthAck { .. } => true,
        }
    }

    fn handle_tick(&self, mut tick: Tick, raw: &Value) -> bool {
        let symbol = normalize_symbol(&tick.symbol);
        tick.symbol.clone_from(&symbol);

        let (message_callbacks, tick_callbacks, candle_update) = {
            let mut state = self.shared.state.lock();
            if state.generation != self.generation {
                return false;
            }

            let candle = if let Some(interval_ms) = state.registry.interval(&symbol) {
                state.aggregator.apply(&symbol, &tick, interval_ms, now_millis())
            } else {
                debug!(symbol = %symbol, "Tick for unsubscribed symbol, not aggregated");
                None
            };
            let candle_update = candle.map(|candle| (state.callbacks.candle_snapshot(&symbol), candle));

            (
                state.callbacks.message_snapshot(),
                state.callbacks.tick_snapshot(&symbol),
                candle_update,
            )
        };

        dispatch(&message_callbacks, raw);
        dispatch(&tick_callbacks, &tick);
        if let Some((candle_callbacks, candle)) = candle_update {
            dispatch(&candle_callbacks, &candle);
        }

        true
    }

    /// Counts the next attempt and sleeps its backoff.
    ///
    /// Returns `false` when the session must stop: superseded, disconnected,
    /// or out of attempts.
    async fn back_off(&mut self) -> bool {
        let max_attempts = self.shared.config.max_reconnect_attempts;
        let attempt = {
            let mut state = self.shared.state.lock();
            if state.generation != self.generation {
                return false;
            }
            state.outbound = None;

            let attempt = state.reconnect_attempts + 1;
            if attempt > max_attempts {
                error!(
                    attempts = state.reconnect_attempts,
                    "Reconnect attempts exhausted, giving up until the next connect()"
                );
                state.shutdown = None;
                self.shared
                    .set_phase(&mut state, ConnectionPhase::Disconnected);
                drop(state);
                self.report(Err(FeedError::ReconnectExhausted {
                    attempts: max_attempts,
                }));
                return false;
            }

            state.reconnect_attempts = attempt;
            self.shared
                .set_phase(&mut state, ConnectionPhase::Reconnecting);
            attempt
        };

        let delay = self.shared.config.backoff_delay(attempt);
        info!(attempt, delay_ms = millis(delay), "Scheduling reconnect");

        tokio::select! {
            () = sleep(delay) => true,
            _ = &mut self.shutdown => false,
        }
    }

    /// Sets the phase if this session is still current.
    fn set_phase(&self, phase: ConnectionPhase) -> bool {
        let mut state = self.shared.state.lock();
        if state.generation != self.generation {
            return false;
        }
        self.shared.set_phase(&mut state, phase);
        true
    }

    fn detach_outbound(&self) {
        let mut state = self.shared.state.lock();
        if state.generation == self.generation {
            state.outbound = None;
        }
    }

    /// Resolves the pending `connect()` call, if any.
    fn report(&mut self, outcome: Result<()>) {
        if let Some(tx) = self.outcome.take() {
            let _ = tx.send(outcome);
        }
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
        .unwrap_or_default()
}

fn millis(duration: std::time::Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
