//! Shared test utilities: an in-memory transport for `MarketDataClient`.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{sink, stream};
use marketfeed::config::ClientConfig;
use marketfeed::websocket::{Connector, WsReader, WsWriter};
use marketfeed::{FeedError, MarketDataClient};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tungstenite::Message;

pub const TEST_URL: &str = "ws://mock.invalid/stream";
pub const TEST_API_KEY: &str = "test-api-key";

/// Client config with default tunables pointing at the mock.
pub fn test_config() -> ClientConfig {
    ClientConfig::new(TEST_URL, TEST_API_KEY)
}

/// The server side of one mock connection.
pub struct MockConnection {
    /// Frames written by the client. Yields `None` once the client drops the socket.
    pub sent: mpsc::UnboundedReceiver<Message>,
    inbound: mpsc::UnboundedSender<Result<Message, tungstenite::Error>>,
}

impl MockConnection {
    pub fn send_text(&self, text: &str) {
        let _ = self.inbound.send(Ok(Message::Text(text.to_string().into())));
    }

    pub fn send_json(&self, value: Value) {
        self.send_text(&value.to_string());
    }

    pub fn send_raw(&self, message: Message) {
        let _ = self.inbound.send(Ok(message));
    }

    pub fn ack_login(&self) {
        self.send_json(json!({"event": "login", "status": 200, "message": "authenticated"}));
    }

    pub fn reject_login(&self, status: i64, message: &str) {
        self.send_json(json!({"event": "login", "status": status, "message": message}));
    }

    pub fn heartbeat(&self) {
        self.send_json(json!({"event": "heartbeat"}));
    }

    pub fn trade(&self, symbol: &str, t: i64, price: f64) {
        self.send_json(json!({"s": symbol, "t": t, "lp": price}));
    }

    /// Fails the read half with a transport error.
    pub fn error(&self) {
        let _ = self
            .inbound
            .send(Err(tungstenite::Error::ConnectionClosed));
    }

    /// Next text frame from the client, parsed as JSON.
    pub async fn next_json(&mut self) -> Value {
        loop {
            match self.sent.recv().await {
                Some(Message::Text(text)) => {
                    return serde_json::from_str(&text).expect("client sent invalid JSON");
                }
                Some(_) => continue,
                None => panic!("client closed the connection"),
            }
        }
    }

    /// Waits until the client drops its end of the socket.
    pub async fn closed(&mut self) {
        while self.sent.recv().await.is_some() {}
    }
}

/// A `Connector` that hands every new connection to the test.
pub struct MockConnector {
    connections: mpsc::UnboundedSender<MockConnection>,
    refuse: AtomicBool,
    attempts: AtomicUsize,
    attempt_times: Mutex<Vec<Instant>>,
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, _url: &str) -> marketfeed::Result<(WsWriter, WsReader)> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.attempt_times.lock().push(Instant::now());

        if self.refuse.load(Ordering::SeqCst) {
            return Err(FeedError::WebSocket(tungstenite::Error::ConnectionClosed));
        }

        let (sent_tx, sent_rx) = mpsc::unbounded_channel::<Message>();
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let _ = self.connections.send(MockConnection {
            sent: sent_rx,
            inbound: inbound_tx,
        });

        let write = sink::unfold(sent_tx, |tx, message: Message| async move {
            tx.send(message)
                .map_err(|_| tungstenite::Error::ConnectionClosed)?;
            Ok::<_, tungstenite::Error>(tx)
        });
        let read = stream::unfold(inbound_rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        let write: WsWriter = Box::pin(write);
        let read: WsReader = Box::pin(read);
        Ok((write, read))
    }
}

/// Test-side handle to the mock transport.
pub struct MockServer {
    pub connector: Arc<MockConnector>,
    connections: mpsc::UnboundedReceiver<MockConnection>,
}

impl MockServer {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            connector: Arc::new(MockConnector {
                connections: tx,
                refuse: AtomicBool::new(false),
                attempts: AtomicUsize::new(0),
                attempt_times: Mutex::new(Vec::new()),
            }),
            connections: rx,
        }
    }

    pub fn client(&self, config: ClientConfig) -> MarketDataClient {
        MarketDataClient::with_connector(config, self.connector.clone())
    }

    /// Next connection opened by the client.
    pub async fn accept(&mut self) -> MockConnection {
        self.connections
            .recv()
            .await
            .expect("connector dropped")
    }

    /// Makes every following connection attempt fail.
    pub fn refuse_connections(&self, refuse: bool) {
        self.connector.refuse.store(refuse, Ordering::SeqCst);
    }

    pub fn attempts(&self) -> usize {
        self.connector.attempts.load(Ordering::SeqCst)
    }

    /// Gaps between consecutive connection attempts.
    pub fn attempt_gaps(&self) -> Vec<Duration> {
        self.connector
            .attempt_times
            .lock()
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }
}

/// Connects `client`, acknowledges the login, and returns the live connection.
pub async fn connect_live(client: &MarketDataClient, server: &mut MockServer) -> MockConnection {
    let connecting = tokio::spawn({
        let client = client.clone();
        async move { client.connect().await }
    });

    let mut conn = server.accept().await;
    let login = conn.next_json().await;
    assert_eq!(login["event"], "login");
    assert_eq!(login["data"]["apiKey"], TEST_API_KEY);
    conn.ack_login();

    connecting
        .await
        .expect("connect task panicked")
        .expect("connect failed");
    conn
}

/// Asserts two durations are equal to within a millisecond of timer slack.
pub fn assert_duration_close(actual: Duration, expected: Duration) {
    let diff = actual.abs_diff(expected);
    assert!(
        diff <= Duration::from_millis(1),
        "expected {expected:?}, got {actual:?}"
    );
}
