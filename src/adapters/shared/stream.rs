//! Generic WebSocket stream session
//!
//! One `StreamSession` owns one socket: it connects, authenticates,
//! replays subscriptions after reconnects, and runs a reader task that
//! decodes frames through the venue's `WireCodec` and forwards
//! normalized events to the adapter over an mpsc channel. Parse
//! failures are logged and dropped; the stream keeps running.

use crate::adapters::errors::{ExchangeError, ExchangeResult};
use crate::adapters::shared::websocket::{connect_tls, TlsWebSocketStream};
use crate::adapters::types::{
    current_time_ms, Balance, ConnectionHealth, ConnectionState, Order, OrderBook, Position,
    Ticker, STALE_THRESHOLD_MS,
};
use futures_util::stream::{SplitSink, StreamExt};
use futures_util::SinkExt;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_tungstenite::tungstenite::Message;

/// Normalized event decoded from a venue frame.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Ticker(Ticker),
    OrderBook(OrderBook),
    Order(Order),
    Position(Position),
    Balance(Balance),
    /// Venue acknowledged (or rejected) stream authentication
    AuthAck { success: bool, message: Option<String> },
}

/// Per-venue wire adapter: frame encoding and decoding only, no I/O.
pub trait WireCodec: Send + Sync + 'static {
    /// Decode one text frame. `Ok(None)` means a frame that carries no
    /// event (pong, subscription echo).
    fn decode(&self, raw: &str) -> Result<Option<StreamEvent>, ExchangeError>;

    /// Frame subscribing to `channel` for `symbol` (venue format).
    fn subscribe_frame(&self, channel: &str, symbol: &str) -> String;

    /// Authentication frame sent right after connecting, if the stream
    /// requires one. `session_id` is stable for the session's lifetime.
    fn auth_frame(&self, session_id: &str) -> Option<String>;
}

/// Reconnect backoff parameters (exponential, jittered).
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub max_attempts: u32,
    /// Initial delay in milliseconds (doubles each attempt)
    pub initial_delay_ms: u64,
    /// Maximum delay cap in milliseconds
    pub max_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 500,
            max_delay_ms: 5000,
        }
    }
}

/// Backoff for the given zero-based attempt, jitter included.
/// Jitter (0-199ms) breaks up thundering herds when several sessions
/// drop at once.
fn backoff_delay_ms(config: &ReconnectConfig, attempt: u32) -> u64 {
    let jitter = rand::random::<u64>() % 200;
    std::cmp::min(
        config.initial_delay_ms.saturating_mul(1u64 << attempt.min(16)),
        config.max_delay_ms,
    ) + jitter
}

/// Snapshot of session health for callers.
#[derive(Debug, Clone)]
pub struct StreamDiagnostics {
    pub connected: bool,
    pub state: ConnectionState,
    pub message_count: u64,
    /// Unix ms of last frame of any kind; 0 if none yet
    pub last_message_ms: u64,
    /// Per-symbol order book frame counts and last-seen ages (ms)
    pub depth_messages: HashMap<String, (u64, u64)>,
    pub last_exit_reason: Option<String>,
}

struct DepthStats {
    count: u64,
    last_ms: u64,
}

type WsSink = SplitSink<TlsWebSocketStream, Message>;

pub struct StreamSession<C: WireCodec> {
    name: String,
    url: String,
    codec: Arc<C>,
    session_id: String,
    health: ConnectionHealth,
    writer: Arc<Mutex<Option<WsSink>>>,
    event_tx: mpsc::UnboundedSender<StreamEvent>,
    /// (channel, venue symbol) pairs replayed after reconnect
    subscriptions: Mutex<Vec<(String, String)>>,
    message_count: Arc<AtomicU64>,
    depth_stats: Arc<std::sync::Mutex<HashMap<String, DepthStats>>>,
    last_exit_reason: Arc<std::sync::Mutex<Option<String>>>,
    reconnect: ReconnectConfig,
}

impl<C: WireCodec> StreamSession<C> {
    pub fn new(
        name: &str,
        url: &str,
        codec: Arc<C>,
        event_tx: mpsc::UnboundedSender<StreamEvent>,
        reconnect: ReconnectConfig,
    ) -> Self {
        Self {
            name: name.to_string(),
            url: url.to_string(),
            codec,
            session_id: uuid::Uuid::new_v4().to_string(),
            health: ConnectionHealth::new(),
            writer: Arc::new(Mutex::new(None)),
            event_tx,
            subscriptions: Mutex::new(Vec::new()),
            message_count: Arc::new(AtomicU64::new(0)),
            depth_stats: Arc::new(std::sync::Mutex::new(HashMap::new())),
            last_exit_reason: Arc::new(std::sync::Mutex::new(None)),
            reconnect,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub async fn state(&self) -> ConnectionState {
        *self.health.state.read().await
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.health.state.write().await = state;
    }

    /// Open the socket, authenticate if the codec requires it, and
    /// start the reader task.
    pub async fn connect(&self) -> ExchangeResult<()> {
        self.set_state(ConnectionState::Connecting).await;
        let ws_stream = match connect_tls(&self.url).await {
            Ok(s) => s,
            Err(e) => {
                self.set_state(ConnectionState::Disconnected).await;
                return Err(e);
            }
        };
        self.set_state(ConnectionState::Connected).await;
        tracing::info!(session = %self.name, url = %self.url, "WebSocket connected");

        let (sink, stream) = ws_stream.split();
        *self.writer.lock().await = Some(sink);

        self.health.reader_alive.store(true, Ordering::SeqCst);
        self.health
            .last_data
            .store(current_time_ms(), Ordering::SeqCst);
        self.spawn_reader(stream);

        if let Some(frame) = self.codec.auth_frame(&self.session_id) {
            self.set_state(ConnectionState::Authenticating).await;
            self.send_text(frame).await?;
        }
        self.set_state(ConnectionState::Streaming).await;
        Ok(())
    }

    fn spawn_reader(&self, mut stream: futures_util::stream::SplitStream<TlsWebSocketStream>) {
        let name = self.name.clone();
        let codec = Arc::clone(&self.codec);
        let health = self.health.clone_refs();
        let event_tx = self.event_tx.clone();
        let writer = Arc::clone(&self.writer);
        let message_count = Arc::clone(&self.message_count);
        let depth_stats = Arc::clone(&self.depth_stats);
        let last_exit_reason = Arc::clone(&self.last_exit_reason);

        tokio::spawn(async move {
            let exit_reason;
            loop {
                match stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        health.last_data.store(current_time_ms(), Ordering::SeqCst);
                        message_count.fetch_add(1, Ordering::Relaxed);
                        process_text(&name, codec.as_ref(), &text, &event_tx, &depth_stats);
                    }
                    Some(Ok(Message::Ping(payload))) => {
                        health.last_data.store(current_time_ms(), Ordering::SeqCst);
                        let mut guard = writer.lock().await;
                        if let Some(sink) = guard.as_mut() {
                            if let Err(e) = sink.send(Message::Pong(payload)).await {
                                tracing::warn!(session = %name, error = %e, "pong failed");
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        exit_reason = format!("close frame: {frame:?}");
                        break;
                    }
                    Some(Ok(_)) => {
                        // Binary/pong frames count as liveness
                        health.last_data.store(current_time_ms(), Ordering::SeqCst);
                    }
                    Some(Err(e)) => {
                        exit_reason = format!("read error: {e}");
                        break;
                    }
                    None => {
                        exit_reason = "stream ended".to_string();
                        break;
                    }
                }
            }
            tracing::warn!(session = %name, reason = %exit_reason, "reader loop exited");
            if let Ok(mut guard) = last_exit_reason.lock() {
                *guard = Some(exit_reason);
            }
            health.reader_alive.store(false, Ordering::SeqCst);
            *health.state.write().await = ConnectionState::Disconnected;
        });
    }

    /// Send a subscription frame and record it for reconnect replay.
    pub async fn subscribe(&self, channel: &str, venue_symbol: &str) -> ExchangeResult<()> {
        let frame = self.codec.subscribe_frame(channel, venue_symbol);
        self.send_text(frame).await?;
        self.subscriptions
            .lock()
            .await
            .push((channel.to_string(), venue_symbol.to_string()));
        tracing::debug!(
            session = %self.name,
            channel = %channel,
            symbol = %venue_symbol,
            "subscribed"
        );
        Ok(())
    }

    /// Replay all recorded subscriptions (after reconnect).
    pub async fn resubscribe_all(&self) -> ExchangeResult<()> {
        let subs = self.subscriptions.lock().await.clone();
        for (channel, symbol) in subs {
            let frame = self.codec.subscribe_frame(&channel, &symbol);
            self.send_text(frame).await?;
        }
        Ok(())
    }

    pub async fn send_text(&self, frame: String) -> ExchangeResult<()> {
        let mut guard = self.writer.lock().await;
        let sink = guard
            .as_mut()
            .ok_or_else(|| ExchangeError::Connection(format!("{}: not connected", self.name)))?;
        sink.send(Message::Text(frame)).await?;
        Ok(())
    }

    /// Reconnect with exponential backoff and jitter, then replay
    /// subscriptions. Returns the last error if every attempt fails.
    pub async fn reconnect(&self) -> ExchangeResult<()> {
        self.set_state(ConnectionState::Reconnecting).await;
        let mut last_error: Option<ExchangeError> = None;

        for attempt in 0..self.reconnect.max_attempts {
            let delay_ms = backoff_delay_ms(&self.reconnect, attempt);
            tracing::info!(
                session = %self.name,
                attempt = attempt + 1,
                max_attempts = self.reconnect.max_attempts,
                delay_ms,
                "reconnecting"
            );
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;

            match self.connect().await {
                Ok(()) => {
                    self.resubscribe_all().await?;
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(session = %self.name, attempt = attempt + 1, error = %e, "reconnect attempt failed");
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            ExchangeError::Connection(format!("{}: reconnection failed", self.name))
        }))
    }

    pub async fn disconnect(&self) {
        let mut guard = self.writer.lock().await;
        if let Some(sink) = guard.as_mut() {
            let _ = sink.send(Message::Close(None)).await;
        }
        *guard = None;
        drop(guard);
        self.set_state(ConnectionState::Disconnected).await;
        tracing::info!(session = %self.name, "disconnected");
    }

    /// Fresh data within the stale threshold and a live reader.
    pub fn is_healthy(&self) -> bool {
        let alive = self.health.reader_alive.load(Ordering::SeqCst);
        let last = self.health.last_data.load(Ordering::SeqCst);
        alive && current_time_ms().saturating_sub(last) < STALE_THRESHOLD_MS
    }

    pub async fn diagnostics(&self) -> StreamDiagnostics {
        let now = current_time_ms();
        let depth_messages = self
            .depth_stats
            .lock()
            .map(|stats| {
                stats
                    .iter()
                    .map(|(sym, s)| (sym.clone(), (s.count, now.saturating_sub(s.last_ms))))
                    .collect()
            })
            .unwrap_or_default();
        StreamDiagnostics {
            connected: self.health.reader_alive.load(Ordering::SeqCst),
            state: self.state().await,
            message_count: self.message_count.load(Ordering::Relaxed),
            last_message_ms: self.health.last_data.load(Ordering::SeqCst),
            depth_messages,
            last_exit_reason: self.last_exit_reason.lock().ok().and_then(|g| g.clone()),
        }
    }
}

fn process_text<C: WireCodec + ?Sized>(
    session_name: &str,
    codec: &C,
    text: &str,
    event_tx: &mpsc::UnboundedSender<StreamEvent>,
    depth_stats: &std::sync::Mutex<HashMap<String, DepthStats>>,
) {
    match codec.decode(text) {
        Ok(Some(event)) => {
            if let StreamEvent::OrderBook(ob) = &event {
                if let Ok(mut stats) = depth_stats.lock() {
                    let entry = stats.entry(ob.symbol.clone()).or_insert(DepthStats {
                        count: 0,
                        last_ms: 0,
                    });
                    entry.count += 1;
                    entry.last_ms = current_time_ms();
                }
            }
            if event_tx.send(event).is_err() {
                tracing::warn!(session = %session_name, "event receiver dropped");
            }
        }
        Ok(None) => {}
        Err(e) => {
            // Malformed frame: log and keep reading
            tracing::warn!(session = %session_name, error = %e, "failed to decode frame, dropped");
        }
    }
}
