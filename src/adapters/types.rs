//! Canonical data types shared by all exchange adapters
//!
//! Venue wire payloads are normalized into these types at the adapter
//! boundary; everything above the adapters speaks only this model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Get current time in milliseconds
pub fn current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// =============================================================================
// HTTP Client
// =============================================================================

/// HTTP request timeout (seconds)
const HTTP_TIMEOUT_SECS: u64 = 10;
/// HTTP connection timeout (milliseconds) — fail fast if host unreachable
const HTTP_CONNECT_TIMEOUT_MS: u64 = 1500;
/// Max idle connections per host in connection pool
const HTTP_POOL_MAX_IDLE: usize = 5;
/// TCP keepalive interval (seconds)
const HTTP_TCP_KEEPALIVE_SECS: u64 = 30;

/// Create a pooled HTTP client shared by an adapter's REST calls.
pub fn create_http_client(exchange_name: &str) -> reqwest::Client {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
        .pool_max_idle_per_host(HTTP_POOL_MAX_IDLE)
        .tcp_keepalive(Duration::from_secs(HTTP_TCP_KEEPALIVE_SECS))
        .connect_timeout(Duration::from_millis(HTTP_CONNECT_TIMEOUT_MS))
        .tcp_nodelay(true)
        .build()
        .unwrap_or_else(|_| reqwest::Client::new());
    tracing::info!(
        phase = "init",
        exchange = %exchange_name,
        timeout_s = HTTP_TIMEOUT_SECS,
        connect_timeout_ms = HTTP_CONNECT_TIMEOUT_MS,
        "HTTP client configured"
    );
    client
}

/// Threshold in milliseconds after which stream data is considered stale
pub const STALE_THRESHOLD_MS: u64 = 30_000;

/// Heartbeat / health-check interval (seconds)
pub const HEARTBEAT_INTERVAL_SECS: u64 = 30;

// =============================================================================
// Order Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderType {
    Limit,
    Market,
}

/// Order lifecycle status.
///
/// Transitions are monotonic: once a terminal status is reached no
/// further transition is applied, regardless of late wire updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Submitted locally, no venue acknowledgment yet
    PendingLocal,
    Open,
    PartiallyFilled,
    Filled,
    Canceled,
    Rejected,
    Expired,
}

impl OrderStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Filled
                | OrderStatus::Canceled
                | OrderStatus::Rejected
                | OrderStatus::Expired
        )
    }
}

/// Canonical order record.
///
/// `remaining` is always recomputed as `amount - filled` (clamped at
/// zero), never trusted from the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Order {
    /// Server-assigned id; present once the venue has confirmed
    pub id: Option<String>,
    /// Client-assigned id; present from submission
    pub client_id: Option<String>,
    /// Canonical symbol (e.g. "BTC-USDC-PERP")
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub amount: Decimal,
    pub filled: Decimal,
    pub remaining: Decimal,
    pub price: Option<Decimal>,
    /// Average fill price
    pub average: Option<Decimal>,
    pub status: OrderStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
    /// Raw venue payload, retained for diagnostics
    #[serde(default)]
    pub raw: serde_json::Value,
}

impl Order {
    /// Recompute the remaining quantity from amount and filled.
    pub fn recompute_remaining(&mut self) {
        let remaining = self.amount - self.filled;
        self.remaining = remaining.max(Decimal::ZERO);
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

// =============================================================================
// Position / Balance Types
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionSide {
    Long,
    Short,
}

impl PositionSide {
    /// Side derived from signed quantity: >= 0 is long, < 0 is short.
    pub fn from_signed_qty(qty: Decimal) -> Self {
        if qty >= Decimal::ZERO {
            PositionSide::Long
        } else {
            PositionSide::Short
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarginMode {
    Cross,
    Isolated,
}

/// Position snapshot, keyed by canonical symbol. Replaced wholesale on
/// each update; the latest snapshot by timestamp wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    pub side: PositionSide,
    /// Absolute position size
    pub size: Decimal,
    pub entry_price: Decimal,
    pub mark_price: Decimal,
    pub unrealized_pnl: Decimal,
    pub realized_pnl: Decimal,
    pub leverage: u32,
    pub margin_mode: MarginMode,
    pub margin: Decimal,
    pub liquidation_price: Option<Decimal>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Balance snapshot, keyed by currency code. Same replace-wholesale
/// rule as positions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Balance {
    pub currency: String,
    pub free: Decimal,
    pub used: Decimal,
    pub total: Decimal,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// Entities whose cache writes are gated by snapshot time.
pub trait Timestamped {
    fn as_of(&self) -> DateTime<Utc>;
}

impl Timestamped for Position {
    fn as_of(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

impl Timestamped for Balance {
    fn as_of(&self) -> DateTime<Utc> {
        self.updated_at
    }
}

// =============================================================================
// Market Data Types
// =============================================================================

/// Ticker snapshot. Mark/index prices and funding rate are venue-computed
/// reference values passed through opaquely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Ticker {
    pub symbol: String,
    pub bid: Option<Decimal>,
    pub ask: Option<Decimal>,
    pub last: Option<Decimal>,
    pub mark_price: Option<Decimal>,
    pub index_price: Option<Decimal>,
    pub funding_rate: Option<Decimal>,
    pub open_interest: Option<Decimal>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub raw: serde_json::Value,
}

/// A single level in the order book (price + quantity)
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OrderBookLevel {
    pub price: f64,
    pub quantity: f64,
}

impl OrderBookLevel {
    pub fn new(price: f64, quantity: f64) -> Self {
        Self { price, quantity }
    }
}

/// Order book snapshot.
///
/// Venues do not guarantee level ordering, so `normalize()` is applied
/// after every update: bids descending, asks ascending by price.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderBook {
    pub symbol: String,
    /// Bid levels sorted descending by price (best bid first)
    pub bids: Vec<OrderBookLevel>,
    /// Ask levels sorted ascending by price (best ask first)
    pub asks: Vec<OrderBookLevel>,
    /// Timestamp in Unix milliseconds
    pub timestamp: u64,
}

impl OrderBook {
    /// Re-sort levels into canonical order.
    pub fn normalize(&mut self) {
        self.bids
            .sort_by(|a, b| b.price.partial_cmp(&a.price).unwrap_or(std::cmp::Ordering::Equal));
        self.asks
            .sort_by(|a, b| a.price.partial_cmp(&b.price).unwrap_or(std::cmp::Ordering::Equal));
    }

    /// Get the best bid price (highest bid)
    pub fn best_bid(&self) -> Option<f64> {
        self.bids.first().map(|l| l.price)
    }

    /// Get the best ask price (lowest ask)
    pub fn best_ask(&self) -> Option<f64> {
        self.asks.first().map(|l| l.price)
    }

    /// Calculate mid price
    pub fn mid_price(&self) -> Option<f64> {
        match (self.best_bid(), self.best_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) / 2.0),
            _ => None,
        }
    }
}

// =============================================================================
// Optional-capability outcomes
// =============================================================================

/// Result of a capability the venue may not implement (e.g. per-symbol
/// leverage on venues where leverage rides on the order payload).
/// Returned as data rather than raised, because absence is by design.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentOutcome {
    Applied,
    Unsupported,
}

// =============================================================================
// Connection Health Types
// =============================================================================

/// Connection state for one WebSocket stream session.
///
/// Terminal only on deliberate shutdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Authenticating,
    /// Authenticated and processing stream events
    Streaming,
    Reconnecting,
}

/// Shared connection health state for tracking WebSocket health.
///
/// Atomic/lockable fields shared across tasks (reader loop, heartbeat,
/// adapter methods).
#[derive(Debug)]
pub struct ConnectionHealth {
    pub state: Arc<RwLock<ConnectionState>>,
    /// Timestamp of last data received (Unix ms) - any message counts
    pub last_data: Arc<AtomicU64>,
    /// Set to false when the reader loop exits (Close frame or error)
    pub reader_alive: Arc<AtomicBool>,
}

impl ConnectionHealth {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ConnectionState::Disconnected)),
            last_data: Arc::new(AtomicU64::new(0)),
            reader_alive: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Clone the Arc references for sharing with other tasks
    pub fn clone_refs(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            last_data: Arc::clone(&self.last_data),
            reader_alive: Arc::clone(&self.reader_alive),
        }
    }
}

impl Default for ConnectionHealth {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for ConnectionHealth {
    fn clone(&self) -> Self {
        self.clone_refs()
    }
}
