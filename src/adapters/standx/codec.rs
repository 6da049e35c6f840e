//! StandX wire format: frame encoding and payload parsing
//!
//! Both stream sessions and the REST client share these parsers. All
//! symbols stay in venue format here; the adapter translates at the
//! boundary.

use crate::adapters::errors::{ExchangeError, ExchangeResult};
use crate::adapters::shared::stream::{StreamEvent, WireCodec};
use crate::adapters::standx::config::DEFAULT_TOKEN;
use crate::adapters::types::{
    current_time_ms, Balance, MarginMode, Order, OrderBook, OrderBookLevel, OrderSide,
    OrderStatus, OrderType, Position, PositionSide, Ticker,
};
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

// ============================================================================
// Field helpers
// ============================================================================

/// Numbers arrive as JSON numbers or strings depending on endpoint.
/// Unparseable values become zero, matching how the venue treats
/// missing quantities.
fn safe_decimal(value: Option<&Value>) -> Decimal {
    opt_decimal(value).unwrap_or(Decimal::ZERO)
}

fn opt_decimal(value: Option<&Value>) -> Option<Decimal> {
    match value? {
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) if !s.is_empty() => s.parse().ok(),
        _ => None,
    }
}

fn opt_str<'a>(data: &'a Value, key: &str) -> Option<&'a str> {
    data.get(key).and_then(Value::as_str)
}

/// Timestamps arrive as unix milliseconds or RFC 3339 strings.
fn parse_timestamp(value: Option<&Value>) -> DateTime<Utc> {
    match value {
        Some(Value::Number(n)) => n
            .as_f64()
            .and_then(|ms| Utc.timestamp_millis_opt(ms as i64).single())
            .unwrap_or_else(Utc::now),
        Some(Value::String(s)) => DateTime::parse_from_rfc3339(&s.replace('Z', "+00:00"))
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        _ => Utc::now(),
    }
}

fn parse_order_side(side: Option<&str>) -> OrderSide {
    match side.map(str::to_lowercase).as_deref() {
        Some("sell") => OrderSide::Sell,
        _ => OrderSide::Buy,
    }
}

fn parse_order_type(order_type: Option<&str>) -> OrderType {
    match order_type.map(str::to_lowercase).as_deref() {
        Some("market") => OrderType::Market,
        _ => OrderType::Limit,
    }
}

/// Venue statuses `open`, `new` and `untriggered` all map to open.
fn parse_order_status(status: Option<&str>) -> OrderStatus {
    match status.map(str::to_lowercase).as_deref() {
        Some("canceled") => OrderStatus::Canceled,
        Some("filled") => OrderStatus::Filled,
        Some("rejected") => OrderStatus::Rejected,
        Some("open") | Some("new") | Some("untriggered") => OrderStatus::Open,
        other => {
            if let Some(s) = other {
                tracing::warn!(status = %s, "unrecognized order status, treating as open");
            }
            OrderStatus::Open
        }
    }
}

fn parse_margin_mode(mode: Option<&str>) -> MarginMode {
    match mode.map(str::to_lowercase).as_deref() {
        Some("isolated") => MarginMode::Isolated,
        _ => MarginMode::Cross,
    }
}

// ============================================================================
// Entity parsers (venue symbols)
// ============================================================================

pub fn parse_order(data: &Value) -> Order {
    let amount = safe_decimal(data.get("qty"));
    let filled = safe_decimal(data.get("fill_qty"));
    let mut status = parse_order_status(opt_str(data, "status"));
    if status == OrderStatus::Open && filled > Decimal::ZERO {
        status = OrderStatus::PartiallyFilled;
    }
    let average = opt_decimal(data.get("fill_avg_price")).or_else(|| opt_decimal(data.get("price")));

    let mut order = Order {
        id: match data.get("id") {
            Some(Value::String(s)) => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            _ => None,
        },
        client_id: opt_str(data, "cl_ord_id").map(str::to_string),
        symbol: opt_str(data, "symbol").unwrap_or_default().to_string(),
        side: parse_order_side(opt_str(data, "side")),
        order_type: parse_order_type(opt_str(data, "order_type")),
        amount,
        filled,
        remaining: Decimal::ZERO,
        price: opt_decimal(data.get("price")),
        average,
        status,
        created_at: parse_timestamp(data.get("created_at")),
        updated_at: data.get("updated_at").map(|v| parse_timestamp(Some(v))),
        raw: data.clone(),
    };
    order.recompute_remaining();
    order
}

pub fn parse_ticker(data: &Value, funding_override: Option<Decimal>) -> Ticker {
    // Either a `spread` pair [bid, ask] or separate spread_bid/spread_ask
    let (bid, ask) = match data.get("spread").and_then(Value::as_array) {
        Some(pair) if pair.len() >= 2 => (opt_decimal(pair.first()), opt_decimal(pair.get(1))),
        _ => (
            opt_decimal(data.get("spread_bid")),
            opt_decimal(data.get("spread_ask")),
        ),
    };
    Ticker {
        symbol: opt_str(data, "symbol").unwrap_or_default().to_string(),
        bid,
        ask,
        last: opt_decimal(data.get("last_price")),
        mark_price: opt_decimal(data.get("mark_price")),
        index_price: opt_decimal(data.get("index_price")),
        funding_rate: opt_decimal(data.get("funding_rate")).or(funding_override),
        open_interest: opt_decimal(data.get("open_interest")),
        timestamp: parse_timestamp(data.get("time")),
        raw: data.clone(),
    }
}

fn parse_levels(data: &Value, key: &str) -> Vec<OrderBookLevel> {
    data.get(key)
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .filter_map(|row| {
                    let pair = row.as_array()?;
                    let price = level_f64(pair.first()?)?;
                    let quantity = level_f64(pair.get(1)?)?;
                    Some(OrderBookLevel::new(price, quantity))
                })
                .collect()
        })
        .unwrap_or_default()
}

fn level_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub fn parse_orderbook(data: &Value) -> OrderBook {
    let mut book = OrderBook {
        symbol: opt_str(data, "symbol").unwrap_or_default().to_string(),
        bids: parse_levels(data, "bids"),
        asks: parse_levels(data, "asks"),
        timestamp: data
            .get("time")
            .and_then(Value::as_u64)
            .unwrap_or_else(current_time_ms),
    };
    // Venue does not guarantee ordering
    book.normalize();
    book
}

pub fn parse_position(data: &Value) -> Position {
    let qty = safe_decimal(data.get("qty"));
    let margin = match data.get("holding_margin") {
        Some(v) if !v.is_null() => safe_decimal(Some(v)),
        _ => safe_decimal(data.get("initial_margin")),
    };
    Position {
        symbol: opt_str(data, "symbol").unwrap_or_default().to_string(),
        side: PositionSide::from_signed_qty(qty),
        size: qty.abs(),
        entry_price: safe_decimal(data.get("entry_price")),
        mark_price: safe_decimal(data.get("mark_price")),
        unrealized_pnl: safe_decimal(data.get("upnl")),
        realized_pnl: safe_decimal(data.get("realized_pnl")),
        leverage: safe_decimal(data.get("leverage"))
            .trunc()
            .to_string()
            .parse::<u32>()
            .unwrap_or(1)
            .max(1),
        margin_mode: parse_margin_mode(opt_str(data, "margin_mode")),
        margin,
        liquidation_price: opt_decimal(data.get("liq_price")),
        updated_at: parse_timestamp(data.get("time")),
        raw: data.clone(),
    }
}

pub fn parse_balance(data: &Value) -> Balance {
    let token = opt_str(data, "token")
        .or_else(|| opt_str(data, "asset"))
        .unwrap_or(DEFAULT_TOKEN);
    let free = opt_decimal(data.get("free"))
        .or_else(|| opt_decimal(data.get("available")))
        .or_else(|| opt_decimal(data.get("available_balance")))
        .unwrap_or(Decimal::ZERO);
    let used = opt_decimal(data.get("locked"))
        .or_else(|| opt_decimal(data.get("used")))
        .unwrap_or(Decimal::ZERO);
    let total = opt_decimal(data.get("total"))
        .or_else(|| opt_decimal(data.get("balance")))
        .or_else(|| opt_decimal(data.get("wallet_balance")))
        .unwrap_or(Decimal::ZERO);
    Balance {
        currency: token.to_string(),
        free,
        used,
        total,
        updated_at: parse_timestamp(data.get("time")),
        raw: data.clone(),
    }
}

// ============================================================================
// Stream codecs
// ============================================================================

pub type FundingRates = Arc<Mutex<HashMap<String, Decimal>>>;

/// Codec for the public market-data stream (`/ws-stream/v1`).
///
/// Authentication is optional: with a token the venue also pushes
/// order/position/balance updates on this socket. The price channel
/// omits funding rates, so a shared map filled by the REST poller is
/// merged into tickers.
pub struct StandXPublicCodec {
    jwt_token: Option<String>,
    funding_rates: FundingRates,
}

impl StandXPublicCodec {
    pub fn new(jwt_token: Option<String>, funding_rates: FundingRates) -> Self {
        Self {
            jwt_token,
            funding_rates,
        }
    }

    fn funding_for(&self, symbol: &str) -> Option<Decimal> {
        self.funding_rates
            .lock()
            .ok()
            .and_then(|rates| rates.get(symbol).copied())
    }
}

fn decode_channel_frame(
    codec: Option<&StandXPublicCodec>,
    message: &Value,
) -> ExchangeResult<Option<StreamEvent>> {
    let Some(channel) = opt_str(message, "channel") else {
        return Ok(None);
    };
    let data = message.get("data").cloned().unwrap_or(Value::Null);
    if data.is_null() {
        return Ok(None);
    }
    let event = match channel {
        "price" => {
            let symbol = opt_str(&data, "symbol").unwrap_or_default();
            let funding = codec.and_then(|c| c.funding_for(symbol));
            StreamEvent::Ticker(parse_ticker(&data, funding))
        }
        "depth_book" => StreamEvent::OrderBook(parse_orderbook(&data)),
        "order" => StreamEvent::Order(parse_order(&data)),
        "position" => StreamEvent::Position(parse_position(&data)),
        "balance" => StreamEvent::Balance(parse_balance(&data)),
        other => {
            tracing::debug!(channel = %other, "unhandled stream channel");
            return Ok(None);
        }
    };
    Ok(Some(event))
}

impl WireCodec for StandXPublicCodec {
    fn decode(&self, raw: &str) -> ExchangeResult<Option<StreamEvent>> {
        let message: Value = serde_json::from_str(raw)
            .map_err(|e| ExchangeError::Parse(format!("public frame: {e}")))?;
        if let Some(auth) = message.get("auth") {
            let success = auth
                .get("success")
                .and_then(Value::as_bool)
                .unwrap_or(true);
            return Ok(Some(StreamEvent::AuthAck {
                success,
                message: opt_str(auth, "message").map(str::to_string),
            }));
        }
        decode_channel_frame(Some(self), &message)
    }

    fn subscribe_frame(&self, channel: &str, symbol: &str) -> String {
        let mut subscribe = json!({ "channel": channel });
        if !symbol.is_empty() {
            subscribe["symbol"] = json!(symbol);
        }
        json!({ "subscribe": subscribe }).to_string()
    }

    /// Bearer envelope requesting account channels alongside market data
    fn auth_frame(&self, _session_id: &str) -> Option<String> {
        let token = self.jwt_token.as_ref()?;
        Some(
            json!({
                "auth": {
                    "token": token,
                    "streams": [
                        { "channel": "order" },
                        { "channel": "position" },
                        { "channel": "balance" }
                    ]
                }
            })
            .to_string(),
        )
    }
}

/// Codec for the private order stream (`/ws-api/v1`).
///
/// Login is a JSON-RPC style frame; `params` is itself a JSON-encoded
/// string per the venue contract.
pub struct StandXPrivateCodec {
    jwt_token: String,
}

impl StandXPrivateCodec {
    pub fn new(jwt_token: String) -> Self {
        Self { jwt_token }
    }
}

impl WireCodec for StandXPrivateCodec {
    fn decode(&self, raw: &str) -> ExchangeResult<Option<StreamEvent>> {
        let message: Value = serde_json::from_str(raw)
            .map_err(|e| ExchangeError::Parse(format!("private frame: {e}")))?;
        // Method responses carry a code; 0 is success
        if message.get("request_id").is_some() && message.get("code").is_some() {
            let code = message.get("code").and_then(Value::as_i64).unwrap_or(-1);
            return Ok(Some(StreamEvent::AuthAck {
                success: code == 0,
                message: opt_str(&message, "message").map(str::to_string),
            }));
        }
        decode_channel_frame(None, &message)
    }

    fn subscribe_frame(&self, channel: &str, symbol: &str) -> String {
        let mut subscribe = json!({ "channel": channel });
        if !symbol.is_empty() {
            subscribe["symbol"] = json!(symbol);
        }
        json!({ "subscribe": subscribe }).to_string()
    }

    fn auth_frame(&self, session_id: &str) -> Option<String> {
        let params = json!({ "token": self.jwt_token }).to_string();
        Some(
            json!({
                "session_id": session_id,
                "request_id": uuid::Uuid::new_v4().to_string(),
                "method": "auth:login",
                "params": params
            })
            .to_string(),
        )
    }
}
