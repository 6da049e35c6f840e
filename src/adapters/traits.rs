//! Exchange adapter trait
//!
//! The venue-neutral surface the rest of the system programs against.
//! All symbols crossing this boundary are canonical (`BTC-USDC-PERP`);
//! adapters translate internally.

use crate::adapters::errors::ExchangeResult;
use crate::adapters::events::EventChannels;
use crate::adapters::shared::stream::StreamDiagnostics;
use crate::adapters::types::{
    AdjustmentOutcome, Balance, MarginMode, Order, OrderBook, OrderSide, OrderType, Position,
    Ticker,
};
use async_trait::async_trait;
use rust_decimal::Decimal;

/// Parameters for submitting an order.
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub symbol: String,
    pub side: OrderSide,
    pub order_type: OrderType,
    pub qty: Decimal,
    pub price: Option<Decimal>,
    pub time_in_force: String,
    pub reduce_only: bool,
    pub margin_mode: Option<String>,
    pub leverage: Option<u32>,
    /// Generated if absent; the confirmation correlates on this id
    pub client_order_id: Option<String>,
}

impl OrderRequest {
    pub fn limit(symbol: &str, side: OrderSide, qty: Decimal, price: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Limit,
            qty,
            price: Some(price),
            time_in_force: "gtc".to_string(),
            reduce_only: false,
            margin_mode: None,
            leverage: None,
            client_order_id: None,
        }
    }

    pub fn market(symbol: &str, side: OrderSide, qty: Decimal) -> Self {
        Self {
            symbol: symbol.to_string(),
            side,
            order_type: OrderType::Market,
            qty,
            price: None,
            time_in_force: "gtc".to_string(),
            reduce_only: false,
            margin_mode: None,
            leverage: None,
            client_order_id: None,
        }
    }
}

/// Combined health snapshot across an adapter's sessions.
#[derive(Debug, Clone, Default)]
pub struct AdapterDiagnostics {
    pub public_stream: Option<StreamDiagnostics>,
    pub private_stream: Option<StreamDiagnostics>,
    pub pending_correlations: usize,
    pub cached_orders: usize,
}

#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    fn exchange_id(&self) -> &str;
    fn name(&self) -> &str;

    async fn connect(&self) -> ExchangeResult<()>;
    async fn disconnect(&self) -> ExchangeResult<()>;
    fn is_connected(&self) -> bool;

    // Market data (REST)
    async fn get_ticker(&self, symbol: &str) -> ExchangeResult<Ticker>;
    async fn get_order_book(&self, symbol: &str) -> ExchangeResult<OrderBook>;

    // Trading
    async fn create_order(&self, request: OrderRequest) -> ExchangeResult<Order>;
    async fn cancel_order(
        &self,
        client_order_id: Option<&str>,
        order_id: Option<&str>,
    ) -> ExchangeResult<Order>;
    async fn get_order(&self, order_id: &str) -> ExchangeResult<Order>;
    async fn get_open_orders(&self, symbol: Option<&str>) -> ExchangeResult<Vec<Order>>;

    // Account
    async fn get_positions(&self, symbol: Option<&str>) -> ExchangeResult<Vec<Position>>;
    async fn get_balances(&self) -> ExchangeResult<Vec<Balance>>;

    /// Venues without a leverage endpoint report `Unsupported`
    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<AdjustmentOutcome>;
    async fn set_margin_mode(
        &self,
        symbol: &str,
        mode: MarginMode,
    ) -> ExchangeResult<AdjustmentOutcome>;

    // Streams
    async fn subscribe_ticker(&self, symbol: &str) -> ExchangeResult<()>;
    async fn subscribe_order_book(&self, symbol: &str) -> ExchangeResult<()>;

    /// Callback registries for stream fan-out
    fn events(&self) -> &EventChannels;

    async fn diagnostics(&self) -> AdapterDiagnostics;
}
