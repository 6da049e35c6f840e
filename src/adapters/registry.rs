//! Adapter registry and factory
//!
//! Venues register an id, a default config and a builder; callers
//! create adapters by id with partial overrides merged onto the
//! defaults. `AnyAdapter` keeps dispatch static: one enum variant per
//! venue instead of trait objects on the hot path.

use crate::adapters::errors::{ExchangeError, ExchangeResult};
use crate::adapters::events::EventChannels;
use crate::adapters::standx::{self, StandXAdapter};
use crate::adapters::traits::{AdapterDiagnostics, ExchangeAdapter, OrderRequest};
use crate::adapters::types::{
    AdjustmentOutcome, Balance, MarginMode, Order, OrderBook, Position, Ticker,
};
use crate::config::types::{ConfigOverrides, ExchangeConfig};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExchangeType {
    Perpetual,
    Spot,
}

/// Concrete adapter dispatch without boxing.
#[derive(Debug)]
pub enum AnyAdapter {
    StandX(StandXAdapter),
}

/// Forward a method call to the wrapped adapter
macro_rules! delegate {
    ($self:ident, $adapter:ident => $body:expr) => {
        match $self {
            AnyAdapter::StandX($adapter) => $body,
        }
    };
}

#[async_trait]
impl ExchangeAdapter for AnyAdapter {
    fn exchange_id(&self) -> &str {
        delegate!(self, a => a.exchange_id())
    }

    fn name(&self) -> &str {
        delegate!(self, a => a.name())
    }

    async fn connect(&self) -> ExchangeResult<()> {
        delegate!(self, a => a.connect().await)
    }

    async fn disconnect(&self) -> ExchangeResult<()> {
        delegate!(self, a => a.disconnect().await)
    }

    fn is_connected(&self) -> bool {
        delegate!(self, a => a.is_connected())
    }

    async fn get_ticker(&self, symbol: &str) -> ExchangeResult<Ticker> {
        delegate!(self, a => a.get_ticker(symbol).await)
    }

    async fn get_order_book(&self, symbol: &str) -> ExchangeResult<OrderBook> {
        delegate!(self, a => a.get_order_book(symbol).await)
    }

    async fn create_order(&self, request: OrderRequest) -> ExchangeResult<Order> {
        delegate!(self, a => a.create_order(request).await)
    }

    async fn cancel_order(
        &self,
        client_order_id: Option<&str>,
        order_id: Option<&str>,
    ) -> ExchangeResult<Order> {
        delegate!(self, a => a.cancel_order(client_order_id, order_id).await)
    }

    async fn get_order(&self, order_id: &str) -> ExchangeResult<Order> {
        delegate!(self, a => a.get_order(order_id).await)
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> ExchangeResult<Vec<Order>> {
        delegate!(self, a => a.get_open_orders(symbol).await)
    }

    async fn get_positions(&self, symbol: Option<&str>) -> ExchangeResult<Vec<Position>> {
        delegate!(self, a => a.get_positions(symbol).await)
    }

    async fn get_balances(&self) -> ExchangeResult<Vec<Balance>> {
        delegate!(self, a => a.get_balances().await)
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<AdjustmentOutcome> {
        delegate!(self, a => a.set_leverage(symbol, leverage).await)
    }

    async fn set_margin_mode(
        &self,
        symbol: &str,
        mode: MarginMode,
    ) -> ExchangeResult<AdjustmentOutcome> {
        delegate!(self, a => a.set_margin_mode(symbol, mode).await)
    }

    async fn subscribe_ticker(&self, symbol: &str) -> ExchangeResult<()> {
        delegate!(self, a => a.subscribe_ticker(symbol).await)
    }

    async fn subscribe_order_book(&self, symbol: &str) -> ExchangeResult<()> {
        delegate!(self, a => a.subscribe_order_book(symbol).await)
    }

    fn events(&self) -> &EventChannels {
        delegate!(self, a => a.events())
    }

    async fn diagnostics(&self) -> AdapterDiagnostics {
        delegate!(self, a => a.diagnostics().await)
    }
}

type AdapterBuilder = Box<dyn Fn(ExchangeConfig) -> ExchangeResult<AnyAdapter> + Send + Sync>;

struct RegisteredVenue {
    exchange_type: ExchangeType,
    default_config: ExchangeConfig,
    builder: AdapterBuilder,
}

/// Registry of known venues plus a per-id instance cache.
pub struct AdapterRegistry {
    venues: std::sync::Mutex<HashMap<String, RegisteredVenue>>,
    instances: tokio::sync::Mutex<HashMap<String, Arc<AnyAdapter>>>,
}

impl AdapterRegistry {
    /// Empty registry, no builtins.
    pub fn new() -> Self {
        Self {
            venues: std::sync::Mutex::new(HashMap::new()),
            instances: tokio::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Registry with all built-in venues registered.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        registry.register(
            standx::EXCHANGE_ID,
            ExchangeType::Perpetual,
            standx::default_config(),
            Box::new(|config| StandXAdapter::new(config).map(AnyAdapter::StandX)),
        );
        registry
    }

    /// Register a venue. Re-registering an id replaces the previous
    /// entry; existing instances are untouched.
    pub fn register(
        &self,
        exchange_id: &str,
        exchange_type: ExchangeType,
        default_config: ExchangeConfig,
        builder: AdapterBuilder,
    ) {
        let Ok(mut venues) = self.venues.lock() else {
            return;
        };
        if venues
            .insert(
                exchange_id.to_string(),
                RegisteredVenue {
                    exchange_type,
                    default_config,
                    builder,
                },
            )
            .is_some()
        {
            tracing::warn!(exchange = %exchange_id, "venue registration replaced");
        } else {
            tracing::info!(exchange = %exchange_id, "venue registered");
        }
    }

    pub fn unregister(&self, exchange_id: &str) -> bool {
        self.venues
            .lock()
            .map(|mut venues| venues.remove(exchange_id).is_some())
            .unwrap_or(false)
    }

    pub fn registered(&self) -> Vec<String> {
        self.venues
            .lock()
            .map(|venues| {
                let mut ids: Vec<String> = venues.keys().cloned().collect();
                ids.sort();
                ids
            })
            .unwrap_or_default()
    }

    pub fn exchange_type(&self, exchange_id: &str) -> Option<ExchangeType> {
        self.venues
            .lock()
            .ok()
            .and_then(|venues| venues.get(exchange_id).map(|v| v.exchange_type))
    }

    /// Build a fresh adapter for `exchange_id` with `overrides` merged
    /// onto the registered defaults.
    pub fn create(
        &self,
        exchange_id: &str,
        overrides: &ConfigOverrides,
    ) -> ExchangeResult<AnyAdapter> {
        let venues = self
            .venues
            .lock()
            .map_err(|_| ExchangeError::UnknownExchange(exchange_id.to_string()))?;
        let venue = venues
            .get(exchange_id)
            .ok_or_else(|| ExchangeError::UnknownExchange(exchange_id.to_string()))?;
        let config = overrides.apply_to(venue.default_config.clone());
        (venue.builder)(config)
    }

    /// Singleton per id: the first call builds, later calls return the
    /// cached instance regardless of overrides.
    pub async fn get_or_create(
        &self,
        exchange_id: &str,
        overrides: &ConfigOverrides,
    ) -> ExchangeResult<Arc<AnyAdapter>> {
        let mut instances = self.instances.lock().await;
        if let Some(existing) = instances.get(exchange_id) {
            return Ok(Arc::clone(existing));
        }
        let adapter = Arc::new(self.create(exchange_id, overrides)?);
        instances.insert(exchange_id.to_string(), Arc::clone(&adapter));
        Ok(adapter)
    }

    pub async fn clear_instances(&self) {
        self.instances.lock().await.clear();
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("registered", &self.registered())
            .finish()
    }
}
