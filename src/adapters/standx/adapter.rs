//! StandX exchange adapter
//!
//! Composes the REST client, the two stream sessions, symbol
//! translation, order correlation and the entity caches behind the
//! venue-neutral `ExchangeAdapter` trait.
//!
//! Order submission has two confirmation paths: when the venue answers
//! with a full order record it is returned directly; when it answers
//! with a bare `code: 0` acknowledgment, the real record is awaited
//! from the private stream via the correlator.

use crate::adapters::cache::{EntityCache, OrderCache};
use crate::adapters::correlation::OrderCorrelator;
use crate::adapters::errors::{ExchangeError, ExchangeResult};
use crate::adapters::events::EventChannels;
use crate::adapters::retry::RetryExecutor;
use crate::adapters::shared::stream::{ReconnectConfig, StreamEvent, StreamSession};
use crate::adapters::standx::codec::{
    self, FundingRates, StandXPrivateCodec, StandXPublicCodec,
};
use crate::adapters::standx::config::{
    build_translator, StandXCredentials, DEFAULT_ORDER_WS_URL, EXCHANGE_ID,
};
use crate::adapters::standx::rest::StandXRest;
use crate::adapters::standx::signer::StandXSigner;
use crate::adapters::symbols::SymbolTranslator;
use crate::adapters::traits::{AdapterDiagnostics, ExchangeAdapter, OrderRequest};
use crate::adapters::types::{
    create_http_client, current_time_ms, AdjustmentOutcome, Balance, MarginMode, Order,
    OrderBook, OrderStatus, Position, Ticker,
};
use crate::config::types::ExchangeConfig;
use async_trait::async_trait;
use chrono::Utc;
use rust_decimal::Decimal;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Funding rates move hourly; a minute keeps the cache fresh enough
const FUNDING_POLL_INTERVAL_SECS: u64 = 60;
/// Lookback window for the funding rate query (8h funding period)
const FUNDING_LOOKBACK_MS: u64 = 8 * 3600 * 1000;
/// Wait applied before falling back to the cache on ack-only cancels
const CANCEL_CONFIRM_WAIT: Duration = Duration::from_secs(2);

/// State shared with the stream dispatch tasks.
struct Shared {
    translator: SymbolTranslator,
    correlator: OrderCorrelator,
    orders: OrderCache,
    positions: EntityCache<String, Position>,
    balances: EntityCache<String, Balance>,
    events: EventChannels,
    /// Venue symbols with an active price subscription (funding poller input)
    ticker_symbols: std::sync::Mutex<HashSet<String>>,
}

pub struct StandXAdapter {
    config: ExchangeConfig,
    shared: Arc<Shared>,
    retry: RetryExecutor,
    rest: Arc<StandXRest>,
    funding_rates: FundingRates,
    public: Arc<StreamSession<StandXPublicCodec>>,
    private: Arc<StreamSession<StandXPrivateCodec>>,
    public_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<StreamEvent>>>,
    private_rx: tokio::sync::Mutex<Option<mpsc::UnboundedReceiver<StreamEvent>>>,
    tasks: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    connected: AtomicBool,
}

impl StandXAdapter {
    pub fn new(config: ExchangeConfig) -> ExchangeResult<Self> {
        config
            .validate()
            .map_err(|e| ExchangeError::Request(e.to_string()))?;
        let credentials = StandXCredentials::from_config(&config)?;
        let signer = StandXSigner::new(&credentials.private_key)?;

        let shared = Arc::new(Shared {
            translator: build_translator(&config),
            correlator: OrderCorrelator::new(),
            orders: OrderCache::new(),
            positions: EntityCache::new(),
            balances: EntityCache::new(),
            events: EventChannels::new(),
            ticker_symbols: std::sync::Mutex::new(HashSet::new()),
        });

        let funding_rates: FundingRates = Arc::new(std::sync::Mutex::new(HashMap::new()));

        let reconnect = ReconnectConfig {
            max_attempts: config.max_retry_attempts.max(1),
            initial_delay_ms: config.retry_delay_ms,
            max_delay_ms: 5000,
        };

        let (public_tx, public_rx) = mpsc::unbounded_channel();
        let public_codec = StandXPublicCodec::new(
            Some(credentials.jwt_token.clone()),
            Arc::clone(&funding_rates),
        );
        let public = Arc::new(StreamSession::new(
            "standx-public",
            &config.ws_url,
            Arc::new(public_codec),
            public_tx,
            reconnect.clone(),
        ));

        let (private_tx, private_rx) = mpsc::unbounded_channel();
        let private_url = config
            .private_ws_url
            .clone()
            .unwrap_or_else(|| DEFAULT_ORDER_WS_URL.to_string());
        let private = Arc::new(StreamSession::new(
            "standx-private",
            &private_url,
            Arc::new(StandXPrivateCodec::new(credentials.jwt_token.clone())),
            private_tx,
            reconnect,
        ));

        let rest = Arc::new(StandXRest::new(
            create_http_client(EXCHANGE_ID),
            &config.base_url,
            &credentials.jwt_token,
            Some(signer),
            Some(private.session_id().to_string()),
        ));

        Ok(Self {
            retry: RetryExecutor::new(
                config.max_retry_attempts,
                Duration::from_millis(config.retry_delay_ms),
            ),
            config,
            shared,
            rest,
            funding_rates,
            public,
            private,
            public_rx: tokio::sync::Mutex::new(Some(public_rx)),
            private_rx: tokio::sync::Mutex::new(Some(private_rx)),
            tasks: tokio::sync::Mutex::new(Vec::new()),
            connected: AtomicBool::new(false),
        })
    }

    fn spawn_dispatcher(
        &self,
        mut rx: mpsc::UnboundedReceiver<StreamEvent>,
        session_name: &'static str,
    ) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handle_event(&shared, session_name, event);
            }
            tracing::debug!(session = session_name, "dispatcher stopped");
        })
    }

    fn spawn_monitor<C: crate::adapters::shared::stream::WireCodec>(
        &self,
        session: Arc<StreamSession<C>>,
    ) -> JoinHandle<()> {
        let interval_secs = self.config.heartbeat_interval_secs.max(1);
        let auto_reconnect = self.config.enable_auto_reconnect;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(interval_secs));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // First tick fires immediately; skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if session.is_healthy() {
                    continue;
                }
                if !auto_reconnect {
                    tracing::warn!("stream unhealthy, auto reconnect disabled");
                    continue;
                }
                if let Err(e) = session.reconnect().await {
                    tracing::error!(error = %e, "reconnect failed, will retry next interval");
                }
            }
        })
    }

    fn spawn_funding_poller(&self) -> JoinHandle<()> {
        let rest = Arc::clone(&self.rest);
        let rates = Arc::clone(&self.funding_rates);
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval(Duration::from_secs(FUNDING_POLL_INTERVAL_SECS));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let symbols: Vec<String> = shared
                    .ticker_symbols
                    .lock()
                    .map(|set| set.iter().cloned().collect())
                    .unwrap_or_default();
                for symbol in symbols {
                    let now = current_time_ms();
                    match rest
                        .query_funding_rates(&symbol, now.saturating_sub(FUNDING_LOOKBACK_MS), now)
                        .await
                    {
                        Ok(body) => {
                            let latest = body
                                .as_array()
                                .and_then(|rows| rows.last())
                                .and_then(|row| row.get("funding_rate"))
                                .and_then(|v| match v {
                                    Value::String(s) => s.parse::<Decimal>().ok(),
                                    Value::Number(n) => n.to_string().parse().ok(),
                                    _ => None,
                                });
                            if let Some(rate) = latest {
                                if let Ok(mut map) = rates.lock() {
                                    map.insert(symbol.clone(), rate);
                                }
                            }
                        }
                        Err(e) => {
                            tracing::debug!(symbol = %symbol, error = %e, "funding rate poll failed");
                        }
                    }
                }
            }
        })
    }

    fn build_order_payload(&self, request: &OrderRequest, cl_ord_id: &str) -> Value {
        let venue_symbol = self.shared.translator.to_venue(&request.symbol);
        let mut payload = json!({
            "symbol": venue_symbol,
            "side": request.side,
            "order_type": request.order_type,
            "qty": request.qty.to_string(),
            "time_in_force": request.time_in_force,
            "reduce_only": request.reduce_only,
            "cl_ord_id": cl_ord_id,
        });
        if let Some(price) = request.price {
            payload["price"] = json!(price.to_string());
        }
        if let Some(mode) = &request.margin_mode {
            payload["margin_mode"] = json!(mode);
        }
        if let Some(leverage) = request.leverage {
            payload["leverage"] = json!(leverage);
        }
        payload
    }

    /// Unwrap the optional `data` envelope REST responses may carry.
    fn response_data(body: &Value) -> &Value {
        match body.get("data") {
            Some(data) if !data.is_null() => data,
            _ => body,
        }
    }

    fn check_response_code(body: &Value) -> ExchangeResult<()> {
        if let Some(code) = body.get("code").and_then(Value::as_i64) {
            if code != 0 {
                let message = body
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("venue rejected request");
                return Err(ExchangeError::Request(format!("code {code}: {message}")));
            }
        }
        Ok(())
    }

    fn canonicalize_order(&self, mut order: Order) -> Order {
        order.symbol = self.shared.translator.to_canonical(&order.symbol);
        order
    }

    fn streaming_enabled(&self) -> bool {
        self.config.enable_websocket && self.is_connected()
    }
}

fn handle_event(shared: &Arc<Shared>, session_name: &str, event: StreamEvent) {
    match event {
        StreamEvent::Ticker(mut ticker) => {
            ticker.symbol = shared.translator.to_canonical(&ticker.symbol);
            shared.events.tickers.emit(&ticker);
        }
        StreamEvent::OrderBook(mut book) => {
            book.symbol = shared.translator.to_canonical(&book.symbol);
            shared.events.order_books.emit(&book);
        }
        StreamEvent::Order(mut order) => {
            order.symbol = shared.translator.to_canonical(&order.symbol);
            let applied = shared.orders.apply(order.clone());
            if let Some(client_id) = order.client_id.clone() {
                if !shared.correlator.resolve(&client_id, order.clone()) {
                    tracing::debug!(
                        client_order_id = %client_id,
                        status = ?order.status,
                        "unsolicited order update"
                    );
                }
            }
            if applied {
                shared.events.orders.emit(&order);
            }
        }
        StreamEvent::Position(mut position) => {
            position.symbol = shared.translator.to_canonical(&position.symbol);
            if shared
                .positions
                .put_if_newer(position.symbol.clone(), position.clone())
            {
                shared.events.positions.emit(&position);
            }
        }
        StreamEvent::Balance(balance) => {
            if shared
                .balances
                .put_if_newer(balance.currency.clone(), balance.clone())
            {
                shared.events.balances.emit(&balance);
            }
        }
        StreamEvent::AuthAck { success, message } => {
            if success {
                tracing::info!(session = session_name, "stream authenticated");
            } else {
                tracing::error!(
                    session = session_name,
                    message = message.as_deref().unwrap_or(""),
                    "stream authentication rejected"
                );
            }
        }
    }
}

#[async_trait]
impl ExchangeAdapter for StandXAdapter {
    fn exchange_id(&self) -> &str {
        EXCHANGE_ID
    }

    fn name(&self) -> &str {
        &self.config.name
    }

    async fn connect(&self) -> ExchangeResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            return Ok(());
        }
        let mut tasks = self.tasks.lock().await;

        if self.config.enable_websocket {
            self.public.connect().await?;
            if let Some(rx) = self.public_rx.lock().await.take() {
                tasks.push(self.spawn_dispatcher(rx, "standx-public"));
            }

            self.private.connect().await?;
            if let Some(rx) = self.private_rx.lock().await.take() {
                tasks.push(self.spawn_dispatcher(rx, "standx-private"));
            }

            if self.config.enable_heartbeat {
                tasks.push(self.spawn_monitor(Arc::clone(&self.public)));
                tasks.push(self.spawn_monitor(Arc::clone(&self.private)));
            }
            tasks.push(self.spawn_funding_poller());
        }

        self.connected.store(true, Ordering::SeqCst);
        tracing::info!(exchange = EXCHANGE_ID, "adapter connected");
        Ok(())
    }

    async fn disconnect(&self) -> ExchangeResult<()> {
        self.connected.store(false, Ordering::SeqCst);
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }
        self.public.disconnect().await;
        self.private.disconnect().await;
        tracing::info!(exchange = EXCHANGE_ID, "adapter disconnected");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn get_ticker(&self, symbol: &str) -> ExchangeResult<Ticker> {
        let venue_symbol = self.shared.translator.to_venue(symbol);
        let body = self
            .retry
            .execute("get_ticker", || self.rest.query_symbol_price(&venue_symbol))
            .await?;
        let funding = self
            .funding_rates
            .lock()
            .ok()
            .and_then(|m| m.get(&venue_symbol).copied());
        let mut ticker = codec::parse_ticker(Self::response_data(&body), funding);
        ticker.symbol = symbol.to_string();
        Ok(ticker)
    }

    async fn get_order_book(&self, symbol: &str) -> ExchangeResult<OrderBook> {
        let venue_symbol = self.shared.translator.to_venue(symbol);
        let body = self
            .retry
            .execute("get_order_book", || self.rest.query_depth_book(&venue_symbol))
            .await?;
        let mut book = codec::parse_orderbook(Self::response_data(&body));
        book.symbol = symbol.to_string();
        Ok(book)
    }

    async fn create_order(&self, request: OrderRequest) -> ExchangeResult<Order> {
        let cl_ord_id = request
            .client_order_id
            .clone()
            .unwrap_or_else(|| format!("arb-{}", uuid::Uuid::new_v4()));
        let payload = self.build_order_payload(&request, &cl_ord_id);

        // Waiter parked before the request leaves so a fast stream
        // confirmation cannot race past it
        let waiter = self
            .streaming_enabled()
            .then(|| self.shared.correlator.register(&cl_ord_id));

        // Order placement is never retried: a timed-out attempt may
        // have been accepted, and a second submit doubles the position
        let result = self.rest.new_order(&payload).await;
        let body = match result {
            Ok(body) => body,
            Err(e) => {
                self.shared.correlator.discard(&cl_ord_id);
                return Err(e);
            }
        };
        if let Err(e) = Self::check_response_code(&body) {
            self.shared.correlator.discard(&cl_ord_id);
            return Err(e);
        }

        let data = Self::response_data(&body);
        if data.get("id").is_some() {
            // Full record path
            self.shared.correlator.discard(&cl_ord_id);
            let order = self.canonicalize_order(codec::parse_order(data));
            self.shared.orders.apply(order.clone());
            return Ok(order);
        }

        // Ack-only path: the record arrives on the private stream
        if let Some(rx) = waiter {
            let deadline = Duration::from_secs(self.config.request_timeout_secs);
            let order = self
                .shared
                .correlator
                .await_confirmation(&cl_ord_id, rx, deadline)
                .await?;
            return Ok(order);
        }

        // No stream available: report what is known locally
        tracing::warn!(
            client_order_id = %cl_ord_id,
            "order acknowledged without record and no stream to confirm"
        );
        let mut order = Order {
            id: None,
            client_id: Some(cl_ord_id),
            symbol: request.symbol.clone(),
            side: request.side,
            order_type: request.order_type,
            amount: request.qty,
            filled: Decimal::ZERO,
            remaining: Decimal::ZERO,
            price: request.price,
            average: None,
            status: OrderStatus::PendingLocal,
            created_at: Utc::now(),
            updated_at: None,
            raw: body,
        };
        order.recompute_remaining();
        self.shared.orders.apply(order.clone());
        Ok(order)
    }

    async fn cancel_order(
        &self,
        client_order_id: Option<&str>,
        order_id: Option<&str>,
    ) -> ExchangeResult<Order> {
        let mut payload = json!({});
        if let Some(id) = order_id {
            // Venue expects a numeric id
            match id.parse::<i64>() {
                Ok(numeric) => payload["order_id"] = json!(numeric),
                Err(_) => payload["order_id"] = json!(id),
            }
        }
        if let Some(cl_id) = client_order_id {
            payload["cl_ord_id"] = json!(cl_id);
        }
        if client_order_id.is_none() && order_id.is_none() {
            return Err(ExchangeError::Request(
                "cancel requires order_id or client_order_id".to_string(),
            ));
        }

        let waiter = match client_order_id {
            Some(cl_id) if self.streaming_enabled() => {
                Some((cl_id, self.shared.correlator.register(cl_id)))
            }
            _ => None,
        };

        let body = match self.rest.cancel_order(&payload).await {
            Ok(body) => body,
            Err(e) => {
                if let Some((cl_id, _)) = &waiter {
                    self.shared.correlator.discard(cl_id);
                }
                return Err(e);
            }
        };
        if let Err(e) = Self::check_response_code(&body) {
            if let Some((cl_id, _)) = &waiter {
                self.shared.correlator.discard(cl_id);
            }
            return Err(e);
        }

        let data = Self::response_data(&body);
        if data.get("id").is_some() || data.get("status").is_some() {
            if let Some((cl_id, _)) = &waiter {
                self.shared.correlator.discard(cl_id);
            }
            let order = self.canonicalize_order(codec::parse_order(data));
            self.shared.orders.apply(order.clone());
            return Ok(order);
        }

        // Ack-only cancel: wait briefly for the stream, then fall back
        // to the cached record under whichever id the caller gave
        if let Some((cl_id, rx)) = waiter {
            match self
                .shared
                .correlator
                .await_confirmation(cl_id, rx, CANCEL_CONFIRM_WAIT)
                .await
            {
                Ok(order) => return Ok(order),
                Err(ExchangeError::CorrelationTimeout { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        for key in [client_order_id, order_id].into_iter().flatten() {
            if let Some(cached) = self.shared.orders.get(key) {
                return Ok(cached);
            }
        }

        Err(ExchangeError::Request(
            "cancel acknowledged but no order record available".to_string(),
        ))
    }

    async fn get_order(&self, order_id: &str) -> ExchangeResult<Order> {
        let body = self
            .retry
            .execute("get_order", || self.rest.query_order(order_id))
            .await?;
        Self::check_response_code(&body)?;
        Ok(self.canonicalize_order(codec::parse_order(Self::response_data(&body))))
    }

    async fn get_open_orders(&self, symbol: Option<&str>) -> ExchangeResult<Vec<Order>> {
        let venue_symbol = symbol.map(|s| self.shared.translator.to_venue(s));
        let body = self
            .retry
            .execute("get_open_orders", || {
                self.rest.query_open_orders(venue_symbol.as_deref())
            })
            .await?;
        let rows = body
            .get("result")
            .or_else(|| body.get("data"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        Ok(rows
            .iter()
            .map(|row| self.canonicalize_order(codec::parse_order(row)))
            .collect())
    }

    async fn get_positions(&self, symbol: Option<&str>) -> ExchangeResult<Vec<Position>> {
        let venue_symbol = symbol.map(|s| self.shared.translator.to_venue(s));
        let body = self
            .retry
            .execute("get_positions", || {
                self.rest.query_positions(venue_symbol.as_deref())
            })
            .await?;
        let rows = body.as_array().cloned().unwrap_or_default();
        let positions: Vec<Position> = rows
            .iter()
            .map(|row| {
                let mut p = codec::parse_position(row);
                p.symbol = self.shared.translator.to_canonical(&p.symbol);
                p
            })
            .collect();
        for position in &positions {
            self.shared
                .positions
                .put_if_newer(position.symbol.clone(), position.clone());
        }
        Ok(positions)
    }

    async fn get_balances(&self) -> ExchangeResult<Vec<Balance>> {
        let body = self
            .retry
            .execute("get_balances", || self.rest.query_balance())
            .await?;
        let rows: Vec<Value> = match &body {
            Value::Array(items) => items.clone(),
            Value::Object(_) => vec![body.clone()],
            _ => Vec::new(),
        };
        let balances: Vec<Balance> = rows.iter().map(|row| codec::parse_balance(row)).collect();
        for balance in &balances {
            self.shared
                .balances
                .put_if_newer(balance.currency.clone(), balance.clone());
        }
        Ok(balances)
    }

    async fn set_leverage(&self, symbol: &str, leverage: u32) -> ExchangeResult<AdjustmentOutcome> {
        // Leverage rides on the order payload for this venue
        tracing::info!(
            exchange = EXCHANGE_ID,
            symbol = %symbol,
            leverage,
            "per-symbol leverage not supported, set it on the order"
        );
        Ok(AdjustmentOutcome::Unsupported)
    }

    async fn set_margin_mode(
        &self,
        symbol: &str,
        mode: MarginMode,
    ) -> ExchangeResult<AdjustmentOutcome> {
        tracing::info!(
            exchange = EXCHANGE_ID,
            symbol = %symbol,
            mode = ?mode,
            "margin mode rides on the order payload, nothing to set"
        );
        Ok(AdjustmentOutcome::Unsupported)
    }

    async fn subscribe_ticker(&self, symbol: &str) -> ExchangeResult<()> {
        let venue_symbol = self.shared.translator.to_venue(symbol);
        self.public.subscribe("price", &venue_symbol).await?;
        if let Ok(mut set) = self.shared.ticker_symbols.lock() {
            set.insert(venue_symbol);
        }
        Ok(())
    }

    async fn subscribe_order_book(&self, symbol: &str) -> ExchangeResult<()> {
        let venue_symbol = self.shared.translator.to_venue(symbol);
        self.public.subscribe("depth_book", &venue_symbol).await
    }

    fn events(&self) -> &EventChannels {
        &self.shared.events
    }

    async fn diagnostics(&self) -> AdapterDiagnostics {
        AdapterDiagnostics {
            public_stream: Some(self.public.diagnostics().await),
            private_stream: Some(self.private.diagnostics().await),
            pending_correlations: self.shared.correlator.pending(),
            cached_orders: self.shared.orders.all().len(),
        }
    }
}

impl std::fmt::Debug for StandXAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandXAdapter")
            .field("exchange_id", &EXCHANGE_ID)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::standx::config::default_config;
    use crate::adapters::types::{OrderSide, PositionSide};

    const SEED_HEX: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

    fn adapter() -> StandXAdapter {
        let mut config = default_config();
        config.api_key = Some("test-jwt".to_string());
        config.api_secret = Some(SEED_HEX.to_string());
        StandXAdapter::new(config).unwrap()
    }

    fn adapter_with(base_url: &str, websocket: bool) -> StandXAdapter {
        let mut config = default_config();
        config.api_key = Some("test-jwt".to_string());
        config.api_secret = Some(SEED_HEX.to_string());
        config.base_url = base_url.to_string();
        config.enable_websocket = websocket;
        config.max_retry_attempts = 1;
        StandXAdapter::new(config).unwrap()
    }

    #[test]
    fn test_new_requires_credentials() {
        let config = default_config();
        assert!(matches!(
            StandXAdapter::new(config),
            Err(ExchangeError::Authentication(_))
        ));
    }

    #[test]
    fn test_order_payload_uses_venue_symbol_and_strings() {
        let a = adapter();
        let mut request = OrderRequest::limit(
            "BTC-USDC-PERP",
            OrderSide::Buy,
            "1.5".parse().unwrap(),
            "42000".parse().unwrap(),
        );
        request.leverage = Some(3);
        let payload = a.build_order_payload(&request, "arb-1");
        assert_eq!(payload["symbol"], "BTC-USD");
        assert_eq!(payload["qty"], "1.5");
        assert_eq!(payload["price"], "42000");
        assert_eq!(payload["side"], "buy");
        assert_eq!(payload["cl_ord_id"], "arb-1");
        assert_eq!(payload["leverage"], 3);
        assert_eq!(payload["reduce_only"], false);
    }

    #[tokio::test]
    async fn test_set_leverage_and_margin_mode_unsupported() {
        let a = adapter();
        assert_eq!(
            a.set_leverage("BTC-USDC-PERP", 5).await.unwrap(),
            AdjustmentOutcome::Unsupported
        );
        assert_eq!(
            a.set_margin_mode("BTC-USDC-PERP", MarginMode::Isolated)
                .await
                .unwrap(),
            AdjustmentOutcome::Unsupported
        );
    }

    #[test]
    fn test_handle_event_translates_and_caches() {
        let a = adapter();
        let order = codec::parse_order(&json!({
            "cl_ord_id": "arb-9",
            "symbol": "BTC-USD",
            "qty": "1",
            "status": "open"
        }));
        handle_event(&a.shared, "test", StreamEvent::Order(order));
        let cached = a.shared.orders.get("arb-9").unwrap();
        assert_eq!(cached.symbol, "BTC-USDC-PERP");
    }

    #[test]
    fn test_handle_event_resolves_waiter() {
        let a = adapter();
        let rx = a.shared.correlator.register("arb-10");
        let order = codec::parse_order(&json!({
            "cl_ord_id": "arb-10",
            "symbol": "BTC-USD",
            "qty": "1",
            "status": "open"
        }));
        handle_event(&a.shared, "test", StreamEvent::Order(order));
        drop(rx); // waiter resolved; receiver holds the order
        assert_eq!(a.shared.correlator.pending(), 0);
    }

    #[test]
    fn test_stale_position_snapshot_dropped() {
        let a = adapter();
        let newer = codec::parse_position(&json!({
            "symbol": "BTC-USD", "qty": "2", "time": 2_000_000i64
        }));
        let older = codec::parse_position(&json!({
            "symbol": "BTC-USD", "qty": "-5", "time": 1_000_000i64
        }));
        handle_event(&a.shared, "test", StreamEvent::Position(newer));
        handle_event(&a.shared, "test", StreamEvent::Position(older));
        let cached = a.shared.positions.get(&"BTC-USDC-PERP".to_string()).unwrap();
        assert_eq!(cached.side, PositionSide::Long);
        assert_eq!(cached.size, Decimal::TWO);
    }

    #[tokio::test]
    async fn test_create_order_full_record_path() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/new_order")
            .with_status(200)
            .with_body(
                json!({
                    "code": 0,
                    "data": {
                        "id": 551, "cl_ord_id": "arb-full", "symbol": "BTC-USD",
                        "side": "buy", "order_type": "limit", "qty": "1",
                        "price": "42000", "status": "open"
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let a = adapter_with(&server.url(), false);
        let mut request = OrderRequest::limit(
            "BTC-USDC-PERP",
            OrderSide::Buy,
            Decimal::ONE,
            "42000".parse().unwrap(),
        );
        request.client_order_id = Some("arb-full".to_string());

        let order = a.create_order(request).await.unwrap();
        assert_eq!(order.id.as_deref(), Some("551"));
        assert_eq!(order.symbol, "BTC-USDC-PERP");
        assert_eq!(order.status, OrderStatus::Open);
        assert!(a.shared.orders.get("arb-full").is_some());
    }

    #[tokio::test]
    async fn test_create_order_rejection_code_surfaces() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/new_order")
            .with_status(200)
            .with_body(json!({"code": 1001, "message": "insufficient margin"}).to_string())
            .create_async()
            .await;

        let a = adapter_with(&server.url(), false);
        let request = OrderRequest::market("BTC-USDC-PERP", OrderSide::Sell, Decimal::ONE);
        let err = a.create_order(request).await.unwrap_err();
        assert!(matches!(err, ExchangeError::Request(_)));
        assert!(err.to_string().contains("insufficient margin"));
        assert_eq!(a.shared.correlator.pending(), 0);
    }

    #[tokio::test]
    async fn test_create_order_ack_without_stream_is_pending_local() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/new_order")
            .with_status(200)
            .with_body(json!({"code": 0}).to_string())
            .create_async()
            .await;

        let a = adapter_with(&server.url(), false);
        let request = OrderRequest::market("ETH-USDC-PERP", OrderSide::Buy, Decimal::ONE);
        let order = a.create_order(request).await.unwrap();
        assert_eq!(order.status, OrderStatus::PendingLocal);
        assert!(order.client_id.is_some());
        assert_eq!(order.remaining, Decimal::ONE);
    }

    #[tokio::test]
    async fn test_get_open_orders_parses_result_rows() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/query_open_orders")
            .with_status(200)
            .with_body(
                json!({
                    "result": [
                        {"id": 1, "symbol": "BTC-USD", "qty": "1", "status": "open"},
                        {"id": 2, "symbol": "ETH-USD", "qty": "2", "status": "new"}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let a = adapter_with(&server.url(), false);
        let orders = a.get_open_orders(None).await.unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0].symbol, "BTC-USDC-PERP");
        assert_eq!(orders[1].symbol, "ETH-USDC-PERP");
    }

    #[tokio::test]
    async fn test_get_balances_accepts_object_or_array() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/query_balance")
            .with_status(200)
            .with_body(json!({"token": "DUSD", "available": "900", "balance": "1000"}).to_string())
            .create_async()
            .await;

        let a = adapter_with(&server.url(), false);
        let balances = a.get_balances().await.unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].currency, "DUSD");
        assert_eq!(balances[0].total, Decimal::from(1000));
        assert!(a
            .shared
            .balances
            .get(&"DUSD".to_string())
            .is_some());
    }

    #[tokio::test]
    async fn test_cancel_ack_by_order_id_falls_back_to_cache() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/cancel_order")
            .with_status(200)
            .with_body(json!({"code": 0}).to_string())
            .create_async()
            .await;

        let a = adapter_with(&server.url(), false);
        let known = a.canonicalize_order(codec::parse_order(&json!({
            "id": 77, "symbol": "BTC-USD", "qty": "1", "status": "open"
        })));
        a.shared.orders.apply(known);

        // No client order id to correlate on; the cached record answers
        let order = a.cancel_order(None, Some("77")).await.unwrap();
        assert_eq!(order.id.as_deref(), Some("77"));
        assert_eq!(order.symbol, "BTC-USDC-PERP");
    }

    #[tokio::test]
    async fn test_cancel_requires_some_id() {
        let a = adapter();
        assert!(matches!(
            a.cancel_order(None, None).await,
            Err(ExchangeError::Request(_))
        ));
    }
}
