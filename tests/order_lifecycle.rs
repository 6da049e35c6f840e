//! End-to-end flows against a mocked REST venue, driven through the
//! registry and the venue-neutral adapter trait.

use arb_connect::adapters::errors::ExchangeError;
use arb_connect::adapters::types::{OrderSide, OrderStatus};
use arb_connect::{AdapterRegistry, ConfigOverrides, ExchangeAdapter, OrderRequest};
use futures_util::{SinkExt, StreamExt};
use rust_decimal::Decimal;
use serde_json::json;
use tokio_tungstenite::tungstenite::Message;

const SEED_HEX: &str = "9d61b19deffd5a60ba844af492ec2cc44449c5697b326919703bac031cae7f60";

fn overrides_for(server: &mockito::ServerGuard) -> ConfigOverrides {
    ConfigOverrides {
        api_key: Some("test-jwt".to_string()),
        api_secret: Some(SEED_HEX.to_string()),
        base_url: Some(server.url()),
        enable_websocket: Some(false),
        max_retry_attempts: Some(2),
        retry_delay_ms: Some(1),
        ..Default::default()
    }
}

#[tokio::test]
async fn submit_then_cancel_round_trip() {
    let mut server = mockito::Server::new_async().await;
    let registry = AdapterRegistry::with_builtins();
    let adapter = registry.create("standx", &overrides_for(&server)).unwrap();

    let submit = server
        .mock("POST", "/api/new_order")
        .match_header("x-request-sign-version", "v1")
        .with_status(200)
        .with_body(
            json!({
                "code": 0,
                "data": {
                    "id": 1001, "cl_ord_id": "it-1", "symbol": "BTC-USD",
                    "side": "buy", "order_type": "limit",
                    "qty": "1", "price": "42000", "status": "new"
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let mut request = OrderRequest::limit(
        "BTC-USDC-PERP",
        OrderSide::Buy,
        Decimal::ONE,
        "42000".parse().unwrap(),
    );
    request.client_order_id = Some("it-1".to_string());

    let order = adapter.create_order(request).await.unwrap();
    assert_eq!(order.id.as_deref(), Some("1001"));
    assert_eq!(order.symbol, "BTC-USDC-PERP");
    assert_eq!(order.status, OrderStatus::Open);
    submit.assert_async().await;

    let cancel = server
        .mock("POST", "/api/cancel_order")
        .with_status(200)
        .with_body(
            json!({
                "code": 0,
                "data": {
                    "id": 1001, "cl_ord_id": "it-1", "symbol": "BTC-USD",
                    "side": "buy", "order_type": "limit",
                    "qty": "1", "price": "42000", "status": "canceled"
                }
            })
            .to_string(),
        )
        .create_async()
        .await;

    let canceled = adapter.cancel_order(Some("it-1"), None).await.unwrap();
    assert_eq!(canceled.status, OrderStatus::Canceled);
    cancel.assert_async().await;
}

/// Minimal stand-in for the venue's stream endpoints. Every session
/// that connects is accepted; the one that logs in over the order
/// socket gets `record` pushed a few times, spaced out so the waiter
/// is parked by the time the first copy lands.
fn spawn_ws_venue(listener: tokio::net::TcpListener, record: serde_json::Value) {
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            let record = record.clone();
            tokio::spawn(async move {
                let Ok(mut ws) = tokio_tungstenite::accept_async(socket).await else {
                    return;
                };
                while let Some(Ok(message)) = ws.next().await {
                    let Message::Text(text) = message else {
                        continue;
                    };
                    if !text.contains("auth:login") {
                        continue;
                    }
                    let frame = json!({ "channel": "order", "data": record }).to_string();
                    for _ in 0..3 {
                        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
                        if ws.send(Message::Text(frame.clone())).await.is_err() {
                            return;
                        }
                    }
                }
            });
        }
    });
}

#[tokio::test]
async fn ack_only_submission_confirmed_by_private_stream() {
    let mut server = mockito::Server::new_async().await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let ws_url = format!("ws://{}", listener.local_addr().unwrap());
    spawn_ws_venue(
        listener,
        json!({
            "id": 9001, "cl_ord_id": "arb-abc", "symbol": "BTC-USD",
            "side": "buy", "order_type": "limit",
            "qty": "1", "price": "42000", "status": "open"
        }),
    );

    let submit = server
        .mock("POST", "/api/new_order")
        .with_status(200)
        .with_body(json!({"code": 0}).to_string())
        .create_async()
        .await;

    let overrides = ConfigOverrides {
        enable_websocket: Some(true),
        ws_url: Some(ws_url.clone()),
        private_ws_url: Some(ws_url),
        enable_heartbeat: Some(false),
        request_timeout_secs: Some(5),
        ..overrides_for(&server)
    };
    let registry = AdapterRegistry::with_builtins();
    let adapter = registry.create("standx", &overrides).unwrap();
    adapter.connect().await.unwrap();

    let mut request = OrderRequest::limit(
        "BTC-USDC-PERP",
        OrderSide::Buy,
        Decimal::ONE,
        "42000".parse().unwrap(),
    );
    request.client_order_id = Some("arb-abc".to_string());

    // REST answers with a bare ack; the record arrives on the stream
    let order = adapter.create_order(request).await.unwrap();
    assert_eq!(order.id.as_deref(), Some("9001"));
    assert_eq!(order.symbol, "BTC-USDC-PERP");
    assert_eq!(order.status, OrderStatus::Open);
    submit.assert_async().await;

    // Repeated stream copies converge on a single cached record
    let diag = adapter.diagnostics().await;
    assert_eq!(diag.cached_orders, 1);
    assert_eq!(diag.pending_correlations, 0);

    adapter.disconnect().await.unwrap();
}

#[tokio::test]
async fn transient_server_errors_are_retried_then_surface() {
    let mut server = mockito::Server::new_async().await;
    let registry = AdapterRegistry::with_builtins();
    let adapter = registry.create("standx", &overrides_for(&server)).unwrap();

    let mock = server
        .mock("GET", "/api/query_balance")
        .with_status(503)
        .expect(2)
        .create_async()
        .await;

    let err = adapter.get_balances().await.unwrap_err();
    assert!(matches!(err, ExchangeError::TransientRequest(_)));
    // max_retry_attempts = 2 means exactly two calls
    mock.assert_async().await;
}

#[tokio::test]
async fn order_rejection_is_not_retried() {
    let mut server = mockito::Server::new_async().await;
    let registry = AdapterRegistry::with_builtins();
    let adapter = registry.create("standx", &overrides_for(&server)).unwrap();

    let mock = server
        .mock("POST", "/api/new_order")
        .with_status(400)
        .with_body("qty below minimum")
        .expect(1)
        .create_async()
        .await;

    let request = OrderRequest::market("ETH-USDC-PERP", OrderSide::Sell, Decimal::ONE);
    let err = adapter.create_order(request).await.unwrap_err();
    assert!(matches!(err, ExchangeError::Request(_)));
    mock.assert_async().await;
}

#[tokio::test]
async fn market_data_translates_symbols_both_ways() {
    let mut server = mockito::Server::new_async().await;
    let registry = AdapterRegistry::with_builtins();
    let adapter = registry.create("standx", &overrides_for(&server)).unwrap();

    server
        .mock("GET", "/api/query_symbol_price")
        .match_query(mockito::Matcher::UrlEncoded(
            "symbol".into(),
            "SOL-USD".into(),
        ))
        .with_status(200)
        .with_body(
            json!({
                "symbol": "SOL-USD",
                "spread": ["150.1", "150.2"],
                "last_price": "150.15",
                "mark_price": "150.12"
            })
            .to_string(),
        )
        .create_async()
        .await;

    // Canonical in, canonical out; the venue never sees SOL-USDC-PERP
    let ticker = adapter.get_ticker("SOL-USDC-PERP").await.unwrap();
    assert_eq!(ticker.symbol, "SOL-USDC-PERP");
    assert_eq!(ticker.bid, Some("150.1".parse().unwrap()));
    assert_eq!(ticker.ask, Some("150.2".parse().unwrap()));

    server
        .mock("GET", "/api/query_depth_book")
        .match_query(mockito::Matcher::UrlEncoded(
            "symbol".into(),
            "SOL-USD".into(),
        ))
        .with_status(200)
        .with_body(
            json!({
                "symbol": "SOL-USD",
                "bids": [["150.0", "5"], ["150.1", "2"]],
                "asks": [["150.3", "1"], ["150.2", "4"]]
            })
            .to_string(),
        )
        .create_async()
        .await;

    let book = adapter.get_order_book("SOL-USDC-PERP").await.unwrap();
    assert_eq!(book.symbol, "SOL-USDC-PERP");
    assert_eq!(book.best_bid(), Some(150.1));
    assert_eq!(book.best_ask(), Some(150.2));
}

#[tokio::test]
async fn positions_and_balances_normalize() {
    let mut server = mockito::Server::new_async().await;
    let registry = AdapterRegistry::with_builtins();
    let adapter = registry.create("standx", &overrides_for(&server)).unwrap();

    server
        .mock("GET", "/api/query_positions")
        .with_status(200)
        .with_body(
            json!([{
                "symbol": "BTC-USD", "qty": "-0.5", "entry_price": "42000",
                "mark_price": "41900", "upnl": "50", "leverage": 3,
                "margin_mode": "cross", "holding_margin": "7000"
            }])
            .to_string(),
        )
        .create_async()
        .await;

    let positions = adapter.get_positions(None).await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].symbol, "BTC-USDC-PERP");
    assert_eq!(positions[0].size, "0.5".parse().unwrap());

    server
        .mock("GET", "/api/query_balance")
        .with_status(200)
        .with_body(json!([{"token": "DUSD", "available": "1000", "balance": "1200", "locked": "200"}]).to_string())
        .create_async()
        .await;

    let balances = adapter.get_balances().await.unwrap();
    assert_eq!(balances.len(), 1);
    assert_eq!(balances[0].free, Decimal::from(1000));
    assert_eq!(balances[0].used, Decimal::from(200));
}

#[tokio::test]
async fn get_or_create_shares_one_instance() {
    let server = mockito::Server::new_async().await;
    let registry = AdapterRegistry::with_builtins();

    let a = registry
        .get_or_create("standx", &overrides_for(&server))
        .await
        .unwrap();
    let b = registry
        .get_or_create("standx", &ConfigOverrides::default())
        .await
        .unwrap();
    assert!(std::sync::Arc::ptr_eq(&a, &b));
    assert_eq!(a.exchange_id(), "standx");
}
