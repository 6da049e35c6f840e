//! StandX default configuration and credentials

use crate::adapters::errors::{ExchangeError, ExchangeResult};
use crate::adapters::symbols::{FormatRule, SymbolStyle, SymbolTranslator};
use crate::config::types::{ExchangeConfig, RateLimitRule};
use std::collections::HashMap;

pub const EXCHANGE_ID: &str = "standx";
pub const DEFAULT_BASE_URL: &str = "https://perps.standx.com";
pub const DEFAULT_WS_URL: &str = "wss://perps.standx.com/ws-stream/v1";
pub const DEFAULT_ORDER_WS_URL: &str = "wss://perps.standx.com/ws-api/v1";

/// Settlement token reported when a balance entry omits one
pub const DEFAULT_TOKEN: &str = "DUSD";

/// Registered defaults for the StandX venue.
pub fn default_config() -> ExchangeConfig {
    ExchangeConfig {
        exchange_id: EXCHANGE_ID.to_string(),
        name: "StandX".to_string(),
        api_key: None,
        api_secret: None,
        wallet_address: None,
        testnet: false,
        base_url: DEFAULT_BASE_URL.to_string(),
        ws_url: DEFAULT_WS_URL.to_string(),
        private_ws_url: Some(DEFAULT_ORDER_WS_URL.to_string()),
        default_leverage: 1,
        default_margin_mode: "cross".to_string(),
        symbol_mapping: HashMap::new(),
        rate_limits: HashMap::from([
            ("ticker".to_string(), RateLimitRule::new(100, 60)),
            ("orderbook".to_string(), RateLimitRule::new(100, 60)),
            ("trading".to_string(), RateLimitRule::new(20, 60)),
        ]),
        precision: HashMap::new(),
        extra_params: HashMap::new(),
        enable_websocket: true,
        enable_auto_reconnect: true,
        enable_heartbeat: true,
        connect_timeout_secs: 10,
        request_timeout_secs: 10,
        heartbeat_interval_secs: 30,
        max_retry_attempts: 3,
        retry_delay_ms: 500,
    }
}

/// Translator for StandX symbols: `BTC-USDC-PERP` <-> `BTC-USD`.
/// Explicit `symbol_mapping` entries take precedence over the rule.
pub fn build_translator(config: &ExchangeConfig) -> SymbolTranslator {
    let rule = FormatRule {
        style: SymbolStyle::BaseQuote,
        separator: "-".to_string(),
        quote_substitutions: HashMap::from([("USDC".to_string(), "USD".to_string())]),
        default_quote: "USD".to_string(),
        default_contract_type: "PERP".to_string(),
    };
    SymbolTranslator::new(
        EXCHANGE_ID,
        config.symbol_mapping.clone(),
        HashMap::new(),
        Some(rule),
    )
}

/// Credentials resolved from an `ExchangeConfig`. The JWT rides in
/// `api_key` (or `extra_params.jwt_token`), the Ed25519 private key in
/// `api_secret` (or `extra_params.private_key`).
#[derive(Debug, Clone)]
pub struct StandXCredentials {
    pub jwt_token: String,
    pub private_key: String,
}

impl StandXCredentials {
    pub fn from_config(config: &ExchangeConfig) -> ExchangeResult<Self> {
        let extra_str = |key: &str| {
            config
                .extra_params
                .get(key)
                .and_then(|v| v.as_str())
                .map(str::to_string)
        };
        let jwt_token = config
            .api_key
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| extra_str("jwt_token"))
            .ok_or_else(|| {
                ExchangeError::Authentication("standx: jwt token not configured".to_string())
            })?;
        let private_key = config
            .api_secret
            .clone()
            .filter(|s| !s.is_empty())
            .or_else(|| extra_str("private_key"))
            .ok_or_else(|| {
                ExchangeError::Authentication("standx: private key not configured".to_string())
            })?;
        Ok(Self {
            jwt_token,
            private_key,
        })
    }
}
