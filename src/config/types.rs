//! Configuration types for exchange adapters
//!
//! Each registered venue carries a default `ExchangeConfig`; callers
//! supply `ConfigOverrides` at creation time, merged field by field.
//! Serde-compatible so configs load from YAML.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::error::AppError;

// ============================================================================
// Rate limits
// ============================================================================

/// One rate-limit rule: at most `max_requests` per `time_window_secs`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct RateLimitRule {
    pub max_requests: u32,
    pub time_window_secs: u64,
}

impl RateLimitRule {
    pub fn new(max_requests: u32, time_window_secs: u64) -> Self {
        Self {
            max_requests,
            time_window_secs,
        }
    }
}

// ============================================================================
// Exchange configuration
// ============================================================================

/// Full per-venue configuration. Registered defaults provide every
/// field; user overrides replace scalars and merge maps key-wise.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeConfig {
    /// Registry id (e.g. "standx")
    pub exchange_id: String,
    /// Human-readable venue name
    pub name: String,

    // Credentials
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<String>,

    // Endpoints
    #[serde(default)]
    pub testnet: bool,
    pub base_url: String,
    pub ws_url: String,
    #[serde(default)]
    pub private_ws_url: Option<String>,

    // Trading defaults
    #[serde(default = "default_leverage")]
    pub default_leverage: u32,
    #[serde(default = "default_margin_mode")]
    pub default_margin_mode: String,

    // Map-typed fields: merged key-wise on override
    /// Canonical symbol -> venue symbol
    #[serde(default)]
    pub symbol_mapping: HashMap<String, String>,
    /// Operation class (e.g. "ticker", "orderbook", "trading") -> rule
    #[serde(default)]
    pub rate_limits: HashMap<String, RateLimitRule>,
    /// Venue symbol -> decimal places for qty/price rounding
    #[serde(default)]
    pub precision: HashMap<String, u32>,
    /// Free-form venue-specific knobs
    #[serde(default)]
    pub extra_params: HashMap<String, serde_json::Value>,

    // Connection behavior
    #[serde(default = "default_true")]
    pub enable_websocket: bool,
    #[serde(default = "default_true")]
    pub enable_auto_reconnect: bool,
    #[serde(default = "default_true")]
    pub enable_heartbeat: bool,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retry_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
}

fn default_leverage() -> u32 {
    1
}
fn default_margin_mode() -> String {
    "cross".to_string()
}
fn default_true() -> bool {
    true
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_request_timeout() -> u64 {
    10
}
fn default_heartbeat_interval() -> u64 {
    30
}
fn default_max_retries() -> u32 {
    3
}
fn default_retry_delay() -> u64 {
    500
}

impl ExchangeConfig {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.exchange_id.trim().is_empty() {
            return Err(AppError::Config("exchange_id cannot be empty".to_string()));
        }
        if self.base_url.trim().is_empty() {
            return Err(AppError::Config(format!(
                "'{}': base_url cannot be empty",
                self.exchange_id
            )));
        }
        if self.enable_websocket && self.ws_url.trim().is_empty() {
            return Err(AppError::Config(format!(
                "'{}': ws_url required when websocket is enabled",
                self.exchange_id
            )));
        }
        if self.default_leverage == 0 {
            return Err(AppError::Config(format!(
                "'{}': default_leverage must be >= 1",
                self.exchange_id
            )));
        }
        for (class, rule) in &self.rate_limits {
            if rule.max_requests == 0 || rule.time_window_secs == 0 {
                return Err(AppError::Config(format!(
                    "'{}': rate limit '{}' must have non-zero requests and window",
                    self.exchange_id, class
                )));
            }
        }
        Ok(())
    }
}

// ============================================================================
// Overrides
// ============================================================================

/// Caller-supplied partial configuration. `None` leaves the registered
/// default untouched; map fields are merged, never replaced wholesale.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigOverrides {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub api_secret: Option<String>,
    #[serde(default)]
    pub wallet_address: Option<String>,
    #[serde(default)]
    pub testnet: Option<bool>,
    #[serde(default)]
    pub base_url: Option<String>,
    #[serde(default)]
    pub ws_url: Option<String>,
    #[serde(default)]
    pub private_ws_url: Option<String>,
    #[serde(default)]
    pub default_leverage: Option<u32>,
    #[serde(default)]
    pub default_margin_mode: Option<String>,
    #[serde(default)]
    pub symbol_mapping: Option<HashMap<String, String>>,
    #[serde(default)]
    pub rate_limits: Option<HashMap<String, RateLimitRule>>,
    #[serde(default)]
    pub precision: Option<HashMap<String, u32>>,
    #[serde(default)]
    pub extra_params: Option<HashMap<String, serde_json::Value>>,
    #[serde(default)]
    pub enable_websocket: Option<bool>,
    #[serde(default)]
    pub enable_auto_reconnect: Option<bool>,
    #[serde(default)]
    pub enable_heartbeat: Option<bool>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub heartbeat_interval_secs: Option<u64>,
    #[serde(default)]
    pub max_retry_attempts: Option<u32>,
    #[serde(default)]
    pub retry_delay_ms: Option<u64>,
}

impl ConfigOverrides {
    /// Merge these overrides onto a registered default config.
    ///
    /// Scalars: replaced when present. Maps: default entries kept,
    /// override keys inserted on top.
    pub fn apply_to(&self, mut config: ExchangeConfig) -> ExchangeConfig {
        macro_rules! set_scalar {
            ($field:ident) => {
                if let Some(v) = &self.$field {
                    config.$field = Some(v.clone());
                }
            };
        }
        macro_rules! set_plain {
            ($field:ident) => {
                if let Some(v) = self.$field.clone() {
                    config.$field = v;
                }
            };
        }
        macro_rules! merge_map {
            ($field:ident) => {
                if let Some(overrides) = &self.$field {
                    for (k, v) in overrides {
                        config.$field.insert(k.clone(), v.clone());
                    }
                }
            };
        }

        set_scalar!(api_key);
        set_scalar!(api_secret);
        set_scalar!(wallet_address);
        set_scalar!(private_ws_url);
        set_plain!(testnet);
        set_plain!(base_url);
        set_plain!(ws_url);
        set_plain!(default_leverage);
        set_plain!(default_margin_mode);
        set_plain!(enable_websocket);
        set_plain!(enable_auto_reconnect);
        set_plain!(enable_heartbeat);
        set_plain!(connect_timeout_secs);
        set_plain!(request_timeout_secs);
        set_plain!(heartbeat_interval_secs);
        set_plain!(max_retry_attempts);
        set_plain!(retry_delay_ms);
        merge_map!(symbol_mapping);
        merge_map!(rate_limits);
        merge_map!(precision);
        merge_map!(extra_params);

        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_config() -> ExchangeConfig {
        ExchangeConfig {
            exchange_id: "standx".to_string(),
            name: "StandX".to_string(),
            api_key: None,
            api_secret: None,
            wallet_address: None,
            testnet: false,
            base_url: "https://perps.standx.com".to_string(),
            ws_url: "wss://perps.standx.com/ws-stream/v1".to_string(),
            private_ws_url: Some("wss://perps.standx.com/ws-api/v1".to_string()),
            default_leverage: 1,
            default_margin_mode: "cross".to_string(),
            symbol_mapping: HashMap::from([(
                "BTC-USDC-PERP".to_string(),
                "BTC-USD".to_string(),
            )]),
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

    #[test]
    fn test_scalar_override_replaces() {
        let overrides = ConfigOverrides {
            api_key: Some("jwt-token".to_string()),
            testnet: Some(true),
            ..Default::default()
        };
        let merged = overrides.apply_to(base_config());
        assert_eq!(merged.api_key.as_deref(), Some("jwt-token"));
        assert!(merged.testnet);
        // untouched scalar keeps its default
        assert_eq!(merged.base_url, "https://perps.standx.com");
    }

    #[test]
    fn test_map_override_merges_key_wise() {
        let overrides = ConfigOverrides {
            rate_limits: Some(HashMap::from([(
                "trading".to_string(),
                RateLimitRule::new(5, 60),
            )])),
            symbol_mapping: Some(HashMap::from([(
                "ETH-USDC-PERP".to_string(),
                "ETH-USD".to_string(),
            )])),
            ..Default::default()
        };
        let merged = overrides.apply_to(base_config());

        // overridden key replaced
        assert_eq!(merged.rate_limits["trading"], RateLimitRule::new(5, 60));
        // default keys survive
        assert_eq!(merged.rate_limits["ticker"], RateLimitRule::new(100, 60));
        assert_eq!(merged.rate_limits["orderbook"], RateLimitRule::new(100, 60));
        // symbol map gains the new key, keeps the old
        assert_eq!(merged.symbol_mapping.len(), 2);
        assert_eq!(merged.symbol_mapping["BTC-USDC-PERP"], "BTC-USD");
    }

    #[test]
    fn test_empty_overrides_are_identity() {
        let merged = ConfigOverrides::default().apply_to(base_config());
        let base = base_config();
        assert_eq!(merged.base_url, base.base_url);
        assert_eq!(merged.rate_limits.len(), base.rate_limits.len());
        assert_eq!(merged.default_leverage, base.default_leverage);
    }

    #[test]
    fn test_validate_rejects_bad_configs() {
        let mut config = base_config();
        config.base_url = String::new();
        assert!(config.validate().is_err());

        let mut config = base_config();
        config.default_leverage = 0;
        assert!(config.validate().is_err());

        let mut config = base_config();
        config
            .rate_limits
            .insert("bad".to_string(), RateLimitRule::new(0, 60));
        assert!(config.validate().is_err());

        assert!(base_config().validate().is_ok());
    }

    #[test]
    fn test_config_yaml_round_trip() {
        let config = base_config();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let back: ExchangeConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(back.exchange_id, "standx");
        assert_eq!(back.rate_limits["trading"], RateLimitRule::new(20, 60));
    }
}
