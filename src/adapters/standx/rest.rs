//! StandX REST client
//!
//! Thin wrapper over the venue's `/api/*` endpoints. Public queries go
//! out bare, account queries carry the bearer token, and order
//! mutations additionally carry the Ed25519 signature headers. Raw
//! JSON comes back; the codec parsers normalize it.

use crate::adapters::errors::{ExchangeError, ExchangeResult};
use crate::adapters::standx::signer::StandXSigner;
use crate::adapters::types::current_time_ms;
use serde_json::Value;

pub struct StandXRest {
    client: reqwest::Client,
    base_url: String,
    jwt_token: String,
    signer: Option<StandXSigner>,
    session_id: Option<String>,
}

impl StandXRest {
    pub fn new(
        client: reqwest::Client,
        base_url: &str,
        jwt_token: &str,
        signer: Option<StandXSigner>,
        session_id: Option<String>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            jwt_token: jwt_token.to_string(),
            signer,
            session_id,
        }
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/{}", self.base_url, endpoint)
    }

    /// Map a response to its JSON body, classifying HTTP failures so
    /// the retry executor can tell transient from permanent.
    async fn into_json(response: reqwest::Response) -> ExchangeResult<Value> {
        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ExchangeError::RateLimited(format!(
                "HTTP 429 from {}",
                response.url()
            )));
        }
        if status.is_server_error() {
            return Err(ExchangeError::TransientRequest(format!(
                "HTTP {} from {}",
                status,
                response.url()
            )));
        }
        if status.as_u16() == 401 || status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Authentication(format!(
                "HTTP {status}: {body}"
            )));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExchangeError::Request(format!("HTTP {status}: {body}")));
        }
        response
            .json()
            .await
            .map_err(|e| ExchangeError::Parse(format!("response body: {e}")))
    }

    fn map_send_error(e: reqwest::Error) -> ExchangeError {
        if e.is_timeout() || e.is_connect() {
            ExchangeError::Connection(e.to_string())
        } else {
            ExchangeError::TransientRequest(e.to_string())
        }
    }

    async fn get(&self, endpoint: &str, params: &[(&str, String)], auth: bool) -> ExchangeResult<Value> {
        let mut request = self.client.get(self.url(endpoint)).query(params);
        if auth && !self.jwt_token.is_empty() {
            request = request.bearer_auth(&self.jwt_token);
        }
        let response = request.send().await.map_err(Self::map_send_error)?;
        Self::into_json(response).await
    }

    async fn signed_post(&self, endpoint: &str, payload: &Value) -> ExchangeResult<Value> {
        let mut request = self.client.post(self.url(endpoint)).json(payload);
        if !self.jwt_token.is_empty() {
            request = request.bearer_auth(&self.jwt_token);
        }
        if let Some(signer) = &self.signer {
            let request_id = format!("req-{}", uuid::Uuid::new_v4());
            let timestamp = current_time_ms();
            for (name, value) in signer.signature_headers(payload, &request_id, timestamp)? {
                request = request.header(name, value);
            }
        }
        if let Some(session_id) = &self.session_id {
            request = request.header("x-session-id", session_id);
        }
        let response = request.send().await.map_err(Self::map_send_error)?;
        Self::into_json(response).await
    }

    // === Public endpoints ===

    pub async fn query_symbol_price(&self, venue_symbol: &str) -> ExchangeResult<Value> {
        self.get(
            "query_symbol_price",
            &[("symbol", venue_symbol.to_string())],
            false,
        )
        .await
    }

    pub async fn query_depth_book(&self, venue_symbol: &str) -> ExchangeResult<Value> {
        self.get(
            "query_depth_book",
            &[("symbol", venue_symbol.to_string())],
            false,
        )
        .await
    }

    pub async fn query_funding_rates(
        &self,
        venue_symbol: &str,
        start_time: u64,
        end_time: u64,
    ) -> ExchangeResult<Value> {
        self.get(
            "query_funding_rates",
            &[
                ("symbol", venue_symbol.to_string()),
                ("start_time", start_time.to_string()),
                ("end_time", end_time.to_string()),
            ],
            false,
        )
        .await
    }

    // === Signed endpoints ===

    pub async fn new_order(&self, payload: &Value) -> ExchangeResult<Value> {
        self.signed_post("new_order", payload).await
    }

    pub async fn cancel_order(&self, payload: &Value) -> ExchangeResult<Value> {
        self.signed_post("cancel_order", payload).await
    }

    // === Authenticated queries ===

    pub async fn query_order(&self, order_id: &str) -> ExchangeResult<Value> {
        self.get("query_order", &[("order_id", order_id.to_string())], true)
            .await
    }

    pub async fn query_open_orders(&self, venue_symbol: Option<&str>) -> ExchangeResult<Value> {
        let params: Vec<(&str, String)> = venue_symbol
            .map(|s| vec![("symbol", s.to_string())])
            .unwrap_or_default();
        self.get("query_open_orders", &params, true).await
    }

    pub async fn query_positions(&self, venue_symbol: Option<&str>) -> ExchangeResult<Value> {
        let params: Vec<(&str, String)> = venue_symbol
            .map(|s| vec![("symbol", s.to_string())])
            .unwrap_or_default();
        self.get("query_positions", &params, true).await
    }

    pub async fn query_balance(&self) -> ExchangeResult<Value> {
        self.get("query_balance", &[], true).await
    }
}

impl std::fmt::Debug for StandXRest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StandXRest")
            .field("base_url", &self.base_url)
            .field("signed", &self.signer.is_some())
            .finish()
    }
}
