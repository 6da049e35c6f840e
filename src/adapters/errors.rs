//! Exchange adapter error taxonomy
//!
//! All venue-facing errors are wrapped in ExchangeError, which implements
//! thiserror for consistent handling. Retry policy keys off
//! `is_transient()` so the retry executor stays venue-agnostic.

use thiserror::Error;

/// Exchange-specific error types for adapter operations
#[derive(Error, Debug)]
pub enum ExchangeError {
    /// Transport-level failure to establish or maintain a session
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Credentials or request signature rejected by the venue
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Venue rejected a well-formed request. Not retried.
    #[error("Request rejected: {0}")]
    Request(String),

    /// Network/5xx-class failure. Retried with backoff.
    #[error("Transient request failure: {0}")]
    TransientRequest(String),

    /// Venue rate limit hit. Treated as transient.
    #[error("Rate limited: {0}")]
    RateLimited(String),

    /// No confirmation arrived within the deadline. The order may still
    /// be live at the venue; callers must reconcile via a status query.
    #[error("No confirmation for {client_order_id} within {timeout_ms}ms")]
    CorrelationTimeout {
        client_order_id: String,
        timeout_ms: u64,
    },

    /// Malformed or unexpected payload shape
    #[error("Parse error: {0}")]
    Parse(String),

    /// Venue id not present in the adapter registry
    #[error("Unknown exchange: '{0}'")]
    UnknownExchange(String),

    /// WebSocket protocol error (boxed to reduce enum size)
    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
}

impl ExchangeError {
    /// Whether the retry executor should re-attempt the operation.
    ///
    /// Classification happens where the error is constructed (the venue
    /// wire layer); the executor only consults this flag.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ExchangeError::Connection(_)
                | ExchangeError::TransientRequest(_)
                | ExchangeError::RateLimited(_)
        )
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for ExchangeError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        ExchangeError::WebSocket(Box::new(err))
    }
}

/// Result type alias for exchange operations
pub type ExchangeResult<T> = std::result::Result<T, ExchangeError>;
