//! arb-connect: exchange connectivity for perpetual DEX venues
//!
//! Authenticated REST with retry, dual WebSocket streams with
//! reconnect, order confirmation correlation, symbol translation and
//! an adapter registry behind one venue-neutral trait.

pub mod adapters;
pub mod config;
pub mod error;

pub use adapters::{AdapterRegistry, AnyAdapter, ExchangeAdapter, OrderRequest};
pub use config::{ConfigOverrides, ExchangeConfig};
pub use error::{AppError, Result};
