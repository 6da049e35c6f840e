//! Exchange connectivity layer
//!
//! Venue adapters normalize REST and WebSocket traffic into the
//! canonical types in [`types`]; the [`registry`] builds adapters by id
//! from registered defaults plus caller overrides.

pub mod cache;
pub mod correlation;
pub mod errors;
pub mod events;
pub mod registry;
pub mod retry;
pub mod shared;
pub mod standx;
pub mod symbols;
pub mod traits;
pub mod types;

pub use errors::{ExchangeError, ExchangeResult};
pub use registry::{AdapterRegistry, AnyAdapter, ExchangeType};
pub use traits::{AdapterDiagnostics, ExchangeAdapter, OrderRequest};
