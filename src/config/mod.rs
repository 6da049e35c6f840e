//! Configuration module

pub mod logging;
pub mod types;

pub use logging::init_logging;
pub use types::{ConfigOverrides, ExchangeConfig, RateLimitRule};
