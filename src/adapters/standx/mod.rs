//! StandX perpetuals venue

pub mod adapter;
pub mod codec;
pub mod config;
pub mod rest;
pub mod signer;

pub use adapter::StandXAdapter;
pub use config::{default_config, EXCHANGE_ID};
