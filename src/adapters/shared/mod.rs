//! Shared adapter infrastructure

pub mod stream;
pub mod websocket;

pub use stream::{ReconnectConfig, StreamDiagnostics, StreamEvent, StreamSession, WireCodec};
pub use websocket::{connect_tls, TlsWebSocketStream};
