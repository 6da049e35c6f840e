//! StandX request signing
//!
//! Signed endpoints require Ed25519 over the string
//! `"{version},{request_id},{timestamp},{payload}"` where payload is
//! the request body as compact JSON with sorted keys. The signature is
//! sent base64-encoded in `x-request-signature` alongside the other
//! `x-request-*` headers.

use crate::adapters::errors::{ExchangeError, ExchangeResult};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use ed25519_dalek::{Signer, SigningKey};

/// Signature scheme version sent in `x-request-sign-version`
pub const SIGN_VERSION: &str = "v1";

/// Decode a private key given as hex (optional `0x` prefix) or base58.
/// 64-byte keys carry the public half; only the first 32 bytes (the
/// seed) are used.
fn decode_private_key(private_key: &str) -> ExchangeResult<[u8; 32]> {
    let key = private_key.trim().strip_prefix("0x").unwrap_or(private_key.trim());

    let is_hex = !key.is_empty()
        && key.len() % 2 == 0
        && key.chars().all(|c| c.is_ascii_hexdigit());

    let key_bytes = if is_hex {
        hex::decode(key)
            .map_err(|e| ExchangeError::Authentication(format!("invalid hex private key: {e}")))?
    } else {
        bs58::decode(key)
            .into_vec()
            .map_err(|e| ExchangeError::Authentication(format!("invalid base58 private key: {e}")))?
    };

    let seed: &[u8] = if key_bytes.len() == 64 {
        &key_bytes[..32]
    } else {
        &key_bytes
    };

    seed.try_into().map_err(|_| {
        ExchangeError::Authentication(format!(
            "invalid private key length, expected 32 bytes, got {}",
            key_bytes.len()
        ))
    })
}

/// Compact sorted-key JSON, the canonical form the venue verifies
/// against. serde_json maps are key-ordered, so a round trip through
/// `Value` canonicalizes any payload.
pub fn canonical_payload(payload: &serde_json::Value) -> ExchangeResult<String> {
    serde_json::to_string(payload).map_err(|e| ExchangeError::Parse(e.to_string()))
}

pub fn build_signing_message(
    version: &str,
    request_id: &str,
    timestamp: u64,
    payload: &str,
) -> String {
    format!("{version},{request_id},{timestamp},{payload}")
}

#[derive(Clone)]
pub struct StandXSigner {
    key: SigningKey,
}

impl StandXSigner {
    pub fn new(private_key: &str) -> ExchangeResult<Self> {
        let seed = decode_private_key(private_key)?;
        Ok(Self {
            key: SigningKey::from_bytes(&seed),
        })
    }

    pub fn public_key(&self) -> ed25519_dalek::VerifyingKey {
        self.key.verifying_key()
    }

    /// Sign a canonical payload string; returns the base64 signature.
    pub fn sign(&self, payload: &str, request_id: &str, timestamp: u64) -> String {
        let message = build_signing_message(SIGN_VERSION, request_id, timestamp, payload);
        let signature = self.key.sign(message.as_bytes());
        BASE64.encode(signature.to_bytes())
    }

    /// The full `x-request-*` header set for one signed request.
    pub fn signature_headers(
        &self,
        payload: &serde_json::Value,
        request_id: &str,
        timestamp: u64,
    ) -> ExchangeResult<Vec<(&'static str, String)>> {
        let canonical = canonical_payload(payload)?;
        let signature = self.sign(&canonical, request_id, timestamp);
        Ok(vec![
            ("x-request-sign-version", SIGN_VERSION.to_string()),
            ("x-request-id", request_id.to_string()),
            ("x-request-timestamp", timestamp.to_string()),
            ("x-request-signature", signature),
        ])
    }
}

impl std::fmt::Debug for StandXSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print key material
        f.debug_struct("StandXSigner").finish_non_exhaustive()
    }
}
