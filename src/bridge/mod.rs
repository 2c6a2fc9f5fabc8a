//! Bridge - relay transport between dApp and wallet
//!
//! The bridge forwards opaque ciphertexts between two public keys. One
//! long-lived subscription per session key receives inbound envelopes; sends
//! are fire-and-forget POSTs.
//!
//! # Wire Format
//!
//! | Direction | Request | Body |
//! |-----------|---------|------|
//! | subscribe | `GET {bridge}/events?client_id={hex}[&last_event_id={id}]` | SSE, `data: {"from": hex, "message": base64}` |
//! | send | `POST {bridge}/message?client_id={hex}&to={hex}&ttl={s}&topic={method}` | base64 ciphertext |

pub mod backoff;
#[cfg(feature = "http")]
mod http;

pub use backoff::BackoffConfig;
#[cfg(feature = "http")]
pub use http::HttpBridge;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::crypto::{self, KEY_LEN};
use crate::error::{ProtocolError, TransportError};

/// Stream of inbound envelopes. An `Err` item is terminal: the transport gave up.
pub type EnvelopeStream = BoxStream<'static, Result<InboundEnvelope, TransportError>>;

/// Encrypted message received from the bridge
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundEnvelope {
    /// Bridge event id, usable as `last_event_id` on resubscription
    pub event_id: Option<String>,
    /// Sender public key
    pub from: [u8; KEY_LEN],
    /// `nonce || ciphertext`
    pub message: Vec<u8>,
}

/// JSON carried in each SSE `data` field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BridgeMessage {
    pub from: String,
    pub message: String,
}

impl InboundEnvelope {
    /// Decode an SSE data payload
    pub fn from_bridge_json(event_id: Option<String>, data: &str) -> Result<Self, ProtocolError> {
        let raw: BridgeMessage = serde_json::from_str(data)?;
        let from = crypto::key_from_hex(&raw.from).map_err(|e| ProtocolError::InvalidField {
            field: "from",
            reason: e.to_string(),
        })?;
        let message = BASE64.decode(raw.message.as_bytes()).map_err(|e| {
            ProtocolError::InvalidField { field: "message", reason: e.to_string() }
        })?;
        Ok(Self { event_id, from, message })
    }

    pub fn to_bridge_json(&self) -> String {
        serde_json::json!({
            "from": hex::encode(self.from),
            "message": BASE64.encode(&self.message),
        })
        .to_string()
    }
}

/// Relay transport used by the connector
#[async_trait]
pub trait BridgeTransport: Send + Sync {
    /// Open a lazy, self-healing subscription for `client_id`.
    ///
    /// Reconnects on its own, resuming after the last seen event id. Ends
    /// with an `Err` only when reconnection is abandoned.
    fn subscribe(
        &self,
        bridge_url: &str,
        client_id: &[u8; KEY_LEN],
        last_event_id: Option<String>,
    ) -> EnvelopeStream;

    /// Post one ciphertext to `to`. At-least-once, no logical retries.
    async fn send(
        &self,
        bridge_url: &str,
        from: &[u8; KEY_LEN],
        to: &[u8; KEY_LEN],
        message: &[u8],
        topic: Option<&str>,
    ) -> Result<(), TransportError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_json_roundtrip() {
        let envelope = InboundEnvelope {
            event_id: Some("17".into()),
            from: [7u8; KEY_LEN],
            message: vec![1, 2, 3, 4],
        };
        let decoded =
            InboundEnvelope::from_bridge_json(Some("17".into()), &envelope.to_bridge_json()).unwrap();
        assert_eq!(decoded, envelope);
    }

    #[test]
    fn test_bad_sender_rejected() {
        let err = InboundEnvelope::from_bridge_json(None, r#"{"from":"abcd","message":""}"#)
            .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidField { field: "from", .. }));
    }

    #[test]
    fn test_bad_base64_rejected() {
        let data = format!(r#"{{"from":"{}","message":"!!!"}}"#, hex::encode([1u8; 32]));
        let err = InboundEnvelope::from_bridge_json(None, &data).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidField { field: "message", .. }));
    }

    #[test]
    fn test_not_json_rejected() {
        assert!(matches!(
            InboundEnvelope::from_bridge_json(None, "ping").unwrap_err(),
            ProtocolError::Json(_)
        ));
    }
}
