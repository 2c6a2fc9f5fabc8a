//! `sendTransaction` request body

use serde::{Deserialize, Serialize};

/// Default validity window for a transaction request (15 minutes)
pub const DEFAULT_VALIDITY_SECS: i64 = 900;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMessage {
    /// Destination address
    pub address: String,
    /// Amount in nanotons, decimal string
    pub amount: String,
    /// Cell BoC, base64
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_init: Option<String>,
}

impl TransactionMessage {
    pub fn new(address: impl Into<String>, amount: impl Into<String>) -> Self {
        Self { address: address.into(), amount: amount.into(), payload: None, state_init: None }
    }

    pub fn with_payload(mut self, payload: impl Into<String>) -> Self {
        self.payload = Some(payload.into());
        self
    }

    pub fn with_state_init(mut self, state_init: impl Into<String>) -> Self {
        self.state_init = Some(state_init.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unix timestamp after which the wallet must refuse to sign
    pub valid_until: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    pub messages: Vec<TransactionMessage>,
}

impl Transaction {
    /// Transaction valid for `validity_secs` from now
    pub fn new(messages: Vec<TransactionMessage>, validity_secs: i64) -> Self {
        Self {
            valid_until: chrono::Utc::now().timestamp() + validity_secs,
            network: None,
            from: None,
            messages,
        }
    }

    /// Single transfer with the default validity window
    pub fn single(address: impl Into<String>, amount: impl Into<String>, payload: Option<String>) -> Self {
        let mut message = TransactionMessage::new(address, amount);
        message.payload = payload;
        Self::new(vec![message], DEFAULT_VALIDITY_SECS)
    }

    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.network = Some(network.into());
        self
    }

    pub fn with_from(mut self, from: impl Into<String>) -> Self {
        self.from = Some(from.into());
        self
    }
}

/// Wallet reply to `sendTransaction`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SendTransactionResponse {
    /// Signed external message BoC, base64
    pub boc: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_single_wire_shape() {
        let tx = Transaction::single("0:00", "1", None);
        let value = serde_json::to_value(&tx).unwrap();
        assert_eq!(value["messages"], json!([{"address": "0:00", "amount": "1"}]));
        assert!(value.get("network").is_none());

        let now = chrono::Utc::now().timestamp();
        assert!(tx.valid_until > now && tx.valid_until <= now + DEFAULT_VALIDITY_SECS);
    }

    #[test]
    fn test_state_init_is_camel_case() {
        let message = TransactionMessage::new("0:01", "5").with_payload("te6cc").with_state_init("te6si");
        let value = serde_json::to_value(&message).unwrap();
        assert_eq!(value["stateInit"], "te6si");
        assert_eq!(value["payload"], "te6cc");
    }
}
