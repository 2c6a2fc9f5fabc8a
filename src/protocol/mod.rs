//! Protocol - wallet message codec
//!
//! Plaintext (post-decryption) JSON exchanged with the wallet.
//!
//! | Direction | Message | Shape |
//! |-----------|---------|-------|
//! | dApp → wallet | RPC request | `{"method", "params": [string], "id": "<n>"}` |
//! | wallet → dApp | RPC response | `{"id": "<n>", "result": ...}` or `{"id", "error": {code, message}}` |
//! | wallet → dApp | event | `{"event": "connect" \| "connect_error" \| "disconnect", "id", "payload"}` |

pub mod connect;
pub mod transaction;

pub use connect::{
    universal_link, Account, ConnectEventPayload, ConnectItem, ConnectItemReply, ConnectRequest,
    ConnectedWallet, DeviceInfo, TonProof, PROTOCOL_VERSION,
};
pub use transaction::{SendTransactionResponse, Transaction, TransactionMessage};

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

use crate::error::{ConnectError, ProtocolError};

/// RPC method names
pub mod methods {
    pub const SEND_TRANSACTION: &str = "sendTransaction";
    pub const DISCONNECT: &str = "disconnect";
}

/// Wallet error codes
pub mod error_codes {
    pub const UNKNOWN: u16 = 0;
    pub const BAD_REQUEST: u16 = 1;
    pub const MANIFEST_NOT_FOUND: u16 = 2;
    pub const MANIFEST_CONTENT: u16 = 3;
    pub const UNKNOWN_APP: u16 = 100;
    pub const USER_REJECTS: u16 = 300;
    pub const METHOD_NOT_SUPPORTED: u16 = 400;
}

/// Wallets send ids either as numbers or as decimal strings
fn flexible_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Id {
        Num(u64),
        Str(String),
    }
    match Id::deserialize(deserializer)? {
        Id::Num(n) => Ok(n),
        Id::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

fn id_as_string<S: Serializer>(id: &u64, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&id.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletErrorPayload {
    pub code: u16,
    #[serde(default)]
    pub message: String,
}

impl WalletErrorPayload {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code == error_codes::USER_REJECTS
    }
}

impl From<WalletErrorPayload> for ConnectError {
    fn from(e: WalletErrorPayload) -> Self {
        if e.is_user_rejection() {
            ConnectError::UserRejection { message: e.message }
        } else {
            ConnectError::Wallet { code: e.code, message: e.message }
        }
    }
}

/// Event pushed by the wallet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum WalletEvent {
    Connect {
        #[serde(deserialize_with = "flexible_id")]
        id: u64,
        payload: ConnectEventPayload,
    },
    ConnectError {
        #[serde(deserialize_with = "flexible_id", default)]
        id: u64,
        payload: WalletErrorPayload,
    },
    Disconnect {
        #[serde(deserialize_with = "flexible_id", default)]
        id: u64,
        #[serde(default)]
        payload: Value,
    },
}

impl WalletEvent {
    pub fn id(&self) -> u64 {
        match self {
            WalletEvent::Connect { id, .. }
            | WalletEvent::ConnectError { id, .. }
            | WalletEvent::Disconnect { id, .. } => *id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            WalletEvent::Connect { .. } => "connect",
            WalletEvent::ConnectError { .. } => "connect_error",
            WalletEvent::Disconnect { .. } => "disconnect",
        }
    }
}

/// Request sent to the wallet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub method: String,
    pub params: Vec<String>,
    #[serde(serialize_with = "id_as_string", deserialize_with = "flexible_id")]
    pub id: u64,
}

impl RpcRequest {
    pub fn send_transaction(id: u64, tx: &Transaction) -> Result<Self, ProtocolError> {
        Ok(Self { method: methods::SEND_TRANSACTION.into(), params: vec![serde_json::to_string(tx)?], id })
    }

    pub fn disconnect(id: u64) -> Self {
        Self { method: methods::DISCONNECT.into(), params: Vec::new(), id }
    }
}

/// Success value or wallet error
pub type RpcOutcome = Result<Value, WalletErrorPayload>;

/// Response matched to an [`RpcRequest`] by id
#[derive(Debug, Clone, PartialEq)]
pub struct RpcResponse {
    pub id: u64,
    pub outcome: RpcOutcome,
}

#[derive(Serialize, Deserialize)]
struct RawRpcResponse {
    #[serde(serialize_with = "id_as_string", deserialize_with = "flexible_id")]
    id: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<WalletErrorPayload>,
}

impl RpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self { id, outcome: Ok(result) }
    }

    pub fn error(id: u64, code: u16, message: impl Into<String>) -> Self {
        Self { id, outcome: Err(WalletErrorPayload::new(code, message)) }
    }

    pub fn to_json(&self) -> Result<Vec<u8>, ProtocolError> {
        let raw = match &self.outcome {
            Ok(result) => RawRpcResponse { id: self.id, result: Some(result.clone()), error: None },
            Err(error) => RawRpcResponse { id: self.id, result: None, error: Some(error.clone()) },
        };
        Ok(serde_json::to_vec(&raw)?)
    }
}

/// Any decrypted message from the wallet
#[derive(Debug, Clone, PartialEq)]
pub enum WalletMessage {
    Event(WalletEvent),
    Response(RpcResponse),
}

/// Decode a decrypted wallet message
pub fn decode_wallet_message(plaintext: &[u8]) -> Result<WalletMessage, ProtocolError> {
    let value: Value = serde_json::from_slice(plaintext)?;
    let object = value.as_object().ok_or(ProtocolError::UnknownMessage)?;

    if object.contains_key("event") {
        return Ok(WalletMessage::Event(serde_json::from_value(value)?));
    }
    if object.contains_key("id") && (object.contains_key("result") || object.contains_key("error")) {
        let raw: RawRpcResponse = serde_json::from_value(value)?;
        let outcome = match (raw.error, raw.result) {
            (Some(error), _) => Err(error),
            (None, Some(result)) => Ok(result),
            (None, None) => return Err(ProtocolError::UnknownMessage),
        };
        return Ok(WalletMessage::Response(RpcResponse { id: raw.id, outcome }));
    }
    Err(ProtocolError::UnknownMessage)
}

/// Encode a request for encryption
pub fn encode_request(request: &RpcRequest) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(request)?)
}

/// Encode a wallet event (wallet side of the protocol)
pub fn encode_event(event: &WalletEvent) -> Result<Vec<u8>, ProtocolError> {
    Ok(serde_json::to_vec(event)?)
}
