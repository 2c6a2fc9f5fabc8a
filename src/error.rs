//! Error taxonomy
//!
//! Each layer owns its error enum; [`ConnectError`] is what callers of the
//! connector see. Transport and protocol errors raised inside the background
//! subscription never reach callers directly.

use std::time::Duration;
use thiserror::Error;

/// Key generation, agreement and AEAD failures. Fatal for the operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("Entropy source failure: {0}")]
    Entropy(String),

    #[error("Invalid key length: expected {expected}, got {got}")]
    InvalidKeyLength { expected: usize, got: usize },

    #[error("Remote public key is a low-order point")]
    WeakPublicKey,

    #[error("Message too large: {len} bytes (max {max})")]
    MessageTooLarge { len: usize, max: usize },

    #[error("Ciphertext truncated")]
    Truncated,

    #[error("Decryption failed")]
    Decrypt,
}

/// Bridge failures. Transient ones are retried inside the transport.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("HTTP: {0}")]
    Http(String),

    #[error("Bridge returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Invalid bridge URL: {0}")]
    InvalidUrl(String),

    #[error("Subscription closed")]
    Closed,

    #[error("Bridge unreachable for {elapsed:?}, giving up")]
    ReconnectExhausted { elapsed: Duration },
}

/// Malformed or unexpected envelope. Dropped and logged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("JSON: {0}")]
    Json(String),

    #[error("Unrecognised wallet message")]
    UnknownMessage,

    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        ProtocolError::Json(e.to_string())
    }
}

/// Session persistence failures. Logged; the connector keeps running in memory.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Storage I/O: {0}")]
    Io(String),

    #[error("Storage serialize: {0}")]
    Serialize(String),
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        StorageError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(e: serde_json::Error) -> Self {
        StorageError::Serialize(e.to_string())
    }
}

/// Errors surfaced by [`crate::WalletConnector`] operations.
#[derive(Error, Debug, Clone)]
pub enum ConnectError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Rejected by user: {message}")]
    UserRejection { message: String },

    #[error("Wallet error {code}: {message}")]
    Wallet { code: u16, message: String },

    #[error("Timed out waiting for {operation}")]
    Timeout { operation: String },

    #[error("Wallet not connected")]
    NotConnected,

    #[error("Wallet already connected")]
    AlreadyConnected,

    #[error("Pairing cancelled")]
    PairingCancelled,

    #[error("Connector terminated, create a new one and restore")]
    Terminated,

    #[error("Wallet not found: {0}")]
    WalletNotFound(String),

    #[error("Request cancelled")]
    RequestCancelled,
}

/// Flat error classification handed to status listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Crypto,
    Transport,
    Protocol,
    Storage,
    UserRejection,
    Wallet,
    Timeout,
    State,
}

impl ConnectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectError::Crypto(_) => ErrorKind::Crypto,
            ConnectError::Transport(_) => ErrorKind::Transport,
            ConnectError::Protocol(_) => ErrorKind::Protocol,
            ConnectError::Storage(_) => ErrorKind::Storage,
            ConnectError::UserRejection { .. } => ErrorKind::UserRejection,
            ConnectError::Wallet { .. } => ErrorKind::Wallet,
            ConnectError::Timeout { .. } => ErrorKind::Timeout,
            ConnectError::NotConnected
            | ConnectError::AlreadyConnected
            | ConnectError::PairingCancelled
            | ConnectError::Terminated
            | ConnectError::WalletNotFound(_)
            | ConnectError::RequestCancelled => ErrorKind::State,
        }
    }

    pub(crate) fn timeout(operation: impl Into<String>) -> Self {
        ConnectError::Timeout { operation: operation.into() }
    }
}

pub type ConnectResult<T> = Result<T, ConnectError>;
