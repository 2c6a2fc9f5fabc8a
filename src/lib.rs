//! Tonlink: wallet connection client. One encrypted dApp ↔ wallet session per connector.
//!
//! # Architecture
//!
//! ```text
//! WalletConnector (entry point)
//!   │
//!   ├── Connection state machine
//!   │     Disconnected → AwaitingPairing → Connected (→ Terminated)
//!   │
//!   ├── Correlator ── RPC ids ↔ pending responses (sendTransaction, disconnect)
//!   │
//!   ├── BridgeTransport (trait)
//!   │     └── HttpBridge: SSE subscribe + POST send, jittered reconnect
//!   │
//!   ├── SessionStore (trait)
//!   │     ├── FileSessionStore (atomic JSON record, 0600)
//!   │     └── MemorySessionStore
//!   │
//!   └── crypto: X25519 agreement, NaCl box (XSalsa20-Poly1305) envelopes
//! ```
//!
//! # Operations
//!
//! | Operation | Method | Description |
//! |-----------|--------|-------------|
//! | pair | `connector.connect(&wallet)` | Universal link for the wallet to open |
//! | resume | `connector.restore()` | Reopen a stored, paired session |
//! | sign | `connector.send_transaction(&tx)` | Ask the wallet to sign and send |
//! | observe | `connector.on_status_change(listener)` | Status and error callbacks |
//! | end | `connector.disconnect()` | Notify the wallet, clear the session |
//!
//! # Features
//!
//! - `http` (default) - `HttpBridge` and remote wallet list fetch
//!
//! # Usage
//!
//! ```ignore
//! use tonlink::{ConnectorConfig, WalletConnector, WalletDirectory};
//!
//! let connector = WalletConnector::with_file_storage(
//!     "chat-42",
//!     ConnectorConfig::new("https://dapp.example/tonconnect-manifest.json"),
//! );
//!
//! if !connector.restore().await? {
//!     let link = connector.connect_by_name("Tonkeeper").await?;
//!     show_qr(&link);
//!     connector.wait_for_connection().await?;
//! }
//!
//! let signed = connector.send_transfer("0:00..00", "1000000", None).await?;
//! ```

pub mod bridge;
pub mod config;
pub mod connector;
pub mod correlator;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod protocol;
pub mod runtime;
pub mod store;
pub mod wallets;

// =============================================================================
// Re-exports
// =============================================================================
pub use bridge::{BackoffConfig, BridgeTransport, EnvelopeStream, InboundEnvelope};
#[cfg(feature = "http")]
pub use bridge::HttpBridge;
pub use config::ConnectorConfig;
pub use connector::{ConnectionState, ListenerToken, StatusListener, WalletConnector};
pub use correlator::{Correlator, PendingResponse, RpcChannel};
pub use crypto::{SessionKeyPair, SharedSecret};
pub use error::{
    ConnectError, ConnectResult, CryptoError, ErrorKind, ProtocolError, StorageError, TransportError,
};
pub use logging::{init_logging, LogFormat};
pub use protocol::{
    Account, ConnectedWallet, DeviceInfo, RpcOutcome, RpcRequest, RpcResponse, SendTransactionResponse,
    TonProof, Transaction, TransactionMessage, WalletEvent, WalletMessage,
};
pub use runtime::Shutdown;
pub use store::{BridgeSession, FileSessionStore, MemorySessionStore, SessionStore};
pub use wallets::{WalletDirectory, WalletManifest};
