//! Session Store - persisted bridge session per connector identity
//!
//! One record per connector key. Backings are pluggable: [`FileSessionStore`]
//! for processes that restart, [`MemorySessionStore`] for tests and
//! ephemeral hosts. A record that cannot be parsed is treated as absent.

mod file;
mod memory;

pub use file::{default_root, FileSessionStore};
pub use memory::MemorySessionStore;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::crypto::{self, KEY_LEN};
use crate::error::StorageError;
use crate::protocol::ConnectedWallet;

/// Current record format version
pub const RECORD_VERSION: u32 = 1;

/// Bridge session state persisted across restarts
#[derive(Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeSession {
    pub bridge_url: String,
    #[serde(with = "hex_key")]
    pub session_public_key: [u8; KEY_LEN],
    #[serde(with = "hex_key")]
    pub session_secret_key: [u8; KEY_LEN],
    #[serde(default, with = "hex_key_opt")]
    pub wallet_public_key: Option<[u8; KEY_LEN]>,
    /// Bridge stream position, advances with every received event
    #[serde(default)]
    pub last_event_id: Option<String>,
    /// Highest applied wallet event id (replay guard)
    #[serde(default)]
    pub last_wallet_event_id: Option<u64>,
    /// Next RPC request id, kept monotonic across restores
    #[serde(default = "first_request_id")]
    pub next_request_id: u64,
    #[serde(default)]
    pub wallet: Option<ConnectedWallet>,
}

fn first_request_id() -> u64 {
    1
}

impl BridgeSession {
    /// Fresh session awaiting pairing
    pub fn pending(bridge_url: impl Into<String>, keypair: &crypto::SessionKeyPair) -> Self {
        Self {
            bridge_url: bridge_url.into(),
            session_public_key: *keypair.public_key(),
            session_secret_key: *keypair.secret_key(),
            wallet_public_key: None,
            last_event_id: None,
            last_wallet_event_id: None,
            next_request_id: first_request_id(),
            wallet: None,
        }
    }

    /// True once the wallet completed pairing
    pub fn is_paired(&self) -> bool {
        self.wallet_public_key.is_some()
    }

    pub fn keypair(&self) -> crypto::SessionKeyPair {
        crypto::SessionKeyPair::from_secret(self.session_secret_key)
    }
}

impl std::fmt::Debug for BridgeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgeSession")
            .field("bridge_url", &self.bridge_url)
            .field("session_public_key", &hex::encode(self.session_public_key))
            .field("wallet_public_key", &self.wallet_public_key.map(hex::encode))
            .field("last_event_id", &self.last_event_id)
            .field("last_wallet_event_id", &self.last_wallet_event_id)
            .field("next_request_id", &self.next_request_id)
            .finish_non_exhaustive()
    }
}

/// On-disk envelope around a session
#[derive(Serialize, Deserialize)]
pub(crate) struct StoredRecord {
    pub version: u32,
    pub session: BridgeSession,
}

impl StoredRecord {
    pub(crate) fn encode(session: &BridgeSession) -> Result<Vec<u8>, StorageError> {
        let record = StoredRecord { version: RECORD_VERSION, session: session.clone() };
        Ok(serde_json::to_vec_pretty(&record)?)
    }

    /// `None` for corrupt or foreign-version records
    pub(crate) fn decode(raw: &[u8]) -> Option<BridgeSession> {
        match serde_json::from_slice::<StoredRecord>(raw) {
            Ok(record) if record.version == RECORD_VERSION => Some(record.session),
            Ok(record) => {
                tracing::warn!(version = record.version, "unsupported session record version, ignoring");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "corrupt session record, ignoring");
                None
            }
        }
    }
}

/// Persistence backing for one connector's session
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Load the stored session. Corrupt records load as `None`.
    async fn load(&self) -> Result<Option<BridgeSession>, StorageError>;

    /// Replace the stored session atomically
    async fn save(&self, session: &BridgeSession) -> Result<(), StorageError>;

    /// Remove the stored session
    async fn clear(&self) -> Result<(), StorageError>;
}

mod hex_key {
    use super::KEY_LEN;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &[u8; KEY_LEN], s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&hex::encode(key))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<[u8; KEY_LEN], D::Error> {
        let value = String::deserialize(d)?;
        crate::crypto::key_from_hex(&value).map_err(de::Error::custom)
    }
}

mod hex_key_opt {
    use super::KEY_LEN;
    use serde::{de, Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(key: &Option<[u8; KEY_LEN]>, s: S) -> Result<S::Ok, S::Error> {
        match key {
            Some(key) => s.serialize_some(&hex::encode(key)),
            None => s.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<[u8; KEY_LEN]>, D::Error> {
        Option::<String>::deserialize(d)?
            .map(|value| crate::crypto::key_from_hex(&value).map_err(de::Error::custom))
            .transpose()
    }
}
