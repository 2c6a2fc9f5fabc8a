//! Connector Configuration - passed from the embedding application

use std::time::Duration;

pub use crate::bridge::BackoffConfig;
use crate::protocol::transaction::DEFAULT_VALIDITY_SECS;

pub const DEFAULT_PAIRING_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5 * 60);
pub const DEFAULT_DISCONNECT_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_MAX_SILENT_RECONNECT: Duration = Duration::from_secs(10 * 60);
pub const DEFAULT_MESSAGE_TTL_SECS: u64 = 300;

/// Connector configuration. All timeouts are caller-configurable.
#[derive(Debug, Clone)]
pub struct ConnectorConfig {
    /// URL of the dApp's `tonconnect-manifest.json`
    pub manifest_url: String,
    /// How long `connect()` waits for the wallet to pair
    pub pairing_timeout: Duration,
    /// How long an RPC (e.g. `sendTransaction`) waits for the wallet
    pub request_timeout: Duration,
    /// Bound on the `disconnect` acknowledgement
    pub disconnect_timeout: Duration,
    pub backoff: BackoffConfig,
    /// Give up reconnecting after this long without a live stream. `None` retries forever.
    pub max_silent_reconnect: Option<Duration>,
    /// Bridge TTL for outbound messages, in seconds
    pub message_ttl: u64,
    /// `valid_until` offset for transactions built by the connector, in seconds
    pub transaction_validity: i64,
}

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            manifest_url: String::new(),
            pairing_timeout: DEFAULT_PAIRING_TIMEOUT,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            disconnect_timeout: DEFAULT_DISCONNECT_TIMEOUT,
            backoff: BackoffConfig::default(),
            max_silent_reconnect: Some(DEFAULT_MAX_SILENT_RECONNECT),
            message_ttl: DEFAULT_MESSAGE_TTL_SECS,
            transaction_validity: DEFAULT_VALIDITY_SECS,
        }
    }
}

impl ConnectorConfig {
    pub fn new(manifest_url: impl Into<String>) -> Self {
        Self { manifest_url: manifest_url.into(), ..Default::default() }
    }
    pub fn with_pairing_timeout(mut self, t: Duration) -> Self { self.pairing_timeout = t; self }
    pub fn with_request_timeout(mut self, t: Duration) -> Self { self.request_timeout = t; self }
    pub fn with_disconnect_timeout(mut self, t: Duration) -> Self { self.disconnect_timeout = t; self }
    pub fn with_backoff(mut self, b: BackoffConfig) -> Self { self.backoff = b; self }
    pub fn with_max_silent_reconnect(mut self, limit: Option<Duration>) -> Self { self.max_silent_reconnect = limit; self }
    pub fn with_message_ttl(mut self, secs: u64) -> Self { self.message_ttl = secs; self }
    pub fn with_transaction_validity(mut self, secs: i64) -> Self { self.transaction_validity = secs; self }
}
