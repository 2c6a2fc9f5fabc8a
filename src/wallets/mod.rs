//! Wallet Directory - catalog of wallets reachable over an SSE bridge
//!
//! Sourced from the public wallets list (`wallets-v2.json` format) when the
//! `http` feature is on, with a bundled fallback list. Entries are immutable
//! once loaded; a directory can be shared between connectors behind an `Arc`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::error::{ConnectError, ProtocolError};

/// Public wallets list
pub const WALLETS_LIST_URL: &str =
    "https://raw.githubusercontent.com/ton-blockchain/wallets-list/main/wallets-v2.json";

/// Default refresh interval for a fetched list
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);

const BUNDLED_WALLETS: &str = r#"[
  {
    "app_name": "tonkeeper",
    "name": "Tonkeeper",
    "image": "https://tonkeeper.com/assets/tonconnect-icon.png",
    "about_url": "https://tonkeeper.com",
    "universal_url": "https://app.tonkeeper.com/ton-connect",
    "bridge": [
      {"type": "sse", "url": "https://bridge.tonapi.io/bridge"},
      {"type": "js", "key": "tonkeeper"}
    ]
  },
  {
    "app_name": "mytonwallet",
    "name": "MyTonWallet",
    "image": "https://static.mytonwallet.io/icon-256.png",
    "about_url": "https://mytonwallet.io",
    "universal_url": "https://connect.mytonwallet.org",
    "bridge": [
      {"type": "js", "key": "mytonwallet"},
      {"type": "sse", "url": "https://tonconnectbridge.mytonwallet.org/bridge/"}
    ]
  },
  {
    "app_name": "tonhub",
    "name": "Tonhub",
    "image": "https://tonhub.com/tonconnect_logo.png",
    "about_url": "https://tonhub.com",
    "universal_url": "https://tonhub.com/ton-connect",
    "bridge": [
      {"type": "js", "key": "tonhub"},
      {"type": "sse", "url": "https://connect.tonhubapi.com/tonconnect"}
    ]
  }
]"#;

/// A wallet app the connector can pair with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletManifest {
    pub name: String,
    pub app_name: String,
    pub image_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub about_url: Option<String>,
    pub bridge_url: String,
    pub universal_link: String,
}

#[derive(Deserialize)]
struct RawWallet {
    app_name: String,
    name: String,
    image: String,
    #[serde(default)]
    about_url: Option<String>,
    #[serde(default)]
    universal_url: Option<String>,
    #[serde(default)]
    bridge: Vec<RawBridge>,
}

#[derive(Deserialize)]
struct RawBridge {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    url: Option<String>,
}

impl RawWallet {
    fn into_manifest(self) -> Option<WalletManifest> {
        let bridge_url = self.bridge.into_iter().find(|b| b.kind == "sse")?.url?;
        Some(WalletManifest {
            name: self.name,
            app_name: self.app_name,
            image_url: self.image,
            about_url: self.about_url,
            bridge_url,
            universal_link: self.universal_url?,
        })
    }
}

/// Parse a wallets list, keeping only wallets with an SSE bridge and a
/// universal link. Malformed entries are skipped.
pub fn parse_wallets_list(json: &str) -> Result<Vec<WalletManifest>, ProtocolError> {
    let entries: Vec<Value> = serde_json::from_str(json)?;
    Ok(entries
        .into_iter()
        .filter_map(|entry| match serde_json::from_value::<RawWallet>(entry) {
            Ok(raw) => raw.into_manifest(),
            Err(e) => {
                debug!(error = %e, "skipping malformed wallet entry");
                None
            }
        })
        .collect())
}

/// Built-in wallet list
pub fn bundled_wallets() -> Vec<WalletManifest> {
    parse_wallets_list(BUNDLED_WALLETS).unwrap_or_default()
}

enum Source {
    Bundled,
    #[cfg(feature = "http")]
    Remote { client: reqwest::Client, url: String },
}

pub struct WalletDirectory {
    source: Source,
    cache_ttl: Duration,
    cache: RwLock<Option<(Instant, Arc<Vec<WalletManifest>>)>>,
}

impl Default for WalletDirectory {
    fn default() -> Self {
        Self::bundled()
    }
}

impl WalletDirectory {
    /// Directory backed only by the bundled list
    pub fn bundled() -> Self {
        Self { source: Source::Bundled, cache_ttl: Duration::MAX, cache: RwLock::new(None) }
    }

    /// Directory fetched from `url`, falling back to the bundled list
    #[cfg(feature = "http")]
    pub fn remote(url: impl Into<String>) -> Self {
        Self {
            source: Source::Remote { client: reqwest::Client::new(), url: url.into() },
            cache_ttl: DEFAULT_CACHE_TTL,
            cache: RwLock::new(None),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self { self.cache_ttl = ttl; self }

    /// All known wallets
    pub async fn wallets(&self) -> Arc<Vec<WalletManifest>> {
        if let Some((loaded_at, wallets)) = self.cache.read().await.as_ref() {
            if loaded_at.elapsed() < self.cache_ttl {
                return wallets.clone();
            }
        }

        let mut cache = self.cache.write().await;
        if let Some((loaded_at, wallets)) = cache.as_ref() {
            if loaded_at.elapsed() < self.cache_ttl {
                return wallets.clone();
            }
        }
        let wallets = Arc::new(self.load().await);
        *cache = Some((Instant::now(), wallets.clone()));
        wallets
    }

    /// Wallet display names
    pub async fn names(&self) -> Vec<String> {
        self.wallets().await.iter().map(|w| w.name.clone()).collect()
    }

    /// Look up a wallet by display name or app name (case-insensitive)
    pub async fn find(&self, name: &str) -> Result<WalletManifest, ConnectError> {
        self.wallets()
            .await
            .iter()
            .find(|w| w.name.eq_ignore_ascii_case(name) || w.app_name.eq_ignore_ascii_case(name))
            .cloned()
            .ok_or_else(|| ConnectError::WalletNotFound(name.to_string()))
    }

    async fn load(&self) -> Vec<WalletManifest> {
        match &self.source {
            Source::Bundled => bundled_wallets(),
            #[cfg(feature = "http")]
            Source::Remote { client, url } => match fetch(client, url).await {
                Ok(wallets) if !wallets.is_empty() => wallets,
                Ok(_) => {
                    warn!(url = %url, "wallets list empty, using bundled list");
                    bundled_wallets()
                }
                Err(e) => {
                    warn!(url = %url, error = %e, "wallets list fetch failed, using bundled list");
                    bundled_wallets()
                }
            },
        }
    }
}

#[cfg(feature = "http")]
async fn fetch(client: &reqwest::Client, url: &str) -> Result<Vec<WalletManifest>, ConnectError> {
    use crate::error::TransportError;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| TransportError::Http(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status { status: status.as_u16(), body: String::new() }.into());
    }
    let body = response.text().await.map_err(|e| TransportError::Http(e.to_string()))?;
    Ok(parse_wallets_list(&body)?)
}
