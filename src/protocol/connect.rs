//! Pairing payloads: connect request, universal link and connect event data.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use url::Url;

use crate::error::ProtocolError;

/// Bridge protocol version advertised in the universal link
pub const PROTOCOL_VERSION: u8 = 2;

/// Item requested from the wallet during pairing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ConnectItem {
    TonAddr,
    TonProof { payload: String },
}

/// Connect request embedded in the universal link (`r` parameter)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectRequest {
    pub manifest_url: String,
    pub items: Vec<ConnectItem>,
}

impl ConnectRequest {
    pub fn new(manifest_url: impl Into<String>) -> Self {
        Self { manifest_url: manifest_url.into(), items: vec![ConnectItem::TonAddr] }
    }

    /// Also ask the wallet for a `ton_proof` over `payload`
    pub fn with_proof(mut self, payload: impl Into<String>) -> Self {
        self.items.push(ConnectItem::TonProof { payload: payload.into() });
        self
    }
}

/// Build the pairing deep link for `universal_url`.
///
/// `{universal_url}?v=2&id={session public key hex}&r={connect request json}&bridge={bridge url}&ret=none`
pub fn universal_link(
    universal_url: &str,
    session_public_hex: &str,
    bridge_url: &str,
    request: &ConnectRequest,
) -> Result<String, ProtocolError> {
    let mut url = Url::parse(universal_url).map_err(|e| ProtocolError::InvalidField {
        field: "universal_url",
        reason: e.to_string(),
    })?;
    let request = serde_json::to_string(request)?;
    url.query_pairs_mut()
        .append_pair("v", &PROTOCOL_VERSION.to_string())
        .append_pair("id", session_public_hex)
        .append_pair("r", &request)
        .append_pair("bridge", bridge_url)
        .append_pair("ret", "none");
    Ok(url.into())
}

/// Wallet account returned in the `ton_addr` item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub address: String,
    /// Network id (`-239` mainnet, `-3` testnet)
    #[serde(rename = "network")]
    pub chain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wallet_state_init: Option<String>,
}

/// Signed proof returned in the `ton_proof` item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TonProof {
    pub timestamp: u64,
    pub domain: ProofDomain,
    pub payload: String,
    pub signature: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofDomain {
    pub length_bytes: u32,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    pub platform: String,
    pub app_name: String,
    pub app_version: String,
    pub max_protocol_version: u32,
    /// Mixed strings and objects depending on wallet version
    #[serde(default)]
    pub features: Vec<Value>,
}

/// Item returned by the wallet in a connect event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum ConnectItemReply {
    TonAddr(Account),
    TonProof {
        #[serde(default)]
        proof: Option<TonProof>,
        #[serde(default)]
        error: Option<Value>,
    },
}

/// Payload of the `connect` wallet event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectEventPayload {
    pub items: Vec<ConnectItemReply>,
    pub device: DeviceInfo,
}

/// Wallet details reported to status listeners once paired
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedWallet {
    pub device: DeviceInfo,
    pub account: Account,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ton_proof: Option<TonProof>,
}

impl TryFrom<ConnectEventPayload> for ConnectedWallet {
    type Error = ProtocolError;

    fn try_from(payload: ConnectEventPayload) -> Result<Self, Self::Error> {
        let mut account = None;
        let mut ton_proof = None;
        for item in payload.items {
            match item {
                ConnectItemReply::TonAddr(a) => account = Some(a),
                ConnectItemReply::TonProof { proof, .. } => ton_proof = proof,
            }
        }
        let account = account.ok_or_else(|| ProtocolError::InvalidField {
            field: "items",
            reason: "missing ton_addr".into(),
        })?;
        Ok(Self { device: payload.device, account, ton_proof })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_connect_request_json() {
        let request = ConnectRequest::new("https://app.example/manifest.json").with_proof("nonce-1");
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "manifestUrl": "https://app.example/manifest.json",
                "items": [{"name": "ton_addr"}, {"name": "ton_proof", "payload": "nonce-1"}]
            })
        );
    }

    #[test]
    fn test_universal_link_params() {
        let request = ConnectRequest::new("https://app.example/manifest.json");
        let link = universal_link(
            "https://app.tonkeeper.com/ton-connect",
            "ab12",
            "https://bridge.tonapi.io/bridge",
            &request,
        )
        .unwrap();
        let url = Url::parse(&link).unwrap();
        assert_eq!(url.host_str(), Some("app.tonkeeper.com"));

        let params: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(params["v"], "2");
        assert_eq!(params["id"], "ab12");
        assert_eq!(params["bridge"], "https://bridge.tonapi.io/bridge");
        assert_eq!(params["ret"], "none");
        let decoded: ConnectRequest = serde_json::from_str(&params["r"]).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn test_connected_wallet_from_payload() {
        let payload: ConnectEventPayload = serde_json::from_value(json!({
            "items": [
                {"name": "ton_addr", "address": "0:abc", "network": "-239", "publicKey": "ff", "walletStateInit": "te6"},
                {"name": "ton_proof", "proof": {
                    "timestamp": 1700000000,
                    "domain": {"lengthBytes": 11, "value": "app.example"},
                    "payload": "nonce-1",
                    "signature": "c2ln"
                }}
            ],
            "device": {"platform": "iphone", "appName": "Tonkeeper", "appVersion": "3.4", "maxProtocolVersion": 2,
                       "features": ["SendTransaction", {"name": "SendTransaction", "maxMessages": 4}]}
        }))
        .unwrap();

        let wallet = ConnectedWallet::try_from(payload).unwrap();
        assert_eq!(wallet.account.address, "0:abc");
        assert_eq!(wallet.account.chain, "-239");
        assert_eq!(wallet.device.app_name, "Tonkeeper");
        assert_eq!(wallet.device.features.len(), 2);
        assert_eq!(wallet.ton_proof.unwrap().payload, "nonce-1");
    }

    #[test]
    fn test_payload_without_address_rejected() {
        let payload: ConnectEventPayload = serde_json::from_value(json!({
            "items": [],
            "device": {"platform": "web", "appName": "X", "appVersion": "1", "maxProtocolVersion": 2}
        }))
        .unwrap();
        assert!(ConnectedWallet::try_from(payload).is_err());
    }
}
