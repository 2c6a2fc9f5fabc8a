//! Shared test fixtures: in-memory bridge and a scripted wallet

#![allow(dead_code)]

use async_stream::stream;
use async_trait::async_trait;
use futures_util::StreamExt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;

use tonlink::crypto::{self, SessionKeyPair, KEY_LEN};
use tonlink::protocol::{
    self, Account, ConnectEventPayload, ConnectItemReply, DeviceInfo, RpcRequest, RpcResponse,
    WalletErrorPayload, WalletEvent,
};
use tonlink::wallets::WalletManifest;
use tonlink::{
    BridgeTransport, ConnectError, ConnectedWallet, ConnectionState, ConnectorConfig, EnvelopeStream,
    ErrorKind, InboundEnvelope, MemorySessionStore, StatusListener, TransportError, WalletConnector,
};

pub const BRIDGE_URL: &str = "https://bridge.test/bridge";
pub const WALLET_ADDRESS: &str = "0:0000000000000000000000000000000000000000000000000000000000000000";
pub const MANIFEST_URL: &str = "https://dapp.test/tonconnect-manifest.json";

pub fn test_wallet_manifest() -> WalletManifest {
    WalletManifest {
        name: "Test Wallet".into(),
        app_name: "testwallet".into(),
        image_url: "https://wallet.test/icon.png".into(),
        about_url: None,
        bridge_url: BRIDGE_URL.into(),
        universal_link: "https://wallet.test/ton-connect".into(),
    }
}

#[derive(Debug, Clone)]
pub struct Event {
    pub id: u64,
    pub to: [u8; KEY_LEN],
    pub from: [u8; KEY_LEN],
    pub message: Vec<u8>,
    pub topic: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscription {
    pub bridge_url: String,
    pub client_id: String,
    pub last_event_id: Option<String>,
}

#[derive(Default)]
struct State {
    next_event_id: u64,
    events: Vec<Event>,
    subscriptions: Vec<Subscription>,
    failure: Option<TransportError>,
}

/// Bridge where every `send` becomes an event for the recipient.
/// Event ids are global and increasing, so `last_event_id` resumption works.
pub struct MemoryBridge {
    state: Arc<Mutex<State>>,
    changed: watch::Sender<u64>,
}

impl Default for MemoryBridge {
    fn default() -> Self {
        let (changed, _) = watch::channel(0);
        Self { state: Arc::new(Mutex::new(State::default())), changed }
    }
}

impl MemoryBridge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn bump(&self) {
        self.changed.send_modify(|n| *n += 1);
    }

    /// Append an event for `to` as if someone had posted it
    pub fn inject(&self, from: [u8; KEY_LEN], to: [u8; KEY_LEN], message: Vec<u8>) -> u64 {
        let id = {
            let mut state = self.state();
            state.next_event_id += 1;
            let id = state.next_event_id;
            state.events.push(Event { id, to, from, message, topic: None });
            id
        };
        self.bump();
        id
    }

    /// Every event addressed to `to`
    pub fn events_for(&self, to: &[u8; KEY_LEN]) -> Vec<Event> {
        self.state().events.iter().filter(|e| &e.to == to).cloned().collect()
    }

    /// Every subscription opened, in order
    pub fn subscriptions(&self) -> Vec<Subscription> {
        self.state().subscriptions.clone()
    }

    /// End every open stream with `error`, as a transport that gave up
    pub fn fail_streams(&self, error: TransportError) {
        self.state().failure = Some(error);
        self.bump();
    }
}

#[async_trait]
impl BridgeTransport for MemoryBridge {
    fn subscribe(
        &self,
        bridge_url: &str,
        client_id: &[u8; KEY_LEN],
        last_event_id: Option<String>,
    ) -> EnvelopeStream {
        self.state().subscriptions.push(Subscription {
            bridge_url: bridge_url.to_string(),
            client_id: hex::encode(client_id),
            last_event_id: last_event_id.clone(),
        });
        let state = self.state.clone();
        let mut changed = self.changed.subscribe();
        let client_id = *client_id;
        let mut cursor: u64 = last_event_id.and_then(|id| id.parse().ok()).unwrap_or(0);

        Box::pin(stream! {
            loop {
                let (batch, failure) = {
                    let state = state.lock().unwrap_or_else(|p| p.into_inner());
                    let batch: Vec<Event> = state
                        .events
                        .iter()
                        .filter(|e| e.to == client_id && e.id > cursor)
                        .cloned()
                        .collect();
                    (batch, state.failure.clone())
                };
                if let Some(error) = failure {
                    yield Err(error);
                    break;
                }
                for event in batch {
                    cursor = event.id;
                    yield Ok(InboundEnvelope {
                        event_id: Some(event.id.to_string()),
                        from: event.from,
                        message: event.message,
                    });
                }
                if changed.changed().await.is_err() {
                    break;
                }
            }
        })
    }

    async fn send(
        &self,
        _bridge_url: &str,
        from: &[u8; KEY_LEN],
        to: &[u8; KEY_LEN],
        message: &[u8],
        topic: Option<&str>,
    ) -> Result<(), TransportError> {
        {
            let mut state = self.state();
            state.next_event_id += 1;
            let id = state.next_event_id;
            state.events.push(Event {
                id,
                to: *to,
                from: *from,
                message: message.to_vec(),
                topic: topic.map(str::to_string),
            });
        }
        self.bump();
        Ok(())
    }
}

/// Session public key embedded in a universal link
pub fn session_key_from_link(link: &str) -> [u8; KEY_LEN] {
    let url = url::Url::parse(link).expect("universal link");
    let id = url
        .query_pairs()
        .find(|(k, _)| k == "id")
        .map(|(_, v)| v.into_owned())
        .expect("id parameter");
    crypto::key_from_hex(&id).expect("hex session key")
}

/// Wallet side of the protocol, driven step by step from a test
pub struct SimulatedWallet {
    pub keypair: SessionKeyPair,
    bridge: Arc<MemoryBridge>,
    inbox: tokio::sync::Mutex<EnvelopeStream>,
    next_event_id: AtomicU64,
}

impl SimulatedWallet {
    pub fn new(bridge: Arc<MemoryBridge>) -> Self {
        let keypair = crypto::generate_keypair().expect("wallet keypair");
        let inbox = bridge.subscribe(BRIDGE_URL, keypair.public_key(), None);
        Self { keypair, bridge, inbox: tokio::sync::Mutex::new(inbox), next_event_id: AtomicU64::new(1) }
    }

    pub fn public_key(&self) -> [u8; KEY_LEN] {
        *self.keypair.public_key()
    }

    fn seal(&self, dapp: &[u8; KEY_LEN], plaintext: &[u8]) -> Vec<u8> {
        let secret = crypto::derive_shared_secret(self.keypair.secret_key(), dapp).expect("shared secret");
        crypto::encrypt(&secret, plaintext).expect("encrypt")
    }

    pub async fn send_plaintext(&self, dapp: &[u8; KEY_LEN], plaintext: &[u8]) {
        let message = self.seal(dapp, plaintext);
        self.bridge
            .send(BRIDGE_URL, self.keypair.public_key(), dapp, &message, None)
            .await
            .expect("bridge send");
    }

    pub async fn send_event(&self, dapp: &[u8; KEY_LEN], event: &WalletEvent) {
        let plaintext = protocol::encode_event(event).expect("encode event");
        self.send_plaintext(dapp, &plaintext).await;
    }

    fn event_id(&self) -> u64 {
        self.next_event_id.fetch_add(1, Ordering::SeqCst)
    }

    pub fn connect_event(&self, id: u64) -> WalletEvent {
        WalletEvent::Connect {
            id,
            payload: ConnectEventPayload {
                items: vec![ConnectItemReply::TonAddr(Account {
                    address: WALLET_ADDRESS.into(),
                    chain: "-239".into(),
                    public_key: Some(hex::encode(self.keypair.public_key())),
                    wallet_state_init: None,
                })],
                device: DeviceInfo {
                    platform: "iphone".into(),
                    app_name: "Test Wallet".into(),
                    app_version: "1.0.0".into(),
                    max_protocol_version: 2,
                    features: vec![serde_json::json!("SendTransaction")],
                },
            },
        }
    }

    /// Accept the pairing request behind `link`; returns the dApp session key
    pub async fn approve(&self, link: &str) -> [u8; KEY_LEN] {
        let dapp = session_key_from_link(link);
        let event = self.connect_event(self.event_id());
        self.send_event(&dapp, &event).await;
        dapp
    }

    /// Decline the pairing request behind `link`
    pub async fn decline(&self, link: &str) -> [u8; KEY_LEN] {
        let dapp = session_key_from_link(link);
        let event = WalletEvent::ConnectError {
            id: self.event_id(),
            payload: WalletErrorPayload::new(300, "User declined the connection"),
        };
        self.send_event(&dapp, &event).await;
        dapp
    }

    pub async fn disconnect(&self, dapp: &[u8; KEY_LEN]) {
        let event = WalletEvent::Disconnect { id: self.event_id(), payload: serde_json::json!({}) };
        self.send_event(dapp, &event).await;
    }

    /// Next RPC request the dApp sent, decrypted
    pub async fn next_request(&self, dapp: &[u8; KEY_LEN]) -> RpcRequest {
        let envelope = self
            .inbox
            .lock()
            .await
            .next()
            .await
            .expect("inbox open")
            .expect("inbox item");
        assert_eq!(&envelope.from, dapp, "request from the paired dApp");
        let secret = crypto::derive_shared_secret(self.keypair.secret_key(), dapp).expect("shared secret");
        let plaintext = crypto::decrypt(&secret, &envelope.message).expect("decrypt request");
        serde_json::from_slice(&plaintext).expect("rpc request json")
    }

    pub async fn respond(&self, dapp: &[u8; KEY_LEN], response: &RpcResponse) {
        let plaintext = response.to_json().expect("encode response");
        self.send_plaintext(dapp, &plaintext).await;
    }
}

/// Records every listener callback
#[derive(Default)]
pub struct Recorder {
    statuses: Mutex<Vec<Option<String>>>,
    errors: Mutex<Vec<ErrorKind>>,
}

impl Recorder {
    /// Connected wallet address per status change, `None` for disconnects
    pub fn statuses(&self) -> Vec<Option<String>> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<ErrorKind> {
        self.errors.lock().unwrap().clone()
    }
}

impl StatusListener for Recorder {
    fn on_status_change(&self, wallet: Option<&ConnectedWallet>) {
        self.statuses.lock().unwrap().push(wallet.map(|w| w.account.address.clone()));
    }

    fn on_error(&self, error: &ConnectError) {
        self.errors.lock().unwrap().push(error.kind());
    }
}

/// Poll `condition` until it holds (5s budget)
pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

pub async fn wait_for_state(connector: &WalletConnector, state: ConnectionState) {
    let mut rx = connector.watch_state();
    tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|s| *s == state))
        .await
        .expect("state reached in time")
        .expect("state channel open");
}

pub fn connector(bridge: &Arc<MemoryBridge>, store: &MemorySessionStore) -> WalletConnector {
    WalletConnector::new(ConnectorConfig::new(MANIFEST_URL), Arc::new(store.clone()), bridge.clone())
}

/// Connector paired with a fresh simulated wallet; returns the dApp session key
pub async fn paired(
    bridge: &Arc<MemoryBridge>,
    store: &MemorySessionStore,
) -> (WalletConnector, SimulatedWallet, [u8; KEY_LEN]) {
    let wallet = SimulatedWallet::new(bridge.clone());
    let connector = connector(bridge, store);
    let link = connector.connect(&test_wallet_manifest()).await.expect("connect");
    let dapp = wallet.approve(&link).await;
    tokio::time::timeout(Duration::from_secs(5), connector.wait_for_connection())
        .await
        .expect("paired in time")
        .expect("paired");
    (connector, wallet, dapp)
}
