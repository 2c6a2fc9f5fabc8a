//! Wallet Connector - connection state machine
//!
//! ```text
//!                connect()                connect event
//! Disconnected ─────────────▶ AwaitingPairing ─────────────▶ Connected
//!      ▲   ▲                        │                         │     │
//!      │   └── timeout / cancel / ──┘                         │     │
//!      │       connect_error                                  │     │
//!      └────────── disconnect event / disconnect() ───────────┘     │
//!                                                                   ▼
//!                               bridge gave up reconnecting ──▶ Terminated
//! ```
//!
//! One background task per session consumes the bridge subscription. Each
//! envelope is applied under the state lock; effects (persistence, request
//! resolution, listener callbacks) run after the lock is released, in order,
//! before the next envelope is read.

mod listeners;

pub use listeners::{ListenerToken, StatusListener};

use async_trait::async_trait;
use futures_util::StreamExt;
use serde_json::Value;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::bridge::{BridgeTransport, EnvelopeStream, InboundEnvelope};
use crate::config::ConnectorConfig;
use crate::correlator::{Correlator, RpcChannel};
use crate::crypto::{self, SessionKeyPair, SharedSecret, KEY_LEN};
use crate::error::{ConnectError, ConnectResult, ProtocolError, TransportError};
use crate::protocol::{
    self, Account, ConnectRequest, ConnectedWallet, RpcOutcome, RpcRequest, RpcResponse,
    SendTransactionResponse, Transaction, TransactionMessage, WalletEvent, WalletMessage,
};
use crate::runtime::Shutdown;
use crate::store::{BridgeSession, SessionStore};
use crate::wallets::{WalletDirectory, WalletManifest};
use listeners::Listeners;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    AwaitingPairing,
    Connected,
    /// Subscription abandoned; the stored session is kept for `restore()`
    /// by a new connector
    Terminated,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::AwaitingPairing => "awaiting_pairing",
            ConnectionState::Connected => "connected",
            ConnectionState::Terminated => "terminated",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Live session: keys, bridge position and the subscription stop signal
struct Active {
    generation: u64,
    session: BridgeSession,
    keypair: SessionKeyPair,
    shared_secret: Option<SharedSecret>,
    shutdown: Shutdown,
}

enum Decision {
    Drop,
    Paired(ConnectedWallet),
    Rejected(ConnectError),
    Response(RpcResponse),
    Disconnect,
}

enum Effect {
    None,
    CursorMoved,
    Paired(ConnectedWallet),
    PairingFailed(ConnectError),
    Response(RpcResponse),
    WalletDisconnected,
}

fn open(secret: &SharedSecret, message: &[u8]) -> ConnectResult<WalletMessage> {
    let plaintext = crypto::decrypt(secret, message)?;
    Ok(protocol::decode_wallet_message(&plaintext)?)
}

impl Active {
    fn advance_cursor(&mut self, event_id: Option<&str>) -> bool {
        match event_id {
            Some(id) if self.session.last_event_id.as_deref() != Some(id) => {
                self.session.last_event_id = Some(id.to_string());
                true
            }
            _ => false,
        }
    }

    fn pairing_message(&mut self, envelope: &InboundEnvelope) -> Decision {
        let opened = crypto::derive_shared_secret(self.keypair.secret_key(), &envelope.from)
            .map_err(ConnectError::from)
            .and_then(|secret| open(&secret, &envelope.message).map(|m| (secret, m)));
        let (secret, message) = match opened {
            Ok(opened) => opened,
            Err(e) => {
                debug!(error = %e, "undecryptable envelope dropped");
                return Decision::Drop;
            }
        };

        match message {
            WalletMessage::Event(WalletEvent::Connect { id, payload }) => {
                match ConnectedWallet::try_from(payload) {
                    Ok(wallet) => {
                        self.session.wallet_public_key = Some(envelope.from);
                        self.session.wallet = Some(wallet.clone());
                        self.session.last_wallet_event_id = Some(id);
                        self.shared_secret = Some(secret);
                        Decision::Paired(wallet)
                    }
                    Err(e) => {
                        warn!(error = %e, "connect event dropped");
                        Decision::Drop
                    }
                }
            }
            WalletMessage::Event(WalletEvent::ConnectError { payload, .. }) => {
                Decision::Rejected(payload.into())
            }
            WalletMessage::Event(event) => {
                debug!(event = event.name(), "event dropped while awaiting pairing");
                Decision::Drop
            }
            WalletMessage::Response(response) => {
                debug!(id = response.id, "response dropped while awaiting pairing");
                Decision::Drop
            }
        }
    }

    fn session_message(&mut self, envelope: &InboundEnvelope) -> Decision {
        if self.session.wallet_public_key != Some(envelope.from) {
            debug!(from = %hex::encode(envelope.from), "envelope from unknown sender dropped");
            return Decision::Drop;
        }
        let Some(secret) = self.shared_secret.as_ref() else {
            return Decision::Drop;
        };
        let message = match open(secret, &envelope.message) {
            Ok(message) => message,
            Err(e) => {
                debug!(error = %e, "undecryptable envelope dropped");
                return Decision::Drop;
            }
        };

        match message {
            WalletMessage::Response(response) => Decision::Response(response),
            WalletMessage::Event(event) => {
                let id = event.id();
                if self.session.last_wallet_event_id.is_some_and(|last| id <= last) {
                    debug!(id, event = event.name(), "replayed wallet event dropped");
                    return Decision::Drop;
                }
                match event {
                    WalletEvent::Disconnect { .. } => {
                        self.session.last_wallet_event_id = Some(id);
                        Decision::Disconnect
                    }
                    other => {
                        debug!(event = other.name(), "event dropped while connected");
                        Decision::Drop
                    }
                }
            }
        }
    }
}

struct Machine {
    state: ConnectionState,
    active: Option<Active>,
    generation: u64,
    /// Why the last pairing attempt ended, for `wait_for_connection`
    last_error: Option<ConnectError>,
    state_tx: watch::Sender<ConnectionState>,
}

impl Machine {
    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            info!(from = %self.state, to = %state, "connection state changed");
            self.state = state;
            self.state_tx.send_replace(state);
        }
    }

    fn close_active(&mut self) {
        if let Some(active) = self.active.take() {
            active.shutdown.trigger();
        }
    }

    fn active_mut(&mut self, generation: u64) -> Option<&mut Active> {
        self.active.as_mut().filter(|a| a.generation == generation)
    }
}

struct Inner {
    config: ConnectorConfig,
    store: Arc<dyn SessionStore>,
    transport: Arc<dyn BridgeTransport>,
    machine: Mutex<Machine>,
    listeners: Listeners,
    correlator: Correlator,
    persist_lock: tokio::sync::Mutex<()>,
}

impl Inner {
    fn machine(&self) -> MutexGuard<'_, Machine> {
        self.machine.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Install a new session and start its subscription
    fn open(
        self: &Arc<Self>,
        machine: &mut Machine,
        session: BridgeSession,
        keypair: SessionKeyPair,
        shared_secret: Option<SharedSecret>,
    ) -> (u64, Shutdown) {
        machine.generation += 1;
        let generation = machine.generation;
        let shutdown = Shutdown::new();
        let stream = self.transport.subscribe(
            &session.bridge_url,
            keypair.public_key(),
            session.last_event_id.clone(),
        );
        self.spawn_subscription(stream, &shutdown, generation);
        machine.active = Some(Active {
            generation,
            session,
            keypair,
            shared_secret,
            shutdown: shutdown.clone(),
        });
        (generation, shutdown)
    }

    fn spawn_subscription(self: &Arc<Self>, mut stream: EnvelopeStream, shutdown: &Shutdown, generation: u64) {
        let weak = Arc::downgrade(self);
        let mut stop = shutdown.subscribe();
        tokio::spawn(async move {
            loop {
                let item = tokio::select! {
                    biased;
                    _ = stop.recv() => break,
                    item = stream.next() => item,
                };
                let Some(inner) = weak.upgrade() else { break };
                match item {
                    Some(Ok(envelope)) => inner.handle_envelope(generation, envelope).await,
                    Some(Err(e)) => {
                        inner.handle_stream_end(generation, e).await;
                        break;
                    }
                    None => {
                        inner.handle_stream_end(generation, TransportError::Closed).await;
                        break;
                    }
                }
            }
            debug!(generation, "bridge subscription closed");
        });
    }

    fn spawn_pairing_timeout(self: &Arc<Self>, generation: u64, shutdown: Shutdown) {
        let weak = Arc::downgrade(self);
        let timeout = self.config.pairing_timeout;
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.wait() => {}
                _ = tokio::time::sleep(timeout) => {
                    if let Some(inner) = weak.upgrade() {
                        inner.abandon_pairing(Some(generation), ConnectError::timeout("pairing")).await;
                    }
                }
            }
        });
    }

    fn apply(&self, generation: u64, envelope: &InboundEnvelope) -> Effect {
        let mut machine = self.machine();
        let state = machine.state;
        let Some(active) = machine.active_mut(generation) else {
            return Effect::None;
        };
        let moved = active.advance_cursor(envelope.event_id.as_deref());
        let decision = match state {
            ConnectionState::AwaitingPairing => active.pairing_message(envelope),
            ConnectionState::Connected => active.session_message(envelope),
            _ => Decision::Drop,
        };

        match decision {
            Decision::Drop if moved => Effect::CursorMoved,
            Decision::Drop => Effect::None,
            Decision::Paired(wallet) => {
                machine.last_error = None;
                machine.set_state(ConnectionState::Connected);
                Effect::Paired(wallet)
            }
            Decision::Rejected(error) => {
                machine.close_active();
                machine.last_error = Some(error.clone());
                machine.set_state(ConnectionState::Disconnected);
                Effect::PairingFailed(error)
            }
            Decision::Response(response) => Effect::Response(response),
            Decision::Disconnect => {
                machine.close_active();
                machine.set_state(ConnectionState::Disconnected);
                Effect::WalletDisconnected
            }
        }
    }

    async fn handle_envelope(&self, generation: u64, envelope: InboundEnvelope) {
        match self.apply(generation, &envelope) {
            Effect::None => {}
            Effect::CursorMoved => self.persist().await,
            Effect::Paired(wallet) => {
                info!(address = %wallet.account.address, app = %wallet.device.app_name, "wallet connected");
                self.persist().await;
                self.listeners.status_changed(Some(&wallet));
            }
            Effect::PairingFailed(error) => {
                warn!(error = %error, "wallet declined pairing");
                self.persist().await;
                self.listeners.error(&error);
            }
            Effect::Response(response) => {
                // Cursor is durable before the caller sees the result
                self.persist().await;
                self.correlator.resolve(response.id, response.outcome);
            }
            Effect::WalletDisconnected => {
                info!("wallet ended the session");
                self.session_ended().await;
            }
        }
    }

    async fn handle_stream_end(&self, generation: u64, error: TransportError) {
        let error = ConnectError::Transport(error);
        let previous = {
            let mut machine = self.machine();
            if machine.active_mut(generation).is_none() {
                return;
            }
            let previous = machine.state;
            match previous {
                ConnectionState::Connected => {
                    machine.close_active();
                    machine.set_state(ConnectionState::Terminated);
                }
                ConnectionState::AwaitingPairing => {
                    machine.close_active();
                    machine.last_error = Some(error.clone());
                    machine.set_state(ConnectionState::Disconnected);
                }
                _ => return,
            }
            previous
        };

        if previous == ConnectionState::Connected {
            warn!(error = %error, "bridge subscription abandoned, connector terminated");
            self.correlator.fail_all(|| ConnectError::Terminated);
        } else {
            warn!(error = %error, "bridge subscription abandoned during pairing");
            self.persist().await;
        }
        self.listeners.error(&error);
    }

    async fn abandon_pairing(&self, generation: Option<u64>, error: ConnectError) -> bool {
        {
            let mut machine = self.machine();
            if machine.state != ConnectionState::AwaitingPairing {
                return false;
            }
            if let Some(generation) = generation {
                if machine.active_mut(generation).is_none() {
                    return false;
                }
            }
            machine.close_active();
            machine.last_error = Some(error.clone());
            machine.set_state(ConnectionState::Disconnected);
        }
        info!(reason = %error, "pairing abandoned");
        self.persist().await;
        self.listeners.error(&error);
        true
    }

    async fn close_connected(&self) -> bool {
        {
            let mut machine = self.machine();
            if machine.state != ConnectionState::Connected {
                return false;
            }
            machine.close_active();
            machine.set_state(ConnectionState::Disconnected);
        }
        info!("session closed");
        self.session_ended().await;
        true
    }

    async fn session_ended(&self) {
        self.persist().await;
        self.correlator.fail_all(|| ConnectError::NotConnected);
        self.listeners.status_changed(None);
    }

    /// Write the live session, or clear the record when there is none.
    /// A terminated connector leaves the record for the next process.
    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let snapshot = {
            let mut machine = self.machine();
            let next_request_id = self.correlator.next_id();
            match (machine.state, machine.active.as_mut()) {
                (_, Some(active)) => {
                    active.session.next_request_id = next_request_id;
                    Some(active.session.clone())
                }
                (ConnectionState::Terminated, None) => return,
                (_, None) => None,
            }
        };

        let result = match &snapshot {
            Some(session) => self.store.save(session).await,
            None => self.store.clear().await,
        };
        if let Err(e) = result {
            warn!(error = %e, "session persistence failed, continuing in memory");
        }
    }

    fn channel(&self) -> ConnectResult<SessionChannel> {
        let machine = self.machine();
        match machine.state {
            ConnectionState::Connected => {}
            ConnectionState::Terminated => return Err(ConnectError::Terminated),
            _ => return Err(ConnectError::NotConnected),
        }
        let active = machine.active.as_ref().ok_or(ConnectError::NotConnected)?;
        let (Some(to), Some(secret)) = (active.session.wallet_public_key, active.shared_secret.clone()) else {
            return Err(ConnectError::NotConnected);
        };
        Ok(SessionChannel {
            transport: self.transport.clone(),
            bridge_url: active.session.bridge_url.clone(),
            from: active.session.session_public_key,
            to,
            secret,
        })
    }
}

/// Outbound path of a connected session: encode, encrypt, post
struct SessionChannel {
    transport: Arc<dyn BridgeTransport>,
    bridge_url: String,
    from: [u8; KEY_LEN],
    to: [u8; KEY_LEN],
    secret: SharedSecret,
}

#[async_trait]
impl RpcChannel for SessionChannel {
    async fn deliver(&self, request: &RpcRequest) -> ConnectResult<()> {
        let plaintext = protocol::encode_request(request)?;
        let message = crypto::encrypt(&self.secret, &plaintext)?;
        self.transport
            .send(&self.bridge_url, &self.from, &self.to, &message, Some(&request.method))
            .await?;
        Ok(())
    }
}

/// dApp side of a wallet connection.
///
/// Independent instances share nothing but, optionally, a [`WalletDirectory`].
/// Dropping the connector stops its background subscription.
pub struct WalletConnector {
    inner: Arc<Inner>,
    directory: Arc<WalletDirectory>,
}

impl WalletConnector {
    pub fn new(
        config: ConnectorConfig,
        store: Arc<dyn SessionStore>,
        transport: Arc<dyn BridgeTransport>,
    ) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Disconnected);
        let machine = Machine {
            state: ConnectionState::Disconnected,
            active: None,
            generation: 0,
            last_error: None,
            state_tx,
        };
        Self {
            inner: Arc::new(Inner {
                config,
                store,
                transport,
                machine: Mutex::new(machine),
                listeners: Listeners::default(),
                correlator: Correlator::new(),
                persist_lock: tokio::sync::Mutex::new(()),
            }),
            directory: Arc::new(WalletDirectory::bundled()),
        }
    }

    /// Connector keyed by `connect_id`, persisting under the storage root and
    /// talking to the wallet's HTTP bridge
    #[cfg(feature = "http")]
    pub fn with_file_storage(connect_id: &str, config: ConnectorConfig) -> Self {
        let transport = crate::bridge::HttpBridge::new()
            .with_backoff(config.backoff)
            .with_max_silent_reconnect(config.max_silent_reconnect)
            .with_ttl(config.message_ttl);
        let store = crate::store::FileSessionStore::for_connector(connect_id);
        Self::new(config, Arc::new(store), Arc::new(transport))
    }

    pub fn with_directory(mut self, directory: Arc<WalletDirectory>) -> Self {
        self.directory = directory;
        self
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.machine().state
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// Receiver that observes every state change
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.machine().state_tx.subscribe()
    }

    /// Connected wallet, if any
    pub fn wallet(&self) -> Option<ConnectedWallet> {
        let machine = self.inner.machine();
        if machine.state != ConnectionState::Connected {
            return None;
        }
        machine.active.as_ref().and_then(|a| a.session.wallet.clone())
    }

    pub fn account(&self) -> Option<Account> {
        self.wallet().map(|w| w.account)
    }

    /// Number of RPCs awaiting a wallet response
    pub fn pending_requests(&self) -> usize {
        self.inner.correlator.pending_count()
    }

    pub fn on_status_change(&self, listener: Arc<dyn StatusListener>) -> ListenerToken {
        self.inner.listeners.add(listener)
    }

    pub fn unsubscribe(&self, token: ListenerToken) -> bool {
        self.inner.listeners.remove(token)
    }

    pub async fn wallet_names(&self) -> Vec<String> {
        self.directory.names().await
    }

    /// Resume a stored, paired session without a new handshake.
    ///
    /// Returns `Ok(false)` when there is nothing to restore (no record, a
    /// corrupt record, or a pairing that never completed).
    pub async fn restore(&self) -> ConnectResult<bool> {
        match self.state() {
            ConnectionState::Disconnected => {}
            ConnectionState::Connected => return Ok(true),
            ConnectionState::AwaitingPairing => return Ok(false),
            ConnectionState::Terminated => return Err(ConnectError::Terminated),
        }

        let session = match self.inner.store.load().await {
            Ok(Some(session)) => session,
            Ok(None) => {
                debug!("no stored session");
                return Ok(false);
            }
            Err(e) => {
                warn!(error = %e, "stored session unreadable");
                return Ok(false);
            }
        };
        let (Some(wallet_key), Some(wallet)) = (session.wallet_public_key, session.wallet.clone()) else {
            debug!("stored session was never paired");
            return Ok(false);
        };
        let keypair = session.keypair();
        if keypair.public_key() != &session.session_public_key {
            warn!("stored session keys do not match, ignoring record");
            return Ok(false);
        }
        let secret = crypto::derive_shared_secret(keypair.secret_key(), &wallet_key)?;

        {
            let mut machine = self.inner.machine();
            if machine.state != ConnectionState::Disconnected {
                return Ok(machine.state == ConnectionState::Connected);
            }
            self.inner.correlator.advance_to(session.next_request_id);
            self.inner.open(&mut machine, session, keypair, Some(secret));
            machine.last_error = None;
            machine.set_state(ConnectionState::Connected);
        }
        info!(address = %wallet.account.address, "session restored");
        self.inner.listeners.status_changed(Some(&wallet));
        Ok(true)
    }

    /// Start pairing with `wallet`; returns the universal link to show the user
    pub async fn connect(&self, wallet: &WalletManifest) -> ConnectResult<String> {
        self.start_pairing(wallet, ConnectRequest::new(&self.inner.config.manifest_url)).await
    }

    /// Like [`connect`](Self::connect), also requesting a `ton_proof` over `payload`
    pub async fn connect_with_proof(
        &self,
        wallet: &WalletManifest,
        payload: impl Into<String>,
    ) -> ConnectResult<String> {
        let request = ConnectRequest::new(&self.inner.config.manifest_url).with_proof(payload);
        self.start_pairing(wallet, request).await
    }

    /// Look the wallet up in the directory and start pairing
    pub async fn connect_by_name(&self, name: &str) -> ConnectResult<String> {
        let wallet = self.directory.find(name).await?;
        self.connect(&wallet).await
    }

    async fn start_pairing(&self, wallet: &WalletManifest, request: ConnectRequest) -> ConnectResult<String> {
        let keypair = crypto::generate_keypair()?;
        let link = protocol::universal_link(
            &wallet.universal_link,
            &keypair.public_key_hex(),
            &wallet.bridge_url,
            &request,
        )?;
        let session = BridgeSession::pending(&wallet.bridge_url, &keypair);

        let (generation, shutdown) = {
            let mut machine = self.inner.machine();
            match machine.state {
                ConnectionState::Connected => return Err(ConnectError::AlreadyConnected),
                ConnectionState::Terminated => return Err(ConnectError::Terminated),
                ConnectionState::AwaitingPairing => {
                    debug!("replacing unfinished pairing");
                    machine.close_active();
                }
                ConnectionState::Disconnected => {}
            }
            let opened = self.inner.open(&mut machine, session, keypair, None);
            machine.last_error = None;
            machine.set_state(ConnectionState::AwaitingPairing);
            opened
        };
        self.inner.spawn_pairing_timeout(generation, shutdown);
        self.inner.persist().await;
        info!(wallet = %wallet.name, bridge = %wallet.bridge_url, "awaiting pairing");
        Ok(link)
    }

    /// Abandon an unfinished pairing. Returns false if none was in progress.
    pub async fn cancel_pairing(&self) -> bool {
        self.inner.abandon_pairing(None, ConnectError::PairingCancelled).await
    }

    /// Resolve once the wallet is connected; immediately if it already is.
    /// Fails with the reason the pending pairing ended.
    pub async fn wait_for_connection(&self) -> ConnectResult<ConnectedWallet> {
        let mut rx = self.watch_state();
        loop {
            let state = *rx.borrow_and_update();
            match state {
                ConnectionState::Connected => return self.wallet().ok_or(ConnectError::NotConnected),
                ConnectionState::Disconnected => {
                    let last_error = self.inner.machine().last_error.clone();
                    return Err(last_error.unwrap_or(ConnectError::NotConnected));
                }
                ConnectionState::Terminated => return Err(ConnectError::Terminated),
                ConnectionState::AwaitingPairing => {}
            }
            if rx.changed().await.is_err() {
                return Err(ConnectError::Terminated);
            }
        }
    }

    async fn request(
        &self,
        build: impl FnOnce(u64) -> Result<RpcRequest, ProtocolError>,
        timeout: Duration,
    ) -> ConnectResult<RpcOutcome> {
        let channel = self.inner.channel()?;
        let pending = self.inner.correlator.issue(&channel, build).await?;
        self.inner.persist().await;
        pending.wait(timeout).await
    }

    /// Ask the wallet to sign and send `transaction`.
    ///
    /// A user rejection is `Err(ConnectError::UserRejection)`; the session
    /// stays connected.
    pub async fn send_transaction(&self, transaction: &Transaction) -> ConnectResult<SendTransactionResponse> {
        let outcome = self
            .request(|id| RpcRequest::send_transaction(id, transaction), self.inner.config.request_timeout)
            .await?;
        match outcome? {
            Value::String(boc) => Ok(SendTransactionResponse { boc }),
            other => Err(ProtocolError::InvalidField {
                field: "result",
                reason: format!("expected BoC string, got {other}"),
            }
            .into()),
        }
    }

    /// Single transfer of `amount` nanotons to `address`
    pub async fn send_transfer(
        &self,
        address: impl Into<String>,
        amount: impl Into<String>,
        payload: Option<String>,
    ) -> ConnectResult<SendTransactionResponse> {
        let mut message = TransactionMessage::new(address, amount);
        message.payload = payload;
        let transaction = Transaction::new(vec![message], self.inner.config.transaction_validity);
        self.send_transaction(&transaction).await
    }

    /// End the session: notify the wallet (best effort, bounded by
    /// `disconnect_timeout`), then clear the stored session.
    pub async fn disconnect(&self) -> ConnectResult<()> {
        match self.state() {
            ConnectionState::Connected => {}
            ConnectionState::AwaitingPairing => {
                self.cancel_pairing().await;
                return Ok(());
            }
            ConnectionState::Disconnected => return Err(ConnectError::NotConnected),
            ConnectionState::Terminated => return Err(ConnectError::Terminated),
        }

        match self
            .request(|id| Ok(RpcRequest::disconnect(id)), self.inner.config.disconnect_timeout)
            .await
        {
            Ok(Ok(_)) => debug!("wallet acknowledged disconnect"),
            Ok(Err(e)) => warn!(code = e.code, message = %e.message, "wallet answered disconnect with an error"),
            Err(e) => warn!(error = %e, "disconnect not acknowledged, closing locally"),
        }
        self.inner.close_connected().await;
        Ok(())
    }
}

impl Drop for WalletConnector {
    fn drop(&mut self) {
        if let Some(active) = self.inner.machine().active.as_ref() {
            active.shutdown.trigger();
        }
    }
}
