//! Correlator - call/response semantics over the bridge event stream
//!
//! Each issued request gets the next id and a pending entry; the matching
//! response (by id) resolves it. Timeouts, caller cancellation (dropping the
//! [`PendingResponse`]) and session teardown all remove the entry, so late or
//! duplicate responses find nothing and are ignored.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::debug;

use crate::error::{ConnectError, ConnectResult, ProtocolError};
use crate::protocol::{RpcOutcome, RpcRequest};

type Resolution = ConnectResult<RpcOutcome>;

/// Outbound path for requests (encode, encrypt, post)
#[async_trait]
pub trait RpcChannel: Send + Sync {
    async fn deliver(&self, request: &RpcRequest) -> ConnectResult<()>;
}

/// In-flight request awaiting its response
#[derive(Debug)]
pub struct PendingRequest {
    pub id: u64,
    pub method: String,
    pub created_at: Instant,
    result: oneshot::Sender<Resolution>,
}

type PendingMap = Mutex<HashMap<u64, PendingRequest>>;

fn lock(pending: &PendingMap) -> MutexGuard<'_, HashMap<u64, PendingRequest>> {
    pending.lock().unwrap_or_else(|p| p.into_inner())
}

#[derive(Debug)]
pub struct Correlator {
    next_id: AtomicU64,
    pending: Arc<PendingMap>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn starting_at(next_id: u64) -> Self {
        Self { next_id: AtomicU64::new(next_id), pending: Arc::new(Mutex::new(HashMap::new())) }
    }

    /// Id the next request will get
    pub fn next_id(&self) -> u64 {
        self.next_id.load(Ordering::SeqCst)
    }

    /// Raise the id counter to at least `next_id` (never lowers it)
    pub fn advance_to(&self, next_id: u64) {
        self.next_id.fetch_max(next_id, Ordering::SeqCst);
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.pending).len()
    }

    pub fn is_pending(&self, id: u64) -> bool {
        lock(&self.pending).contains_key(&id)
    }

    /// Build the request under the next id, register it and send it.
    /// Returns the awaitable response.
    pub async fn issue(
        &self,
        channel: &dyn RpcChannel,
        build: impl FnOnce(u64) -> Result<RpcRequest, ProtocolError>,
    ) -> ConnectResult<PendingResponse> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = build(id)?;
        let (tx, rx) = oneshot::channel();
        lock(&self.pending).insert(
            id,
            PendingRequest { id, method: request.method.clone(), created_at: Instant::now(), result: tx },
        );

        // Registered before sending: a fast response must find its entry.
        let response = PendingResponse {
            id,
            method: request.method.clone(),
            rx,
            pending: Arc::downgrade(&self.pending),
        };
        channel.deliver(&request).await?;
        debug!(id, method = %request.method, "rpc request sent");
        Ok(response)
    }

    /// Resolve the request `id`. Returns false for unknown (late, duplicate) ids.
    pub fn resolve(&self, id: u64, outcome: RpcOutcome) -> bool {
        let Some(entry) = lock(&self.pending).remove(&id) else {
            debug!(id, "response for unknown request ignored");
            return false;
        };
        debug!(id, method = %entry.method, elapsed = ?entry.created_at.elapsed(), "rpc response");
        let _ = entry.result.send(Ok(outcome));
        true
    }

    /// Fail every pending request, e.g. when the session ends
    pub fn fail_all(&self, error: impl Fn() -> ConnectError) {
        let drained: Vec<_> = lock(&self.pending).drain().map(|(_, entry)| entry).collect();
        for entry in drained {
            let _ = entry.result.send(Err(error()));
        }
    }
}

/// Awaitable result of an issued request. Dropping it cancels the request.
#[derive(Debug)]
pub struct PendingResponse {
    id: u64,
    method: String,
    rx: oneshot::Receiver<Resolution>,
    pending: Weak<PendingMap>,
}

impl PendingResponse {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait up to `timeout` for the wallet's answer
    pub async fn wait(mut self, timeout: Duration) -> ConnectResult<RpcOutcome> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(resolution)) => resolution,
            Ok(Err(_)) => Err(ConnectError::RequestCancelled),
            Err(_) => {
                self.forget();
                Err(ConnectError::timeout(self.method.clone()))
            }
        }
    }

    fn forget(&self) {
        if let Some(pending) = self.pending.upgrade() {
            lock(&pending).remove(&self.id);
        }
    }
}

impl Drop for PendingResponse {
    fn drop(&mut self) {
        self.forget();
    }
}
