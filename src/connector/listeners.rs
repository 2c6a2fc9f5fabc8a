//! Status listeners - observer registry with token-based removal

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::error::ConnectError;
use crate::protocol::ConnectedWallet;

/// Receives connection status changes.
///
/// Called after a transition has completed and no connector lock is held,
/// so a listener may call back into the connector (including `unsubscribe`).
pub trait StatusListener: Send + Sync {
    /// `Some` when a wallet became connected, `None` when the session ended
    fn on_status_change(&self, wallet: Option<&ConnectedWallet>);

    /// Pairing failures, pairing timeouts and abandoned subscriptions
    fn on_error(&self, _error: &ConnectError) {}
}

/// Handle returned by registration, used to remove the listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerToken(u64);

type Entry = (ListenerToken, Arc<dyn StatusListener>);

#[derive(Default)]
pub(crate) struct Listeners {
    next: AtomicU64,
    entries: Mutex<Vec<Entry>>,
}

impl Listeners {
    fn entries(&self) -> MutexGuard<'_, Vec<Entry>> {
        self.entries.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn add(&self, listener: Arc<dyn StatusListener>) -> ListenerToken {
        let token = ListenerToken(self.next.fetch_add(1, Ordering::Relaxed));
        self.entries().push((token, listener));
        token
    }

    pub fn remove(&self, token: ListenerToken) -> bool {
        let mut entries = self.entries();
        let before = entries.len();
        entries.retain(|(t, _)| *t != token);
        entries.len() != before
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries().len()
    }

    // Callbacks run on a snapshot so listeners can (un)register from inside one.
    fn snapshot(&self) -> Vec<Arc<dyn StatusListener>> {
        self.entries().iter().map(|(_, l)| l.clone()).collect()
    }

    pub fn status_changed(&self, wallet: Option<&ConnectedWallet>) {
        for listener in self.snapshot() {
            listener.on_status_change(wallet);
        }
    }

    pub fn error(&self, error: &ConnectError) {
        for listener in self.snapshot() {
            listener.on_error(error);
        }
    }
}
