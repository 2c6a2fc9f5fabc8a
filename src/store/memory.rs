//! In-memory session store. Holds the encoded record so loads go through
//! the same decoding as the file store.

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use super::{BridgeSession, SessionStore, StoredRecord};
use crate::error::StorageError;

#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    record: Arc<Mutex<Option<Vec<u8>>>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw encoded record, if any
    pub fn raw(&self) -> Option<Vec<u8>> {
        self.record.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    /// Overwrite the raw record (e.g. to simulate corruption)
    pub fn set_raw(&self, raw: Option<Vec<u8>>) {
        *self.record.lock().unwrap_or_else(|p| p.into_inner()) = raw;
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn load(&self) -> Result<Option<BridgeSession>, StorageError> {
        Ok(self.raw().and_then(|raw| StoredRecord::decode(&raw)))
    }

    async fn save(&self, session: &BridgeSession) -> Result<(), StorageError> {
        let raw = StoredRecord::encode(session)?;
        self.set_raw(Some(raw));
        Ok(())
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.set_raw(None);
        Ok(())
    }
}
