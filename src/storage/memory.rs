//! In-process storage backend.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;

use super::SessionStorage;
use crate::error::PollError;
use crate::session::{SessionId, SessionRecord};
use crate::Result;

/// Thread-safe in-memory record store. Contents are lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    records: RwLock<HashMap<SessionId, SessionRecord>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn count(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }
}

fn poisoned<T>(_: T) -> PollError {
    PollError::LockPoisoned
}

#[async_trait]
impl SessionStorage for MemoryStorage {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.get(id).cloned())
    }

    async fn save(&self, record: &SessionRecord) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        records.insert(record.id(), record.clone());
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        let mut records = self.records.write().map_err(poisoned)?;
        records.remove(id);
        Ok(())
    }

    async fn list_ids(&self) -> Result<Vec<SessionId>> {
        let records = self.records.read().map_err(poisoned)?;
        Ok(records.keys().copied().collect())
    }
}
