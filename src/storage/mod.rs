//! Persistent storage for session records.
//!
//! A [`SessionRecord`] bundles the session, its voter ledger and the expiry
//! due-time, so a single `save` persists all of them together and a single
//! `delete` erases them together. Only the session's coordinator calls into
//! storage.

mod file;
mod memory;

use async_trait::async_trait;

use crate::session::{SessionId, SessionRecord};
use crate::Result;

pub use file::FileStorage;
pub use memory::MemoryStorage;

/// Key-value store of session records keyed by session ID.
#[async_trait]
pub trait SessionStorage: Send + Sync {
    /// Load the record for `id`, if present.
    async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>>;

    /// Insert or replace a record.
    async fn save(&self, record: &SessionRecord) -> Result<()>;

    /// Remove a record. Removing an absent record is not an error.
    async fn delete(&self, id: &SessionId) -> Result<()>;

    /// IDs of every stored record.
    async fn list_ids(&self) -> Result<Vec<SessionId>>;
}
