//! Routing of session IDs to their coordinators.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, Weak};

use tracing::{info, warn};

use super::coordinator::{CoordinatorConfig, CoordinatorHandle};
use super::{NewSession, Session, SessionId};
use crate::error::PollError;
use crate::storage::{MemoryStorage, SessionStorage};
use crate::Result;

/// Thread-safe map from session ID to its single coordinator.
///
/// Cloning is cheap; all clones share the same map and storage.
#[derive(Clone)]
pub struct SessionRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    handles: RwLock<HashMap<SessionId, CoordinatorHandle>>,
    storage: Arc<dyn SessionStorage>,
    config: CoordinatorConfig,
}

impl RegistryInner {
    /// Drop the entry for `id` if its coordinator has stopped.
    ///
    /// A newer, live coordinator registered under the same ID is kept.
    fn remove_stopped(&self, id: &SessionId) {
        let mut handles = match self.handles.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if handles.get(id).is_some_and(CoordinatorHandle::is_stopped) {
            handles.remove(id);
        }
    }
}

impl SessionRegistry {
    /// Create a registry over the given storage backend.
    pub fn new(storage: Arc<dyn SessionStorage>, config: CoordinatorConfig) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                handles: RwLock::new(HashMap::new()),
                storage,
                config,
            }),
        }
    }

    /// Registry backed by [`MemoryStorage`] with default settings.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStorage::new()), CoordinatorConfig::default())
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.inner.config
    }

    /// Get the coordinator for `id`, spawning one on first use.
    ///
    /// A coordinator removes its own entry when it stops; a stopped handle
    /// still found here is replaced by a fresh coordinator.
    pub fn coordinator(&self, id: SessionId) -> Result<CoordinatorHandle> {
        {
            let handles = self
                .inner
                .handles
                .read()
                .map_err(|_| PollError::LockPoisoned)?;
            if let Some(handle) = handles.get(&id).filter(|h| !h.is_stopped()) {
                return Ok(handle.clone());
            }
        }

        let mut handles = self
            .inner
            .handles
            .write()
            .map_err(|_| PollError::LockPoisoned)?;

        // Re-check under the write lock so two callers never spawn twice.
        if let Some(handle) = handles.get(&id).filter(|h| !h.is_stopped()) {
            return Ok(handle.clone());
        }

        let registry: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let handle = CoordinatorHandle::spawn_with_exit_hook(
            id,
            Arc::clone(&self.inner.storage),
            self.inner.config.clone(),
            move || {
                if let Some(inner) = registry.upgrade() {
                    inner.remove_stopped(&id);
                }
            },
        );
        handles.insert(id, handle.clone());
        Ok(handle)
    }

    /// Create a session under a freshly generated ID.
    pub async fn create(&self, params: NewSession) -> Result<Session> {
        let id = SessionId::new();
        let handle = self.coordinator(id)?;

        match handle.init(params).await {
            Ok(session) => Ok(session),
            Err(e) => {
                self.forget(&id)?;
                Err(e)
            }
        }
    }

    /// Drop the registry's handle for `id`.
    ///
    /// The coordinator keeps running while other handles to it exist.
    pub fn forget(&self, id: &SessionId) -> Result<Option<CoordinatorHandle>> {
        let mut handles = self
            .inner
            .handles
            .write()
            .map_err(|_| PollError::LockPoisoned)?;
        Ok(handles.remove(id))
    }

    /// Number of live coordinators.
    pub fn count(&self) -> usize {
        self.inner
            .handles
            .read()
            .map(|h| h.values().filter(|h| !h.is_stopped()).count())
            .unwrap_or(0)
    }

    /// IDs of all live coordinators.
    pub fn list_ids(&self) -> Result<Vec<SessionId>> {
        let handles = self
            .inner
            .handles
            .read()
            .map_err(|_| PollError::LockPoisoned)?;
        Ok(handles
            .iter()
            .filter(|(_, h)| !h.is_stopped())
            .map(|(id, _)| *id)
            .collect())
    }

    /// Bring every persisted session back under a coordinator.
    ///
    /// Sessions past their expiry are wiped; the rest get their expiry
    /// timers re-armed. Returns the number of sessions restored.
    pub async fn recover(&self) -> Result<usize> {
        let ids = self.inner.storage.list_ids().await?;
        let mut restored = 0;
        let mut expired = 0;

        for id in ids {
            let handle = self.coordinator(id)?;
            match handle.export().await {
                Ok(_) => restored += 1,
                Err(PollError::NotFound(_)) => {
                    expired += 1;
                    self.forget(&id)?;
                }
                Err(e) => warn!(session = %id, error = %e, "failed to restore session"),
            }
        }

        info!(restored, expired, "session recovery complete");
        Ok(restored)
    }
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::in_memory()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{fixtures, VoteMode};
    use tokio_test::{assert_err, assert_ok};

    fn colours() -> NewSession {
        NewSession::new("Favourite colour?", VoteMode::Single, ["red", "blue"])
    }

    /// Entries in the map, live or not.
    fn tracked(registry: &SessionRegistry) -> usize {
        registry.inner.handles.read().unwrap().len()
    }

    async fn wait_until_tracked(registry: &SessionRegistry, expected: usize) {
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while tracked(registry) != expected {
                tokio::task::yield_now().await;
            }
        })
        .await
        .expect("registry entries were not released");
    }

    #[tokio::test]
    async fn test_create_session() {
        let registry = SessionRegistry::in_memory();
        let session = assert_ok!(registry.create(colours()).await);

        assert_eq!(registry.count(), 1);
        assert_eq!(registry.list_ids().unwrap(), vec![session.id]);

        let handle = registry.coordinator(session.id).unwrap();
        assert_eq!(handle.export().await.unwrap(), session);
    }

    #[tokio::test]
    async fn test_failed_create_leaves_nothing() {
        let registry = SessionRegistry::in_memory();
        let err = assert_err!(
            registry
                .create(NewSession::new("q", VoteMode::Single, ["only one"]))
                .await
        );

        assert!(matches!(err, PollError::Validation(_)));
        assert_eq!(registry.count(), 0);
    }

    #[tokio::test]
    async fn test_same_id_same_coordinator() {
        let registry = SessionRegistry::in_memory();
        let session = registry.create(colours()).await.unwrap();

        let a = registry.coordinator(session.id).unwrap();
        let b = registry.coordinator(session.id).unwrap();
        a.submit_vote(vec!["1".into()], "voter-1").await.unwrap();
        assert!(matches!(
            b.submit_vote(vec!["2".into()], "voter-1").await,
            Err(PollError::AlreadyVoted)
        ));
    }

    #[tokio::test]
    async fn test_unknown_id_not_found() {
        let registry = SessionRegistry::in_memory();
        let handle = registry.coordinator(SessionId::new()).unwrap();
        assert!(matches!(
            handle.snapshot(None).await,
            Err(PollError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_expired_handle_is_replaced() {
        let registry = SessionRegistry::in_memory();
        let session = registry.create(colours()).await.unwrap();
        let old = registry.coordinator(session.id).unwrap();
        old.expire().await.unwrap();

        // The stopped coordinator takes its entry with it.
        wait_until_tracked(&registry, 0).await;
        assert!(old.is_stopped());
        assert_eq!(registry.count(), 0);

        let fresh = registry.coordinator(session.id).unwrap();
        assert!(!fresh.is_stopped());
        assert!(matches!(
            fresh.export().await,
            Err(PollError::NotFound(_))
        ));

        // Nothing was created, so the fresh coordinator goes away as well.
        wait_until_tracked(&registry, 0).await;
    }

    #[tokio::test]
    async fn test_unknown_lookups_leave_no_entries() {
        let registry = SessionRegistry::in_memory();
        let live = registry.create(colours()).await.unwrap();

        for _ in 0..500 {
            let handle = registry.coordinator(SessionId::new()).unwrap();
            assert!(matches!(
                handle.snapshot(None).await,
                Err(PollError::NotFound(_))
            ));
        }

        wait_until_tracked(&registry, 1).await;
        assert_eq!(registry.list_ids().unwrap(), vec![live.id]);
    }

    #[tokio::test]
    async fn test_exit_keeps_newer_coordinator() {
        let registry = SessionRegistry::in_memory();
        let id = SessionId::new();
        let stale = CoordinatorHandle::spawn(
            id,
            Arc::new(MemoryStorage::new()),
            CoordinatorConfig::default(),
        );
        registry.inner.handles.write().unwrap().insert(id, stale.clone());
        let _ = stale.export().await;
        while !stale.is_stopped() {
            tokio::task::yield_now().await;
        }

        // The stopped handle is swapped for a live one, which a late exit
        // of the old coordinator must not remove.
        let fresh = registry.coordinator(id).unwrap();
        registry.inner.remove_stopped(&id);
        assert_eq!(tracked(&registry), 1);
        assert!(!fresh.is_stopped());
    }

    #[tokio::test]
    async fn test_recover_restores_and_wipes() {
        let storage = Arc::new(MemoryStorage::new());
        let live = fixtures::record(VoteMode::Single, &["a", "b"]);
        let mut stale = fixtures::record(VoteMode::Single, &["a", "b"]);
        stale.expires_at = chrono::Utc::now() - chrono::Duration::hours(1);
        storage.save(&live).await.unwrap();
        storage.save(&stale).await.unwrap();

        let registry = SessionRegistry::new(storage.clone(), CoordinatorConfig::default());
        assert_eq!(registry.recover().await.unwrap(), 1);

        assert_eq!(storage.count(), 1);
        assert_eq!(registry.list_ids().unwrap(), vec![live.id()]);
        let restored = registry.coordinator(live.id()).unwrap().export().await.unwrap();
        assert_eq!(restored, live.session);
    }

    #[tokio::test]
    async fn test_parallel_sessions() {
        let registry = SessionRegistry::in_memory();
        let mut tasks = Vec::new();

        for _ in 0..20 {
            let registry = registry.clone();
            tasks.push(tokio::spawn(async move {
                let session = registry.create(colours()).await.unwrap();
                let handle = registry.coordinator(session.id).unwrap();
                for voter in 0..10 {
                    handle
                        .submit_vote(vec!["1".into()], format!("voter-{}", voter))
                        .await
                        .unwrap();
                }
                session.id
            }));
        }

        for task in tasks {
            let id = task.await.unwrap();
            let session = registry.coordinator(id).unwrap().export().await.unwrap();
            assert_eq!(session.total_votes(), 10);
        }
        assert_eq!(registry.count(), 20);
    }
}
