//! Directory-backed storage: one JSON document per session.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::SessionStorage;
use crate::error::PollError;
use crate::session::{SessionId, SessionRecord};
use crate::Result;

const EXTENSION: &str = "json";

/// Stores each record as `<session-id>.json` under a root directory.
///
/// Writes go to a sibling temp file that is flushed to disk and then renamed
/// over the target, so a reader never observes a half-written record.
#[derive(Debug, Clone)]
pub struct FileStorage {
    root: PathBuf,
}

impl FileStorage {
    /// Open (creating if needed) a storage directory.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn record_path(&self, id: &SessionId) -> PathBuf {
        self.root.join(format!("{}.{}", id, EXTENSION))
    }

    fn temp_path(&self, id: &SessionId) -> PathBuf {
        self.root.join(format!("{}.{}.tmp", id, EXTENSION))
    }
}

#[async_trait]
impl SessionStorage for FileStorage {
    async fn load(&self, id: &SessionId) -> Result<Option<SessionRecord>> {
        let path = self.record_path(id);
        match fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes).map(Some).map_err(|e| {
                PollError::Storage(format!("unreadable record {}: {}", path.display(), e))
            }),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn save(&self, record: &SessionRecord) -> Result<()> {
        let id = record.id();
        let bytes = serde_json::to_vec(record)?;
        let temp = self.temp_path(&id);

        let mut file = fs::File::create(&temp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        fs::rename(&temp, self.record_path(&id)).await?;
        Ok(())
    }

    async fn delete(&self, id: &SessionId) -> Result<()> {
        match fs::remove_file(self.record_path(id)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn list_ids(&self) -> Result<Vec<SessionId>> {
        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&self.root).await?;

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match stem.parse::<SessionId>() {
                Ok(id) => ids.push(id),
                Err(_) => tracing::warn!(path = %path.display(), "skipping unrecognized file"),
            }
        }

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{fixtures, VoteMode};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_roundtrip_through_disk() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).await.unwrap();
        let mut record = fixtures::record(VoteMode::Multiple, &["a", "b", "c"]);
        record.session.apply_ballot(&["2".to_string()]);
        record.voters.insert("voter-1");

        storage.save(&record).await.unwrap();

        let reopened = FileStorage::open(dir.path()).await.unwrap();
        let loaded = reopened.load(&record.id()).await.unwrap();
        assert_eq!(loaded, Some(record));
    }

    #[tokio::test]
    async fn test_no_temp_file_left_behind() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).await.unwrap();
        let record = fixtures::record(VoteMode::Single, &["a", "b"]);
        storage.save(&record).await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec![format!("{}.json", record.id())]);
    }

    #[tokio::test]
    async fn test_save_replaces_longer_record() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).await.unwrap();
        let mut record = fixtures::record(VoteMode::Single, &["a", "b"]);
        for n in 0..20 {
            record.voters.insert(format!("voter-{n}"));
        }
        storage.save(&record).await.unwrap();

        let mut shorter = record.clone();
        shorter.voters = Default::default();
        storage.save(&shorter).await.unwrap();

        assert_eq!(storage.load(&record.id()).await.unwrap(), Some(shorter));
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path().join("polls")).await.unwrap();
        let a = fixtures::record(VoteMode::Single, &["a", "b"]);
        let b = fixtures::record(VoteMode::Single, &["a", "b"]);
        storage.save(&a).await.unwrap();
        storage.save(&b).await.unwrap();
        std::fs::write(storage.root().join("notes.txt"), "ignored").unwrap();

        let mut ids = storage.list_ids().await.unwrap();
        ids.sort_by_key(|id| id.to_string());
        let mut expected = vec![a.id(), b.id()];
        expected.sort_by_key(|id| id.to_string());
        assert_eq!(ids, expected);

        storage.delete(&a.id()).await.unwrap();
        storage.delete(&a.id()).await.unwrap();
        assert!(storage.load(&a.id()).await.unwrap().is_none());
        assert_eq!(storage.list_ids().await.unwrap(), vec![b.id()]);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_an_error() {
        let dir = TempDir::new().unwrap();
        let storage = FileStorage::open(dir.path()).await.unwrap();
        let id = SessionId::new();
        std::fs::write(dir.path().join(format!("{}.json", id)), "{not json").unwrap();

        let err = storage.load(&id).await.unwrap_err();
        assert!(matches!(err, PollError::Storage(_)));
        assert_eq!(err.kind(), "INTERNAL_ERROR");
    }
}
