//! Durable mapping of agent id to agent record
//!
//! All access goes through a transaction. A transaction holds the mapping
//! lock for its whole lifetime, works on a private copy and publishes it on
//! commit; dropping it without committing discards its changes.

use crate::error::StoreError;
use crate::models::{AgentId, AgentRecord};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

/// Transactional store of agent records
#[async_trait]
pub trait AgentStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn AgentTransaction>, StoreError>;
}

/// One unit of work against the store
#[async_trait]
pub trait AgentTransaction: Send {
    /// Insert or replace a record
    async fn put(&mut self, record: AgentRecord) -> Result<(), StoreError>;

    async fn remove(&mut self, agent_id: &AgentId) -> Result<Option<AgentRecord>, StoreError>;

    async fn enumerate(&mut self) -> Result<Vec<AgentRecord>, StoreError>;

    /// Make the changes durable and visible
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    /// Discard the changes. Dropping the transaction has the same effect.
    async fn abort(self: Box<Self>);
}

type RecordMap = BTreeMap<AgentId, AgentRecord>;

/// Record store kept in memory and, optionally, mirrored to a JSON file
#[derive(Clone)]
pub struct RecordStore {
    records: Arc<Mutex<RecordMap>>,
    path: Option<PathBuf>,
}

impl RecordStore {
    /// Store with no backing file
    pub fn in_memory() -> Self {
        Self {
            records: Arc::new(Mutex::new(RecordMap::new())),
            path: None,
        }
    }

    /// Open (or create) a store backed by `path`
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let records = match tokio::fs::read(&path).await {
            Ok(bytes) if bytes.is_empty() => RecordMap::new(),
            Ok(bytes) => {
                let list: Vec<AgentRecord> = serde_json::from_slice(&bytes)?;
                list.into_iter().map(|r| (r.agent_id, r)).collect()
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => RecordMap::new(),
            Err(e) => return Err(io_error(&path, e)),
        };

        info!(path = %path.display(), records = records.len(), "Opened agent store");

        Ok(Self {
            records: Arc::new(Mutex::new(records)),
            path: Some(path),
        })
    }

    /// Number of committed records
    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl AgentStore for RecordStore {
    async fn begin(&self) -> Result<Box<dyn AgentTransaction>, StoreError> {
        let guard = self.records.clone().lock_owned().await;
        let working = guard.clone();

        Ok(Box::new(RecordTransaction {
            guard,
            working,
            path: self.path.clone(),
        }))
    }
}

struct RecordTransaction {
    guard: OwnedMutexGuard<RecordMap>,
    working: RecordMap,
    path: Option<PathBuf>,
}

#[async_trait]
impl AgentTransaction for RecordTransaction {
    async fn put(&mut self, record: AgentRecord) -> Result<(), StoreError> {
        self.working.insert(record.agent_id, record);
        Ok(())
    }

    async fn remove(&mut self, agent_id: &AgentId) -> Result<Option<AgentRecord>, StoreError> {
        Ok(self.working.remove(agent_id))
    }

    async fn enumerate(&mut self) -> Result<Vec<AgentRecord>, StoreError> {
        Ok(self.working.values().cloned().collect())
    }

    async fn commit(mut self: Box<Self>) -> Result<(), StoreError> {
        if let Some(path) = &self.path {
            persist(path, &self.working).await?;
        }
        debug!(records = self.working.len(), "Agent store transaction committed");

        let working = std::mem::take(&mut self.working);
        *self.guard = working;
        Ok(())
    }

    async fn abort(self: Box<Self>) {
        debug!("Agent store transaction aborted");
    }
}

/// Write the snapshot next to `path` and rename it into place
async fn persist(path: &Path, records: &RecordMap) -> Result<(), StoreError> {
    let list: Vec<&AgentRecord> = records.values().collect();
    let bytes = serde_json::to_vec_pretty(&list)?;

    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, &bytes)
        .await
        .map_err(|e| io_error(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| io_error(path, e))?;
    Ok(())
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StressRequest;
    use tempfile::TempDir;

    fn record() -> AgentRecord {
        AgentRecord::new(
            AgentId::new(),
            StressRequest {
                cpu_target: 50,
                memory_target_mb: 64,
                active: true,
                agent_count: 1,
            },
        )
    }

    #[tokio::test]
    async fn test_committed_put_is_visible() {
        let store = RecordStore::in_memory();
        let record = record();

        let mut tx = store.begin().await.unwrap();
        tx.put(record.clone()).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert_eq!(tx.enumerate().await.unwrap(), vec![record]);
    }

    #[tokio::test]
    async fn test_dropped_transaction_discards_changes() {
        let store = RecordStore::in_memory();

        {
            let mut tx = store.begin().await.unwrap();
            tx.put(record()).await.unwrap();
        }
        let mut tx = store.begin().await.unwrap();
        tx.put(record()).await.unwrap();
        tx.abort().await;

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_missing_returns_none() {
        let store = RecordStore::in_memory();
        let mut tx = store.begin().await.unwrap();

        assert!(tx.remove(&AgentId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transactions_are_exclusive() {
        let store = RecordStore::in_memory();
        let first = store.begin().await.unwrap();

        let contender = store.clone();
        let second = tokio::spawn(async move { contender.begin().await.map(|_| ()) });

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(!second.is_finished());

        first.commit().await.unwrap();
        tokio_test::assert_ok!(second.await.unwrap());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agents.json");
        let kept = record();
        let removed = record();

        let store = RecordStore::open(&path).await.unwrap();
        let mut tx = store.begin().await.unwrap();
        tx.put(kept.clone()).await.unwrap();
        tx.put(removed.clone()).await.unwrap();
        tx.commit().await.unwrap();

        let mut tx = store.begin().await.unwrap();
        assert!(tx.remove(&removed.agent_id).await.unwrap().is_some());
        tx.commit().await.unwrap();

        let reopened = RecordStore::open(&path).await.unwrap();
        let mut tx = reopened.begin().await.unwrap();
        assert_eq!(tx.enumerate().await.unwrap(), vec![kept]);
    }

    #[tokio::test]
    async fn test_open_rejects_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("agents.json");
        tokio::fs::write(&path, b"not json").await.unwrap();

        let result = RecordStore::open(&path).await;
        assert!(matches!(result, Err(StoreError::Corrupt(_))));
    }
}
