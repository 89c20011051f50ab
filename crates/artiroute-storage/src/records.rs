//! Artifact metadata access used by the orchestrators.

use std::collections::HashMap;

use artiroute_core::{ArtifactKind, StorageAction};
use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{StorageError, StorageResult};
use crate::locations;

/// File name and Location Set of model and dataset records.
///
/// `update_locations` must be atomic per record: two concurrent `add`s on the
/// same record both land.
#[async_trait]
pub trait ArtifactRecordStore: Send + Sync {
    async fn file_name(&self, kind: ArtifactKind, id: i64) -> StorageResult<String>;

    async fn locations(&self, kind: ArtifactKind, id: i64) -> StorageResult<Vec<String>>;

    /// Apply `action` and return the stored set.
    async fn update_locations(
        &self,
        kind: ArtifactKind,
        id: i64,
        action: StorageAction,
        servers: &[String],
    ) -> StorageResult<Vec<String>>;
}

#[derive(Debug, Clone)]
struct MemoryRecord {
    file_name: String,
    storage_server: String,
}

/// In-process store; one mutex serializes every read-modify-write.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<(ArtifactKind, i64), MemoryRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert<S: AsRef<str>>(
        &self,
        kind: ArtifactKind,
        id: i64,
        file_name: &str,
        servers: &[S],
    ) {
        self.records.lock().await.insert(
            (kind, id),
            MemoryRecord {
                file_name: file_name.to_string(),
                storage_server: locations::encode(servers),
            },
        );
    }
}

#[async_trait]
impl ArtifactRecordStore for MemoryRecordStore {
    async fn file_name(&self, kind: ArtifactKind, id: i64) -> StorageResult<String> {
        self.records
            .lock()
            .await
            .get(&(kind, id))
            .map(|r| r.file_name.clone())
            .ok_or(StorageError::RecordNotFound { kind, id })
    }

    async fn locations(&self, kind: ArtifactKind, id: i64) -> StorageResult<Vec<String>> {
        self.records
            .lock()
            .await
            .get(&(kind, id))
            .map(|r| locations::decode(&r.storage_server))
            .ok_or(StorageError::RecordNotFound { kind, id })
    }

    async fn update_locations(
        &self,
        kind: ArtifactKind,
        id: i64,
        action: StorageAction,
        servers: &[String],
    ) -> StorageResult<Vec<String>> {
        let mut records = self.records.lock().await;
        let record = records
            .get_mut(&(kind, id))
            .ok_or(StorageError::RecordNotFound { kind, id })?;
        let current = locations::decode(&record.storage_server);
        let updated = locations::apply_action(&current, action, servers);
        record.storage_server = locations::encode(&updated);
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn missing_record_is_reported() {
        let store = MemoryRecordStore::new();
        assert!(matches!(
            store.file_name(ArtifactKind::Model, 1).await,
            Err(StorageError::RecordNotFound { id: 1, .. })
        ));
    }

    #[tokio::test]
    async fn kinds_are_separate_namespaces() {
        let store = MemoryRecordStore::new();
        store.insert(ArtifactKind::Model, 1, "demo.pt", &["backend"]).await;
        store.insert(ArtifactKind::Dataset, 1, "demo.zip", &["cloud"]).await;

        assert_eq!(store.file_name(ArtifactKind::Model, 1).await.unwrap(), "demo.pt");
        assert_eq!(store.locations(ArtifactKind::Dataset, 1).await.unwrap(), vec!["cloud"]);
    }

    #[tokio::test]
    async fn concurrent_adds_all_land() {
        let store = Arc::new(MemoryRecordStore::new());
        store.insert::<&str>(ArtifactKind::Model, 7, "demo.pt", &[]).await;

        let mut handles = Vec::new();
        for i in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .update_locations(ArtifactKind::Model, 7, StorageAction::Add, &[format!("gpu-{:02}", i)])
                    .await
            }));
        }
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(store.locations(ArtifactKind::Model, 7).await.unwrap().len(), 8);
    }
}
