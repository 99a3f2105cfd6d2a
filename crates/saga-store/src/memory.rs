use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::{Result, SagaId, SagaRecord, SagaStoreError, Version, store::SagaStore};

/// In-memory saga store for testing and single-process hosting.
///
/// Provides the same concurrency semantics as the PostgreSQL implementation.
#[derive(Clone, Default)]
pub struct InMemorySagaStore {
    records: Arc<RwLock<HashMap<SagaId, SagaRecord>>>,
}

impl InMemorySagaStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of active sagas.
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    /// Returns true if no saga is active.
    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Removes every record.
    pub async fn clear(&self) {
        self.records.write().await.clear();
    }
}

fn check_version(record: &SagaRecord, expected: Version) -> Result<()> {
    if record.version != expected {
        return Err(SagaStoreError::ConcurrencyConflict {
            saga_id: record.saga_id.clone(),
            expected,
            actual: record.version,
        });
    }
    Ok(())
}

#[async_trait]
impl SagaStore for InMemorySagaStore {
    async fn insert(&self, saga_id: &SagaId, state: serde_json::Value) -> Result<Version> {
        let mut records = self.records.write().await;
        if records.contains_key(saga_id) {
            return Err(SagaStoreError::AlreadyExists(saga_id.clone()));
        }

        let record = SagaRecord::new(saga_id.clone(), state);
        let version = record.version;
        records.insert(saga_id.clone(), record);
        metrics::counter!("saga_store_writes_total", "op" => "insert").increment(1);
        Ok(version)
    }

    async fn load(&self, saga_id: &SagaId) -> Result<Option<SagaRecord>> {
        Ok(self.records.read().await.get(saga_id).cloned())
    }

    async fn update(
        &self,
        saga_id: &SagaId,
        state: serde_json::Value,
        expected: Version,
    ) -> Result<Version> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(saga_id)
            .ok_or_else(|| SagaStoreError::NotFound(saga_id.clone()))?;
        check_version(record, expected)?;

        record.state = state;
        record.version = record.version.next();
        record.updated_at = Utc::now();
        metrics::counter!("saga_store_writes_total", "op" => "update").increment(1);
        Ok(record.version)
    }

    async fn complete(&self, saga_id: &SagaId, expected: Version) -> Result<()> {
        let mut records = self.records.write().await;
        let record = records
            .get(saga_id)
            .ok_or_else(|| SagaStoreError::NotFound(saga_id.clone()))?;
        check_version(record, expected)?;

        records.remove(saga_id);
        metrics::counter!("saga_store_writes_total", "op" => "complete").increment(1);
        Ok(())
    }

    async fn list_active(&self) -> Result<Vec<SagaRecord>> {
        let records = self.records.read().await;
        let mut active: Vec<_> = records.values().cloned().collect();
        active.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.saga_id.cmp(&b.saga_id))
        });
        Ok(active)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SagaStoreExt;
    use serde_json::json;

    #[tokio::test]
    async fn insert_and_load() {
        let store = InMemorySagaStore::new();
        let id = SagaId::from("saga-1");

        let version = store.insert(&id, json!({"index": 0})).await.unwrap();
        assert_eq!(version, Version::first());

        let record = store.load(&id).await.unwrap().unwrap();
        assert_eq!(record.saga_id, id);
        assert_eq!(record.version, Version::first());
        assert_eq!(record.state["index"], 0);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn insert_twice_fails() {
        let store = InMemorySagaStore::new();
        let id = SagaId::from("saga-1");

        store.insert(&id, json!({})).await.unwrap();
        let result = store.insert(&id, json!({})).await;

        assert!(matches!(result, Err(SagaStoreError::AlreadyExists(ref existing)) if existing == &id));
    }

    #[tokio::test]
    async fn update_bumps_version() {
        let store = InMemorySagaStore::new();
        let id = SagaId::from("saga-1");
        let v1 = store.insert(&id, json!({"index": 0})).await.unwrap();

        let v2 = store.update(&id, json!({"index": 1}), v1).await.unwrap();
        assert_eq!(v2, Version::new(2));

        let record = store.load(&id).await.unwrap().unwrap();
        assert_eq!(record.version, v2);
        assert_eq!(record.state["index"], 1);
        assert!(record.updated_at >= record.created_at);
    }

    #[tokio::test]
    async fn stale_update_conflicts() {
        let store = InMemorySagaStore::new();
        let id = SagaId::from("saga-1");
        let v1 = store.insert(&id, json!({"index": 0})).await.unwrap();
        store.update(&id, json!({"index": 1}), v1).await.unwrap();

        let result = store.update(&id, json!({"index": 9}), v1).await;
        match result {
            Err(SagaStoreError::ConcurrencyConflict {
                expected, actual, ..
            }) => {
                assert_eq!(expected, Version::first());
                assert_eq!(actual, Version::new(2));
            }
            other => panic!("expected conflict, got {other:?}"),
        }

        // The losing write left no trace
        let record = store.load(&id).await.unwrap().unwrap();
        assert_eq!(record.state["index"], 1);
    }

    #[tokio::test]
    async fn update_missing_is_not_found() {
        let store = InMemorySagaStore::new();
        let result = store
            .update(&SagaId::from("ghost"), json!({}), Version::first())
            .await;
        assert!(matches!(result, Err(SagaStoreError::NotFound(_))));
    }

    #[tokio::test]
    async fn complete_removes_record() {
        let store = InMemorySagaStore::new();
        let id = SagaId::from("saga-1");
        let v1 = store.insert(&id, json!({})).await.unwrap();

        store.complete(&id, v1).await.unwrap();

        assert!(store.load(&id).await.unwrap().is_none());
        assert!(!store.exists(&id).await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn complete_with_stale_version_keeps_record() {
        let store = InMemorySagaStore::new();
        let id = SagaId::from("saga-1");
        let v1 = store.insert(&id, json!({})).await.unwrap();
        store.update(&id, json!({}), v1).await.unwrap();

        let result = store.complete(&id, v1).await;
        assert!(matches!(
            result,
            Err(SagaStoreError::ConcurrencyConflict { .. })
        ));
        assert!(store.exists(&id).await.unwrap());
    }

    #[tokio::test]
    async fn list_active_oldest_first() {
        let store = InMemorySagaStore::new();
        for name in ["a", "b", "c"] {
            store.insert(&SagaId::from(name), json!({})).await.unwrap();
        }
        store
            .complete(&SagaId::from("b"), Version::first())
            .await
            .unwrap();

        let active = store.list_active().await.unwrap();
        let ids: Vec<_> = active.iter().map(|r| r.saga_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "c"]);
    }

    #[tokio::test]
    async fn load_state_deserializes() {
        #[derive(serde::Deserialize)]
        struct Progress {
            index: usize,
        }

        let store = InMemorySagaStore::new();
        let id = SagaId::from("saga-1");
        store.insert(&id, json!({"index": 4})).await.unwrap();

        let (progress, version) = store.load_state::<Progress>(&id).await.unwrap().unwrap();
        assert_eq!(progress.index, 4);
        assert_eq!(version, Version::first());

        let missing = store
            .load_state::<Progress>(&SagaId::from("nope"))
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn clones_share_records() {
        let store = InMemorySagaStore::new();
        let clone = store.clone();
        store.insert(&SagaId::from("x"), json!({})).await.unwrap();
        assert_eq!(clone.len().await, 1);

        clone.clear().await;
        assert!(store.is_empty().await);
    }

    #[test]
    fn writes_are_counted() {
        let recorder = metrics_exporter_prometheus::PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();

        metrics::with_local_recorder(&recorder, || {
            rt.block_on(async {
                let store = InMemorySagaStore::new();
                let id = SagaId::from("saga-1");
                let v1 = store.insert(&id, json!({})).await.unwrap();
                let v2 = store.update(&id, json!({"index": 1}), v1).await.unwrap();
                store.complete(&id, v2).await.unwrap();
            });
        });

        let rendered = handle.render();
        for op in ["insert", "update", "complete"] {
            assert!(
                rendered.contains(&format!("saga_store_writes_total{{op=\"{op}\"}} 1")),
                "missing {op} in:\n{rendered}"
            );
        }
    }
}
