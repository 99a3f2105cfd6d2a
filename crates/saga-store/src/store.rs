use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::{Result, SagaId, SagaRecord, Version};

/// Core trait for saga state storage.
///
/// The store holds one record per saga. All writes except `insert` carry the
/// version the caller last observed, and fail with `ConcurrencyConflict` if
/// another writer got there first. Implementations must be thread-safe.
#[async_trait]
pub trait SagaStore: Send + Sync {
    /// Creates the record for a new saga at `Version::first()`.
    ///
    /// Fails with `AlreadyExists` if the saga already has a record.
    async fn insert(&self, saga_id: &SagaId, state: serde_json::Value) -> Result<Version>;

    /// Loads the record for a saga, if one exists.
    async fn load(&self, saga_id: &SagaId) -> Result<Option<SagaRecord>>;

    /// Replaces the saga's state.
    ///
    /// Returns the new version. Fails with `NotFound` if the record is gone and
    /// `ConcurrencyConflict` if its version is not `expected`.
    async fn update(
        &self,
        saga_id: &SagaId,
        state: serde_json::Value,
        expected: Version,
    ) -> Result<Version>;

    /// Removes the record of a completed saga.
    ///
    /// Same version semantics as `update`.
    async fn complete(&self, saga_id: &SagaId, expected: Version) -> Result<()>;

    /// Returns every active saga, oldest first.
    async fn list_active(&self) -> Result<Vec<SagaRecord>>;
}

/// Extension trait providing convenience methods for saga stores.
#[async_trait]
pub trait SagaStoreExt: SagaStore {
    /// Checks if a saga has a record.
    async fn exists(&self, saga_id: &SagaId) -> Result<bool> {
        Ok(self.load(saga_id).await?.is_some())
    }

    /// Loads and deserializes a saga's state together with its version.
    async fn load_state<T>(&self, saga_id: &SagaId) -> Result<Option<(T, Version)>>
    where
        T: DeserializeOwned + Send,
    {
        match self.load(saga_id).await? {
            Some(record) => {
                let state = record.state_as::<T>()?;
                Ok(Some((state, record.version)))
            }
            None => Ok(None),
        }
    }
}

// Blanket implementation for all SagaStore implementations
impl<T: SagaStore + ?Sized> SagaStoreExt for T {}

#[async_trait]
impl<T: SagaStore + ?Sized> SagaStore for std::sync::Arc<T> {
    async fn insert(&self, saga_id: &SagaId, state: serde_json::Value) -> Result<Version> {
        (**self).insert(saga_id, state).await
    }

    async fn load(&self, saga_id: &SagaId) -> Result<Option<SagaRecord>> {
        (**self).load(saga_id).await
    }

    async fn update(
        &self,
        saga_id: &SagaId,
        state: serde_json::Value,
        expected: Version,
    ) -> Result<Version> {
        (**self).update(saga_id, state, expected).await
    }

    async fn complete(&self, saga_id: &SagaId, expected: Version) -> Result<()> {
        (**self).complete(saga_id, expected).await
    }

    async fn list_active(&self) -> Result<Vec<SagaRecord>> {
        (**self).list_active().await
    }
}
