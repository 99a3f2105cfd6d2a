use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{SagaId, Version};

/// A persisted saga record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SagaRecord {
    /// Correlation key of the saga.
    pub saga_id: SagaId,

    /// Version of the record; bumped on every write.
    pub version: Version,

    /// The serialized saga state.
    pub state: serde_json::Value,

    /// When the saga was created.
    pub created_at: DateTime<Utc>,

    /// When the record was last written.
    pub updated_at: DateTime<Utc>,
}

impl SagaRecord {
    /// Creates a record for a freshly started saga.
    pub fn new(saga_id: SagaId, state: serde_json::Value) -> Self {
        let now = Utc::now();
        Self {
            saga_id,
            version: Version::first(),
            state,
            created_at: now,
            updated_at: now,
        }
    }

    /// Deserializes the stored state into `T`.
    pub fn state_as<T: serde::de::DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.state.clone())
    }
}
