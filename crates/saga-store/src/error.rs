use thiserror::Error;

use crate::{SagaId, Version};

/// Errors that can occur when interacting with the saga store.
#[derive(Debug, Error)]
pub enum SagaStoreError {
    /// The stored version did not match the version the writer expected.
    #[error(
        "Concurrency conflict for saga {saga_id}: expected version {expected}, found {actual}"
    )]
    ConcurrencyConflict {
        saga_id: SagaId,
        expected: Version,
        actual: Version,
    },

    /// A record already exists for this saga.
    #[error("Saga already exists: {0}")]
    AlreadyExists(SagaId),

    /// No record exists for this saga.
    #[error("Saga not found: {0}")]
    NotFound(SagaId),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for saga store operations.
pub type Result<T> = std::result::Result<T, SagaStoreError>;
