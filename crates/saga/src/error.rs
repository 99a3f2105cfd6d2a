//! Saga error types.

use common::{Payload, SagaId};
use saga_store::SagaStoreError;
use thiserror::Error;

/// Errors that can occur during saga operations.
#[derive(Debug, Error)]
pub enum SagaError {
    /// The saga machinery is misconfigured (e.g. no command destination).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Handing a message to the messaging collaborator failed.
    #[error("Failed to send to '{destination}': {reason}")]
    Send { destination: String, reason: String },

    /// Requesting a delayed wake-up failed.
    #[error("Failed to schedule timeout for saga {saga_id}: {reason}")]
    Schedule { saga_id: SagaId, reason: String },

    /// Saga store error.
    #[error("Saga store error: {0}")]
    Store(#[from] SagaStoreError),

    /// Stored saga state violates an invariant.
    #[error("Invalid state for saga {saga_id}: {reason}")]
    InvalidState { saga_id: SagaId, reason: String },

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A compensating command timed out. There is no further fallback, so the
    /// saga is left as-is for an operator to resolve.
    #[error("Saga {saga_id} timed out while compensating; manual intervention required")]
    AbortionFailure {
        saga_id: SagaId,
        originating: Option<Payload>,
    },

    /// The hosting runtime is no longer accepting messages.
    #[error("Saga runtime stopped")]
    RuntimeStopped,
}

impl SagaError {
    /// Returns true for the single unrecoverable condition: compensation stalled.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SagaError::AbortionFailure { .. })
    }

    /// Returns true if redelivering the triggering message may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            SagaError::Send { .. } | SagaError::Schedule { .. } => true,
            SagaError::Store(err) => matches!(
                err,
                SagaStoreError::ConcurrencyConflict { .. } | SagaStoreError::Database(_)
            ),
            _ => false,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
