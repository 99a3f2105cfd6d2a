//! Timer-backed timeout scheduling.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::SagaError;
use crate::messages::{SagaMessage, SagaTimeout};
use crate::runtime::SagaRuntimeHandle;
use crate::transport::TimeoutScheduler;

/// Delivers each timeout back into the runtime after a `tokio::time::sleep`.
///
/// Timers live in this process only. After a restart call
/// [`SagaOrchestrator::recover`](crate::SagaOrchestrator::recover) to re-arm them.
#[derive(Debug, Clone)]
pub struct TokioTimeoutScheduler {
    runtime: SagaRuntimeHandle,
}

impl TokioTimeoutScheduler {
    /// Creates a scheduler delivering into `runtime`.
    pub fn new(runtime: SagaRuntimeHandle) -> Self {
        Self { runtime }
    }
}

#[async_trait]
impl TimeoutScheduler for TokioTimeoutScheduler {
    async fn schedule(&self, delay: Duration, timeout: SagaTimeout) -> Result<(), SagaError> {
        if self.runtime.is_closed() {
            return Err(SagaError::Schedule {
                saga_id: timeout.saga_id,
                reason: "saga runtime stopped".to_string(),
            });
        }

        let runtime = self.runtime.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let saga_id = timeout.saga_id.clone();
            if runtime.deliver(SagaMessage::Timeout(timeout)).await.is_err() {
                tracing::warn!(%saga_id, "saga runtime stopped before timeout fired");
            }
        });
        Ok(())
    }
}
