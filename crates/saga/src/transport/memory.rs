//! In-memory collaborators for testing.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::SagaId;

use super::{CommandSender, TimeoutScheduler};
use crate::envelope::Envelope;
use crate::error::SagaError;
use crate::messages::SagaTimeout;

#[derive(Debug, Default)]
struct InMemorySenderState {
    sent: Vec<Envelope>,
    fail_on_send: bool,
    failures_remaining: u32,
}

/// Records every envelope instead of delivering it.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCommandSender {
    state: Arc<RwLock<InMemorySenderState>>,
}

impl InMemoryCommandSender {
    /// Creates a new in-memory sender.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every send fail until reset.
    pub fn set_fail_on_send(&self, fail: bool) {
        self.state.write().unwrap().fail_on_send = fail;
    }

    /// Makes the next `count` sends fail.
    pub fn fail_next(&self, count: u32) {
        self.state.write().unwrap().failures_remaining = count;
    }

    /// Returns every envelope sent so far, in order.
    pub fn sent(&self) -> Vec<Envelope> {
        self.state.read().unwrap().sent.clone()
    }

    /// Returns the message types of every envelope sent for a saga, in order.
    pub fn sent_types_for(&self, saga_id: &SagaId) -> Vec<String> {
        self.state
            .read()
            .unwrap()
            .sent
            .iter()
            .filter(|e| e.saga_id().as_ref() == Some(saga_id))
            .map(|e| e.payload.message_type.clone())
            .collect()
    }

    /// Returns the number of envelopes sent.
    pub fn sent_count(&self) -> usize {
        self.state.read().unwrap().sent.len()
    }
}

#[async_trait]
impl CommandSender for InMemoryCommandSender {
    async fn send(&self, envelope: Envelope) -> Result<(), SagaError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_send || state.failures_remaining > 0 {
            state.failures_remaining = state.failures_remaining.saturating_sub(1);
            return Err(SagaError::Send {
                destination: envelope.destination,
                reason: "transport unavailable".to_string(),
            });
        }

        state.sent.push(envelope);
        Ok(())
    }
}

/// A timeout request recorded by [`InMemoryTimeoutScheduler`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledTimeout {
    pub delay: Duration,
    pub timeout: SagaTimeout,
}

#[derive(Debug, Default)]
struct InMemorySchedulerState {
    pending: Vec<ScheduledTimeout>,
    total: usize,
    fail_on_schedule: bool,
}

/// Records timeout requests; tests fire them by hand.
#[derive(Debug, Clone, Default)]
pub struct InMemoryTimeoutScheduler {
    state: Arc<RwLock<InMemorySchedulerState>>,
}

impl InMemoryTimeoutScheduler {
    /// Creates a new in-memory scheduler.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every schedule request fail until reset.
    pub fn set_fail_on_schedule(&self, fail: bool) {
        self.state.write().unwrap().fail_on_schedule = fail;
    }

    /// Returns the requests not yet taken.
    pub fn pending(&self) -> Vec<ScheduledTimeout> {
        self.state.read().unwrap().pending.clone()
    }

    /// Removes and returns the requests not yet taken.
    pub fn take_pending(&self) -> Vec<ScheduledTimeout> {
        std::mem::take(&mut self.state.write().unwrap().pending)
    }

    /// Returns the number of requests ever accepted.
    pub fn scheduled_count(&self) -> usize {
        self.state.read().unwrap().total
    }
}

#[async_trait]
impl TimeoutScheduler for InMemoryTimeoutScheduler {
    async fn schedule(&self, delay: Duration, timeout: SagaTimeout) -> Result<(), SagaError> {
        let mut state = self.state.write().unwrap();

        if state.fail_on_schedule {
            return Err(SagaError::Schedule {
                saga_id: timeout.saga_id,
                reason: "timeout storage unavailable".to_string(),
            });
        }

        state.total += 1;
        state.pending.push(ScheduledTimeout { delay, timeout });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::Payload;

    fn envelope(saga: &str, name: &str) -> Envelope {
        Envelope::saga_step(
            "orders",
            &SagaId::from(saga),
            Payload::new(name, serde_json::json!({})),
        )
    }

    #[tokio::test]
    async fn test_records_sends_in_order() {
        let sender = InMemoryCommandSender::new();
        sender.send(envelope("s1", "A")).await.unwrap();
        sender.send(envelope("s2", "Z")).await.unwrap();
        sender.send(envelope("s1", "B")).await.unwrap();

        assert_eq!(sender.sent_count(), 3);
        assert_eq!(sender.sent_types_for(&SagaId::from("s1")), vec!["A", "B"]);
    }

    #[tokio::test]
    async fn test_fail_next_then_recover() {
        let sender = InMemoryCommandSender::new();
        sender.fail_next(2);

        assert!(sender.send(envelope("s", "A")).await.is_err());
        assert!(sender.send(envelope("s", "A")).await.is_err());
        assert!(sender.send(envelope("s", "A")).await.is_ok());
        assert_eq!(sender.sent_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_on_send() {
        let sender = InMemoryCommandSender::new();
        sender.set_fail_on_send(true);

        let result = sender.send(envelope("s", "A")).await;
        assert!(matches!(result, Err(SagaError::Send { ref destination, .. }) if destination == "orders"));
        assert_eq!(sender.sent_count(), 0);
    }

    #[tokio::test]
    async fn test_scheduler_records_and_drains() {
        let scheduler = InMemoryTimeoutScheduler::new();
        let timeout = SagaTimeout {
            saga_id: SagaId::from("s"),
        };
        scheduler
            .schedule(Duration::from_secs(10), timeout.clone())
            .await
            .unwrap();

        assert_eq!(scheduler.pending().len(), 1);
        let taken = scheduler.take_pending();
        assert_eq!(taken[0].delay, Duration::from_secs(10));
        assert_eq!(taken[0].timeout, timeout);
        assert!(scheduler.pending().is_empty());
        assert_eq!(scheduler.scheduled_count(), 1);
    }

    #[tokio::test]
    async fn test_scheduler_failure() {
        let scheduler = InMemoryTimeoutScheduler::new();
        scheduler.set_fail_on_schedule(true);
        let result = scheduler
            .schedule(
                Duration::from_secs(1),
                SagaTimeout {
                    saga_id: SagaId::from("s"),
                },
            )
            .await;
        assert!(matches!(result, Err(SagaError::Schedule { .. })));
        assert_eq!(scheduler.scheduled_count(), 0);
    }
}
