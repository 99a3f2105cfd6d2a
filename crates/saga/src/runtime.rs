//! Hosting runtime: pulls saga messages from an inbox and runs them.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::{Payload, SagaId};
use saga_store::SagaStore;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

use crate::config::SagaConfig;
use crate::error::{Result, SagaError};
use crate::messages::SagaMessage;
use crate::orchestrator::SagaOrchestrator;
use crate::transport::{CommandSender, TimeoutScheduler};

/// A saga that could not finish compensating, reported to the supervisor.
#[derive(Debug, Clone)]
pub struct SagaFault {
    pub saga_id: SagaId,
    pub originating: Option<Payload>,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
}

/// Cloneable ingress into a running [`SagaRuntime`].
#[derive(Debug, Clone)]
pub struct SagaRuntimeHandle {
    inbox: mpsc::Sender<SagaMessage>,
}

impl SagaRuntimeHandle {
    /// Queues a message for handling. Waits if the inbox is full.
    pub async fn deliver(&self, message: SagaMessage) -> Result<()> {
        self.inbox
            .send(message)
            .await
            .map_err(|_| SagaError::RuntimeStopped)
    }

    /// Returns true once the runtime has stopped.
    pub fn is_closed(&self) -> bool {
        self.inbox.is_closed()
    }
}

/// Receiving half of the runtime inbox.
#[derive(Debug)]
pub struct SagaInbox {
    receiver: mpsc::Receiver<SagaMessage>,
}

impl SagaInbox {
    /// Receives the next message, or `None` once every handle is dropped.
    pub async fn recv(&mut self) -> Option<SagaMessage> {
        self.receiver.recv().await
    }
}

/// Creates a runtime inbox and its ingress handle.
pub fn inbox(capacity: usize) -> (SagaRuntimeHandle, SagaInbox) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        SagaRuntimeHandle { inbox: sender },
        SagaInbox { receiver },
    )
}

/// Runs every inbox message on its own task.
///
/// At most `max_parallelism` messages are in flight. Messages for the same
/// saga are serialized by the orchestrator. Transient failures are retried
/// `max_redeliveries` times; a compensation failure is never retried and is
/// published on the fault channel instead.
pub struct SagaRuntime<S, C, T>
where
    S: SagaStore + 'static,
    C: CommandSender + 'static,
    T: TimeoutScheduler + 'static,
{
    inbox: SagaInbox,
    worker: Arc<Worker<S, C, T>>,
    permits: Arc<Semaphore>,
}

struct Worker<S, C, T>
where
    S: SagaStore,
    C: CommandSender,
    T: TimeoutScheduler,
{
    orchestrator: Arc<SagaOrchestrator<S, C, T>>,
    faults: mpsc::UnboundedSender<SagaFault>,
    max_redeliveries: u32,
    redelivery_delay: Duration,
}

impl<S, C, T> SagaRuntime<S, C, T>
where
    S: SagaStore + 'static,
    C: CommandSender + 'static,
    T: TimeoutScheduler + 'static,
{
    /// Creates a runtime and the receiver for its fault reports.
    pub fn new(
        orchestrator: Arc<SagaOrchestrator<S, C, T>>,
        inbox: SagaInbox,
        config: &SagaConfig,
    ) -> (Self, mpsc::UnboundedReceiver<SagaFault>) {
        let (faults, fault_rx) = mpsc::unbounded_channel();
        let runtime = Self {
            inbox,
            worker: Arc::new(Worker {
                orchestrator,
                faults,
                max_redeliveries: config.max_redeliveries,
                redelivery_delay: config.redelivery_delay,
            }),
            permits: Arc::new(Semaphore::new(config.max_parallelism.max(1))),
        };
        (runtime, fault_rx)
    }

    /// Runs until every ingress handle is dropped.
    pub async fn run(self) {
        self.run_until(std::future::pending()).await;
    }

    /// Runs until `shutdown` resolves or every ingress handle is dropped.
    ///
    /// On shutdown the inbox stops accepting messages, and messages already
    /// queued are still handled before this returns.
    #[tracing::instrument(skip_all)]
    pub async fn run_until<F>(mut self, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut tasks = JoinSet::new();
        tracing::info!("saga runtime started");

        loop {
            tokio::select! {
                () = &mut shutdown => {
                    tracing::info!("saga runtime shutting down");
                    break;
                }
                message = self.inbox.receiver.recv() => {
                    let Some(message) = message else { break };
                    self.spawn(&mut tasks, message).await;
                }
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    log_join(joined);
                }
            }
        }

        self.inbox.receiver.close();
        let mut drained = 0usize;
        while let Some(message) = self.inbox.receiver.recv().await {
            self.spawn(&mut tasks, message).await;
            drained += 1;
        }
        if drained > 0 {
            tracing::info!(drained, "handling messages queued before shutdown");
        }

        while let Some(joined) = tasks.join_next().await {
            log_join(joined);
        }
        tracing::info!("saga runtime stopped");
    }

    async fn spawn(&self, tasks: &mut JoinSet<()>, message: SagaMessage) {
        let Ok(permit) = self.permits.clone().acquire_owned().await else {
            tracing::error!(saga_id = %message.saga_id(), "saga runtime semaphore closed");
            return;
        };
        let worker = self.worker.clone();
        tasks.spawn(async move {
            let _permit = permit;
            worker.process(message).await;
        });
    }
}

fn log_join(joined: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = joined {
        tracing::error!(error = %e, "saga handler task failed");
    }
}

impl<S, C, T> Worker<S, C, T>
where
    S: SagaStore,
    C: CommandSender,
    T: TimeoutScheduler,
{
    async fn process(&self, message: SagaMessage) {
        let saga_id = message.saga_id().clone();
        let mut attempt: u32 = 0;

        loop {
            match self.orchestrator.handle(message.clone()).await {
                Ok(outcome) => {
                    tracing::debug!(%saga_id, ?outcome, "saga message handled");
                    return;
                }
                Err(SagaError::AbortionFailure {
                    saga_id,
                    originating,
                }) => {
                    self.report_fault(saga_id, originating);
                    return;
                }
                Err(e) if e.is_transient() && attempt < self.max_redeliveries => {
                    attempt += 1;
                    tracing::warn!(
                        %saga_id,
                        error = %e,
                        attempt,
                        "saga message failed; redelivering"
                    );
                    metrics::counter!("saga_redeliveries_total").increment(1);
                    tokio::time::sleep(self.redelivery_delay).await;
                }
                Err(e) => {
                    tracing::error!(
                        %saga_id,
                        error = %e,
                        attempts = attempt + 1,
                        message_type = message.message_type(),
                        "saga message dropped"
                    );
                    metrics::counter!("saga_messages_failed_total").increment(1);
                    return;
                }
            }
        }
    }

    fn report_fault(&self, saga_id: SagaId, originating: Option<Payload>) {
        let fault = SagaFault {
            reason: format!("saga {saga_id} timed out while compensating"),
            saga_id,
            originating,
            occurred_at: Utc::now(),
        };
        if let Err(unsent) = self.faults.send(fault) {
            tracing::error!(
                saga_id = %unsent.0.saga_id,
                "no supervisor listening for saga faults"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::StartCommandSaga;
    use crate::transport::{InMemoryCommandSender, InMemoryTimeoutScheduler};
    use saga_store::InMemorySagaStore;

    #[tokio::test]
    async fn test_handle_reports_closed_inbox() {
        let (handle, inbox) = inbox(4);
        assert!(!handle.is_closed());

        drop(inbox);
        assert!(handle.is_closed());
        let result = handle.deliver(SagaMessage::continue_saga("s")).await;
        assert!(matches!(result, Err(SagaError::RuntimeStopped)));
    }

    #[tokio::test]
    async fn test_zero_capacity_is_clamped() {
        let (handle, mut inbox) = inbox(0);
        handle
            .deliver(SagaMessage::continue_saga("s"))
            .await
            .unwrap();
        let received = inbox.recv().await.unwrap();
        assert_eq!(received.saga_id(), &SagaId::from("s"));
    }

    #[tokio::test]
    async fn test_queued_messages_handled_on_shutdown() {
        let config = SagaConfig::default().with_command_destination("orders");
        let store = InMemorySagaStore::new();
        let sender = InMemoryCommandSender::new();
        let orchestrator = Arc::new(
            SagaOrchestrator::new(
                store.clone(),
                sender.clone(),
                InMemoryTimeoutScheduler::new(),
                &config,
            )
            .unwrap(),
        );

        let (handle, inbox) = inbox(8);
        for id in ["a", "b", "c"] {
            let start = SagaMessage::Start(StartCommandSaga {
                saga_id: SagaId::from(id),
                originating: None,
                commands: vec![Payload::new("A", serde_json::json!({}))],
                abort_commands: vec![],
            });
            handle.deliver(start).await.unwrap();
        }

        let (runtime, _faults) = SagaRuntime::new(orchestrator, inbox, &config);
        runtime.run_until(std::future::ready(())).await;

        assert_eq!(store.len().await, 3);
        assert_eq!(sender.sent_count(), 3);
        assert!(handle.is_closed());
    }
}
