//! Saga orchestrator: applies correlation messages to persisted saga state.

use std::time::{Duration, Instant};

use common::{SagaId, Version};
use saga_store::{SagaStore, SagaStoreExt};

use crate::config::SagaConfig;
use crate::envelope::Envelope;
use crate::error::{Result, SagaError};
use crate::locks::KeyedLocks;
use crate::messages::{SagaMessage, SagaTimeout, StartCommandSaga};
use crate::state::{SagaPhase, SagaState, Step};
use crate::transport::{CommandSender, TimeoutScheduler};

/// What handling a message did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleOutcome {
    /// A command was sent and a timeout armed.
    Dispatched { phase: SagaPhase, index: usize },

    /// The active list is exhausted and the saga was removed.
    Completed { phase: SagaPhase },

    /// The message did not apply to any live saga.
    Ignored(IgnoreReason),
}

/// Why a message was ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// A start message for a saga that already exists.
    DuplicateStart,

    /// No live saga has this id (never started, or already completed).
    UnknownSaga,

    /// A timeout for a saga whose compensation failure was already raised.
    AlreadyFaulted,
}

/// Drives command sagas, one persisted state machine per saga id.
///
/// Each handler loads the saga, computes the next state, sends the command,
/// arms the timeout, and only then persists. A failed send or schedule
/// therefore leaves the stored state untouched and redelivery of the same
/// message repeats the same step.
pub struct SagaOrchestrator<S, C, T>
where
    S: SagaStore,
    C: CommandSender,
    T: TimeoutScheduler,
{
    store: S,
    sender: C,
    scheduler: T,
    destination: String,
    step_timeout: Duration,
    locks: KeyedLocks,
}

impl<S, C, T> SagaOrchestrator<S, C, T>
where
    S: SagaStore,
    C: CommandSender,
    T: TimeoutScheduler,
{
    /// Creates a new orchestrator. Fails if no command destination is configured.
    pub fn new(store: S, sender: C, scheduler: T, config: &SagaConfig) -> Result<Self> {
        let destination = config.command_destination()?.to_string();
        Ok(Self {
            store,
            sender,
            scheduler,
            destination,
            step_timeout: config.step_timeout,
            locks: KeyedLocks::new(),
        })
    }

    /// Returns the destination every saga command is sent to.
    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Returns the underlying store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Handles one correlation message.
    ///
    /// Messages for the same saga are serialized; different sagas proceed in
    /// parallel. Returns `SagaError::AbortionFailure` when a compensating
    /// command times out.
    #[tracing::instrument(
        skip(self, message),
        fields(saga_id = %message.saga_id(), message_type = message.message_type())
    )]
    pub async fn handle(&self, message: SagaMessage) -> Result<HandleOutcome> {
        let started = Instant::now();
        let _guard = self.locks.lock(message.saga_id()).await;

        let result = match message {
            SagaMessage::Start(start) => self.start(start).await,
            SagaMessage::Continue(m) => self.advance(&m.saga_id, SagaState::on_continue).await,
            SagaMessage::Abort(m) => self.advance(&m.saga_id, SagaState::on_abort).await,
            SagaMessage::Timeout(m) => self.advance(&m.saga_id, SagaState::on_timeout).await,
        };

        metrics::histogram!("saga_handle_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        result
    }

    /// Loads a live saga's state. Completed sagas return `None`.
    pub async fn get_saga(&self, saga_id: &SagaId) -> Result<Option<SagaState>> {
        Ok(self
            .store
            .load_state::<SagaState>(saga_id)
            .await?
            .map(|(state, _)| state))
    }

    /// Returns every live saga, oldest first.
    pub async fn active_sagas(&self) -> Result<Vec<SagaState>> {
        self.store
            .list_active()
            .await?
            .iter()
            .map(|record| record.state_as::<SagaState>().map_err(SagaError::from))
            .collect()
    }

    /// Re-arms a timeout for every live saga. Call once after a restart.
    ///
    /// Faulted sagas are skipped. Returns the number of sagas re-armed.
    #[tracing::instrument(skip(self))]
    pub async fn recover(&self) -> Result<usize> {
        let pending: Vec<SagaId> = self
            .active_sagas()
            .await?
            .into_iter()
            .filter(|state| !state.faulted)
            .map(|state| state.saga_id)
            .collect();

        let rearm = pending.iter().map(|saga_id| {
            self.scheduler.schedule(
                self.step_timeout,
                SagaTimeout {
                    saga_id: saga_id.clone(),
                },
            )
        });
        futures_util::future::try_join_all(rearm).await?;

        tracing::info!(count = pending.len(), "re-armed timeouts for active sagas");
        Ok(pending.len())
    }

    async fn start(&self, start: StartCommandSaga) -> Result<HandleOutcome> {
        let saga_id = start.saga_id.clone();
        if self.store.exists(&saga_id).await? {
            tracing::warn!("duplicate start for live saga ignored");
            metrics::counter!("saga_messages_ignored_total", "reason" => "duplicate_start")
                .increment(1);
            return Ok(HandleOutcome::Ignored(IgnoreReason::DuplicateStart));
        }

        tracing::info!(
            commands = start.commands.len(),
            abort_commands = start.abort_commands.len(),
            "saga started"
        );
        metrics::counter!("saga_started_total").increment(1);

        let step = SagaState::begin(start);
        self.apply(&saga_id, None, step).await
    }

    async fn advance(
        &self,
        saga_id: &SagaId,
        transition: fn(&SagaState) -> Step,
    ) -> Result<HandleOutcome> {
        let Some((state, version)) = self.store.load_state::<SagaState>(saga_id).await? else {
            tracing::warn!("message for unknown or completed saga ignored");
            metrics::counter!("saga_messages_ignored_total", "reason" => "unknown_saga")
                .increment(1);
            return Ok(HandleOutcome::Ignored(IgnoreReason::UnknownSaga));
        };

        let step = transition(&state);
        self.apply(saga_id, Some((&state, version)), step).await
    }

    /// Carries out a transition. `current` is `None` for a saga being started.
    async fn apply(
        &self,
        saga_id: &SagaId,
        current: Option<(&SagaState, Version)>,
        step: Step,
    ) -> Result<HandleOutcome> {
        match step {
            Step::Dispatch(next) => {
                let serialized = serde_json::to_value(&next)?;
                self.dispatch(&next).await?;

                match current {
                    Some((previous, version)) => {
                        self.store.update(saga_id, serialized, version).await?;
                        if !previous.aborting && next.aborting {
                            tracing::info!("saga switched to compensation");
                            metrics::counter!("saga_compensations_total").increment(1);
                        }
                    }
                    None => {
                        self.store.insert(saga_id, serialized).await?;
                    }
                }

                Ok(HandleOutcome::Dispatched {
                    phase: next.phase(),
                    index: next.current_index,
                })
            }
            Step::Complete(next) => {
                if let Some((_, version)) = current {
                    self.store.complete(saga_id, version).await?;
                }

                let phase = next.phase();
                tracing::info!(%phase, "saga completed");
                metrics::counter!("saga_completed_total", "phase" => phase.as_str())
                    .increment(1);
                Ok(HandleOutcome::Completed { phase })
            }
            Step::AbortionFailed(next) => {
                let Some((_, version)) = current else {
                    return Err(SagaError::InvalidState {
                        saga_id: saga_id.clone(),
                        reason: "abortion failure for a saga that was never stored".to_string(),
                    });
                };
                self.store
                    .update(saga_id, serde_json::to_value(&next)?, version)
                    .await?;

                let originating = next.originating;
                tracing::error!(
                    originating = ?originating.as_ref().map(|p| p.message_type.as_str()),
                    "compensating command timed out; saga requires manual intervention"
                );
                metrics::counter!("saga_abortion_failures_total").increment(1);
                Err(SagaError::AbortionFailure {
                    saga_id: saga_id.clone(),
                    originating,
                })
            }
            Step::Stalled => {
                tracing::debug!("timeout for faulted saga ignored");
                metrics::counter!("saga_messages_ignored_total", "reason" => "already_faulted")
                    .increment(1);
                Ok(HandleOutcome::Ignored(IgnoreReason::AlreadyFaulted))
            }
        }
    }

    /// Sends the current command of `state` and arms its timeout.
    async fn dispatch(&self, state: &SagaState) -> Result<()> {
        let command = state
            .current_command()
            .ok_or_else(|| SagaError::InvalidState {
                saga_id: state.saga_id.clone(),
                reason: format!(
                    "no command at index {} of the {} list",
                    state.current_index,
                    state.phase()
                ),
            })?;

        let envelope = Envelope::saga_step(&self.destination, &state.saga_id, command.clone());
        self.sender.send(envelope).await?;
        self.scheduler
            .schedule(
                self.step_timeout,
                SagaTimeout {
                    saga_id: state.saga_id.clone(),
                },
            )
            .await?;

        let phase = state.phase();
        tracing::info!(
            %phase,
            index = state.current_index,
            command = %command.message_type,
            "saga command sent"
        );
        metrics::counter!("saga_commands_sent_total", "phase" => phase.as_str()).increment(1);
        Ok(())
    }
}
