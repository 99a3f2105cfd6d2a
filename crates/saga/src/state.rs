//! Saga state and the transition table.

use common::{Payload, SagaId};
use serde::{Deserialize, Serialize};

use crate::messages::StartCommandSaga;

/// Which command list a saga is working through.
///
/// Phase transitions:
/// ```text
/// Forward ──► Compensating
/// ```
/// There is no way back; completion is the removal of the saga, not a phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SagaPhase {
    /// Executing the forward command list.
    Forward,

    /// Executing the compensation command list.
    Compensating,
}

impl SagaPhase {
    /// Returns the phase name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaPhase::Forward => "Forward",
            SagaPhase::Compensating => "Compensating",
        }
    }
}

impl std::fmt::Display for SagaPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persisted state of one saga instance.
///
/// `commands` and `abort_commands` are fixed by the start message. `aborting`
/// only ever goes from false to true. `current_index` points at the command
/// last sent in the active list, or equals its length once the list is done.
/// `faulted` is set when a compensating command timed out and the failure
/// has been raised; later timeouts for the saga are absorbed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SagaState {
    pub saga_id: SagaId,
    pub current_index: usize,
    pub aborting: bool,
    #[serde(default)]
    pub faulted: bool,
    pub originating: Option<Payload>,
    pub commands: Vec<Payload>,
    pub abort_commands: Vec<Payload>,
}

/// What a handler must do after a transition.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    /// Send `current_command()` of the new state, arm a timeout, persist.
    Dispatch(SagaState),

    /// The active list is exhausted; the saga is done.
    Complete(SagaState),

    /// A timeout arrived while compensating. Nothing is left to fall back on.
    /// Persist the faulted state, then raise the failure.
    AbortionFailed(SagaState),

    /// A timeout for a saga whose failure was already raised.
    Stalled,
}

impl SagaState {
    /// Builds the initial state from a start message.
    pub fn new(start: StartCommandSaga) -> Self {
        Self {
            saga_id: start.saga_id,
            current_index: 0,
            aborting: false,
            faulted: false,
            originating: start.originating,
            commands: start.commands,
            abort_commands: start.abort_commands,
        }
    }

    /// Starts the saga: dispatch the first forward command.
    pub fn begin(start: StartCommandSaga) -> Step {
        Self::new(start).settle()
    }

    /// Returns the current phase.
    pub fn phase(&self) -> SagaPhase {
        if self.aborting {
            SagaPhase::Compensating
        } else {
            SagaPhase::Forward
        }
    }

    /// Returns the list currently being executed.
    pub fn active_commands(&self) -> &[Payload] {
        if self.aborting {
            &self.abort_commands
        } else {
            &self.commands
        }
    }

    /// Returns the command at `current_index` of the active list.
    pub fn current_command(&self) -> Option<&Payload> {
        self.active_commands().get(self.current_index)
    }

    /// Returns true once `current_index` has reached the end of the active list.
    pub fn is_exhausted(&self) -> bool {
        self.current_index >= self.active_commands().len()
    }

    /// The destination accepted the last command: move to the next one.
    pub fn on_continue(&self) -> Step {
        let mut next = self.clone();
        next.current_index += 1;
        next.settle()
    }

    /// The destination rejected a command: restart from the first
    /// compensating command.
    ///
    /// Also applies while already compensating, which restarts compensation
    /// from index 0.
    pub fn on_abort(&self) -> Step {
        let mut next = self.clone();
        next.current_index = 0;
        next.aborting = true;
        next.settle()
    }

    /// The watchdog for the last command expired.
    pub fn on_timeout(&self) -> Step {
        // A Continue may have completed the saga while this timeout was in flight.
        if self.is_exhausted() {
            return Step::Complete(self.clone());
        }
        if self.faulted {
            return Step::Stalled;
        }
        if self.aborting {
            let mut next = self.clone();
            next.faulted = true;
            return Step::AbortionFailed(next);
        }
        self.on_abort()
    }

    fn settle(self) -> Step {
        if self.is_exhausted() {
            Step::Complete(self)
        } else {
            Step::Dispatch(self)
        }
    }
}
