//! Durable sequential command sagas.
//!
//! A command saga sends an ordered list of commands one at a time, waiting
//! for each to be acknowledged before sending the next. If a step is aborted
//! or not acknowledged within the step timeout, the saga switches to its
//! compensation list and runs that in order instead. A saga that times out
//! while compensating raises an abortion failure for the supervisor.
//!
//! - [`CommandSaga`] builds and launches a saga.
//! - [`SagaOrchestrator`] handles start, continue, abort and timeout messages.
//! - [`SagaRuntime`] hosts the orchestrator behind a bounded inbox.

pub mod config;
pub mod envelope;
pub mod error;
pub mod launcher;
pub mod locks;
pub mod messages;
pub mod orchestrator;
pub mod runtime;
pub mod state;
pub mod timeout;
pub mod transport;

pub use common::{Payload, SagaId, Version};
pub use config::{DEFAULT_STEP_TIMEOUT, SagaConfig};
pub use envelope::Envelope;
pub use error::{Result, SagaError};
pub use launcher::CommandSaga;
pub use messages::{
    AbortCommandSaga, ContinueCommandSaga, SagaMessage, SagaTimeout, StartCommandSaga,
};
pub use orchestrator::{HandleOutcome, IgnoreReason, SagaOrchestrator};
pub use runtime::{SagaFault, SagaInbox, SagaRuntime, SagaRuntimeHandle, inbox};
pub use state::{SagaPhase, SagaState, Step};
pub use timeout::TokioTimeoutScheduler;
pub use transport::{
    CommandSender, InMemoryCommandSender, InMemoryTimeoutScheduler, LocalBus, ScheduledTimeout,
    TimeoutScheduler,
};
