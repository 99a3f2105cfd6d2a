//! Messaging collaborators: command sending and delayed wake-ups.

pub mod local;
pub mod memory;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::envelope::Envelope;
use crate::error::SagaError;
use crate::messages::SagaTimeout;

pub use local::LocalBus;
pub use memory::{InMemoryCommandSender, InMemoryTimeoutScheduler, ScheduledTimeout};

/// Sends an envelope to its destination.
#[async_trait]
pub trait CommandSender: Send + Sync {
    async fn send(&self, envelope: Envelope) -> Result<(), SagaError>;
}

/// Requests a one-shot `SagaTimeout` delivery back to the saga after `delay`.
#[async_trait]
pub trait TimeoutScheduler: Send + Sync {
    async fn schedule(&self, delay: Duration, timeout: SagaTimeout) -> Result<(), SagaError>;
}

#[async_trait]
impl<T: CommandSender + ?Sized> CommandSender for Arc<T> {
    async fn send(&self, envelope: Envelope) -> Result<(), SagaError> {
        (**self).send(envelope).await
    }
}

#[async_trait]
impl<T: TimeoutScheduler + ?Sized> TimeoutScheduler for Arc<T> {
    async fn schedule(&self, delay: Duration, timeout: SagaTimeout) -> Result<(), SagaError> {
        (**self).schedule(delay, timeout).await
    }
}
