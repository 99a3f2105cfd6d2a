//! Builder that assembles and launches a command saga.

use common::{Payload, SagaId};

use crate::config::SagaConfig;
use crate::envelope::Envelope;
use crate::error::Result;
use crate::messages::{SagaMessage, StartCommandSaga};
use crate::transport::CommandSender;

/// Collects an ordered command list and its compensations, then sends the
/// start message to the saga endpoint.
///
/// ```ignore
/// let saga_id = CommandSaga::new(bus, &config, SagaId::new(), Some(order_placed))?
///     .add_command(reserve_stock)
///     .add_command(charge_card)
///     .add_abort_command(release_stock)
///     .start()
///     .await?;
/// ```
#[derive(Debug)]
pub struct CommandSaga<C: CommandSender> {
    sender: C,
    destination: String,
    saga_id: SagaId,
    originating: Option<Payload>,
    commands: Vec<Payload>,
    abort_commands: Vec<Payload>,
}

impl<C: CommandSender> CommandSaga<C> {
    /// Fails with a configuration error when no command destination is set.
    pub fn new(
        sender: C,
        config: &SagaConfig,
        saga_id: impl Into<SagaId>,
        originating: Option<Payload>,
    ) -> Result<Self> {
        let destination = config.command_destination()?.to_string();
        Ok(Self {
            sender,
            destination,
            saga_id: saga_id.into(),
            originating,
            commands: Vec::new(),
            abort_commands: Vec::new(),
        })
    }

    /// Returns the id the saga will run under.
    pub fn saga_id(&self) -> &SagaId {
        &self.saga_id
    }

    /// Appends a forward command.
    pub fn add_command(mut self, command: Payload) -> Self {
        self.commands.push(command);
        self
    }

    /// Appends a compensation command.
    pub fn add_abort_command(mut self, command: Payload) -> Self {
        self.abort_commands.push(command);
        self
    }

    /// Sends the start message and returns the saga's id.
    #[tracing::instrument(
        skip(self),
        fields(
            saga_id = %self.saga_id,
            commands = self.commands.len(),
            abort_commands = self.abort_commands.len()
        )
    )]
    pub async fn start(self) -> Result<SagaId> {
        let saga_id = self.saga_id;
        let start = SagaMessage::Start(StartCommandSaga {
            saga_id: saga_id.clone(),
            originating: self.originating,
            commands: self.commands,
            abort_commands: self.abort_commands,
        });

        let envelope = Envelope::saga_start(self.destination, &saga_id, start.to_payload()?);
        self.sender.send(envelope).await?;

        tracing::info!("command saga launched");
        metrics::counter!("saga_launched_total").increment(1);
        Ok(saga_id)
    }
}
