use async_trait::async_trait;
use tokio::sync::mpsc;

use super::CommandSender;
use crate::envelope::Envelope;
use crate::error::SagaError;
use crate::messages::SagaMessage;
use crate::runtime::SagaRuntimeHandle;

/// In-process bus for single-node hosting.
///
/// Saga control messages (start, continue, abort) are routed straight into
/// the saga runtime. Every other envelope is a business command and goes to
/// the outbound channel, where the host's command handlers pick it up.
#[derive(Debug, Clone)]
pub struct LocalBus {
    runtime: SagaRuntimeHandle,
    outbound: mpsc::Sender<Envelope>,
}

impl LocalBus {
    pub fn new(runtime: SagaRuntimeHandle, outbound: mpsc::Sender<Envelope>) -> Self {
        Self { runtime, outbound }
    }

    /// Creates a bus together with the receiver for outbound commands.
    pub fn with_outbound(
        runtime: SagaRuntimeHandle,
        capacity: usize,
    ) -> (Self, mpsc::Receiver<Envelope>) {
        let (outbound, receiver) = mpsc::channel(capacity.max(1));
        (Self::new(runtime, outbound), receiver)
    }
}

#[async_trait]
impl CommandSender for LocalBus {
    async fn send(&self, envelope: Envelope) -> Result<(), SagaError> {
        if let Some(message) = SagaMessage::from_envelope(&envelope)? {
            tracing::trace!(
                saga_id = %message.saga_id(),
                message_type = message.message_type(),
                "routing saga message locally"
            );
            return self.runtime.deliver(message).await;
        }

        self.outbound
            .send(envelope)
            .await
            .map_err(|unsent| SagaError::Send {
                destination: unsent.0.destination,
                reason: "outbound channel closed".to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::StartCommandSaga;
    use crate::runtime::inbox;
    use common::{Payload, SagaId};
    use serde_json::json;

    #[tokio::test]
    async fn test_saga_messages_go_to_runtime() {
        let (handle, mut inbox) = inbox(4);
        let (bus, mut outbound) = LocalBus::with_outbound(handle, 4);

        let start = SagaMessage::Start(StartCommandSaga {
            saga_id: SagaId::from("s"),
            originating: None,
            commands: vec![Payload::new("A", json!({}))],
            abort_commands: vec![],
        });
        let envelope = Envelope::saga_start("orders", &SagaId::from("s"), start.to_payload().unwrap());
        bus.send(envelope).await.unwrap();

        assert_eq!(inbox.recv().await.unwrap(), start);
        assert!(outbound.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_commands_go_to_outbound() {
        let (handle, mut inbox) = inbox(4);
        let (bus, mut outbound) = LocalBus::with_outbound(handle, 4);

        let envelope = Envelope::new("inventory", Payload::new("ReserveStock", json!({"sku": "x"})));
        bus.send(envelope.clone()).await.unwrap();

        assert_eq!(outbound.recv().await.unwrap(), envelope);
        drop(bus);
        assert!(inbox.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_closed_outbound_is_send_error() {
        let (handle, _inbox) = inbox(4);
        let (bus, outbound) = LocalBus::with_outbound(handle, 1);
        drop(outbound);

        let result = bus
            .send(Envelope::new("inventory", Payload::new("ReserveStock", json!({}))))
            .await;
        assert!(matches!(
            result,
            Err(SagaError::Send { destination, .. }) if destination == "inventory"
        ));
    }

    #[tokio::test]
    async fn test_stopped_runtime_is_reported() {
        let (handle, inbox) = inbox(4);
        let (bus, _outbound) = LocalBus::with_outbound(handle, 4);
        drop(inbox);

        let result = bus
            .send(Envelope::new("orders", SagaMessage::continue_saga("s").to_payload().unwrap()))
            .await;
        assert!(matches!(result, Err(SagaError::RuntimeStopped)));
    }
}
