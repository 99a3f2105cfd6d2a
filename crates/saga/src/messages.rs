//! Correlation messages that drive a command saga.
//!
//! Every message carries the saga id; that id is the only thing used to route
//! it to saga state.

use common::{Payload, SagaId};
use serde::{Deserialize, Serialize};

use crate::envelope::Envelope;

pub const START_COMMAND_SAGA: &str = "StartCommandSaga";
pub const CONTINUE_COMMAND_SAGA: &str = "ContinueCommandSaga";
pub const ABORT_COMMAND_SAGA: &str = "AbortCommandSaga";
pub const SAGA_TIMEOUT: &str = "SagaTimeout";

/// Creates a saga with its forward and compensation plans.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StartCommandSaga {
    pub saga_id: SagaId,
    /// Caller context carried for downstream use (e.g. replying to the requester).
    pub originating: Option<Payload>,
    pub commands: Vec<Payload>,
    pub abort_commands: Vec<Payload>,
}

/// The destination accepted the command just sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinueCommandSaga {
    pub saga_id: SagaId,
}

/// The destination rejected the command just sent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbortCommandSaga {
    pub saga_id: SagaId,
}

/// Watchdog expiry for the most recently sent command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SagaTimeout {
    pub saga_id: SagaId,
}

/// Any message a saga handles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum SagaMessage {
    Start(StartCommandSaga),
    Continue(ContinueCommandSaga),
    Abort(AbortCommandSaga),
    Timeout(SagaTimeout),
}

impl SagaMessage {
    /// Creates a Continue message.
    pub fn continue_saga(saga_id: impl Into<SagaId>) -> Self {
        SagaMessage::Continue(ContinueCommandSaga {
            saga_id: saga_id.into(),
        })
    }

    /// Creates an Abort message.
    pub fn abort_saga(saga_id: impl Into<SagaId>) -> Self {
        SagaMessage::Abort(AbortCommandSaga {
            saga_id: saga_id.into(),
        })
    }

    /// Creates a Timeout message.
    pub fn timeout(saga_id: impl Into<SagaId>) -> Self {
        SagaMessage::Timeout(SagaTimeout {
            saga_id: saga_id.into(),
        })
    }

    /// Returns the correlation id this message is routed by.
    pub fn saga_id(&self) -> &SagaId {
        match self {
            SagaMessage::Start(m) => &m.saga_id,
            SagaMessage::Continue(m) => &m.saga_id,
            SagaMessage::Abort(m) => &m.saga_id,
            SagaMessage::Timeout(m) => &m.saga_id,
        }
    }

    /// Returns the wire type name of the message.
    pub fn message_type(&self) -> &'static str {
        match self {
            SagaMessage::Start(_) => START_COMMAND_SAGA,
            SagaMessage::Continue(_) => CONTINUE_COMMAND_SAGA,
            SagaMessage::Abort(_) => ABORT_COMMAND_SAGA,
            SagaMessage::Timeout(_) => SAGA_TIMEOUT,
        }
    }

    /// Encodes the message body as a payload.
    pub fn to_payload(&self) -> Result<Payload, serde_json::Error> {
        match self {
            SagaMessage::Start(m) => Payload::encode(START_COMMAND_SAGA, m),
            SagaMessage::Continue(m) => Payload::encode(CONTINUE_COMMAND_SAGA, m),
            SagaMessage::Abort(m) => Payload::encode(ABORT_COMMAND_SAGA, m),
            SagaMessage::Timeout(m) => Payload::encode(SAGA_TIMEOUT, m),
        }
    }

    /// Decodes a saga message from a payload.
    ///
    /// Returns `Ok(None)` for payloads that are not saga messages.
    pub fn from_payload(payload: &Payload) -> Result<Option<Self>, serde_json::Error> {
        let message = match payload.message_type.as_str() {
            START_COMMAND_SAGA => SagaMessage::Start(payload.decode()?),
            CONTINUE_COMMAND_SAGA => SagaMessage::Continue(payload.decode()?),
            ABORT_COMMAND_SAGA => SagaMessage::Abort(payload.decode()?),
            SAGA_TIMEOUT => SagaMessage::Timeout(payload.decode()?),
            _ => return Ok(None),
        };
        Ok(Some(message))
    }

    /// Decodes a saga message carried in an envelope.
    pub fn from_envelope(envelope: &Envelope) -> Result<Option<Self>, serde_json::Error> {
        Self::from_payload(&envelope.payload)
    }
}

impl From<StartCommandSaga> for SagaMessage {
    fn from(m: StartCommandSaga) -> Self {
        SagaMessage::Start(m)
    }
}

impl From<ContinueCommandSaga> for SagaMessage {
    fn from(m: ContinueCommandSaga) -> Self {
        SagaMessage::Continue(m)
    }
}

impl From<AbortCommandSaga> for SagaMessage {
    fn from(m: AbortCommandSaga) -> Self {
        SagaMessage::Abort(m)
    }
}

impl From<SagaTimeout> for SagaMessage {
    fn from(m: SagaTimeout) -> Self {
        SagaMessage::Timeout(m)
    }
}
