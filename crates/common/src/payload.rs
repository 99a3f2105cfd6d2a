use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// An opaque message carried through a saga.
///
/// Commands, compensating commands and the originating message are all
/// payloads: the saga never inspects `body`, it only forwards it. The
/// `message_type` tells the receiving side how to decode the body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    /// Logical type name of the message (e.g. `"ReserveStock"`).
    pub message_type: String,

    /// The message body as JSON.
    pub body: serde_json::Value,
}

impl Payload {
    /// Creates a payload from an already-serialized body.
    pub fn new(message_type: impl Into<String>, body: serde_json::Value) -> Self {
        Self {
            message_type: message_type.into(),
            body,
        }
    }

    /// Serializes `message` into a payload of the given type.
    pub fn encode<T: Serialize>(
        message_type: impl Into<String>,
        message: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(message_type, serde_json::to_value(message)?))
    }

    /// Deserializes the body into `T`.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone())
    }

    /// Returns true if this payload has the given message type.
    pub fn is(&self, message_type: &str) -> bool {
        self.message_type == message_type
    }
}
