//! Outbound message envelope and saga headers.

use std::collections::BTreeMap;

use common::{Payload, SagaId};
use serde::{Deserialize, Serialize};

/// Header distinguishing the message that starts a saga from in-saga steps.
pub const REQUEST_RESPONSE_HEADER: &str = "Saga.RequestResponse";

/// Header carrying the saga correlation id.
pub const SAGA_HEADER: &str = "Saga.Id";

/// `REQUEST_RESPONSE_HEADER` value on the message that starts a saga.
pub const SAGA_START_FLAG: &str = "0";

/// `REQUEST_RESPONSE_HEADER` value on every command a saga sends.
pub const SAGA_STEP_FLAG: &str = "1";

/// A message addressed to a destination, with out-of-band headers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Address of the receiving endpoint.
    pub destination: String,

    /// The message itself.
    pub payload: Payload,

    /// Out-of-band headers.
    pub headers: BTreeMap<String, String>,
}

impl Envelope {
    /// Creates an envelope with no headers.
    pub fn new(destination: impl Into<String>, payload: Payload) -> Self {
        Self {
            destination: destination.into(),
            payload,
            headers: BTreeMap::new(),
        }
    }

    /// Creates the envelope that starts a saga (flag `0`).
    pub fn saga_start(destination: impl Into<String>, saga_id: &SagaId, payload: Payload) -> Self {
        Self::new(destination, payload)
            .with_header(REQUEST_RESPONSE_HEADER, SAGA_START_FLAG)
            .with_header(SAGA_HEADER, saga_id.as_str())
    }

    /// Creates the envelope for a command sent from inside a saga (flag `1`).
    pub fn saga_step(destination: impl Into<String>, saga_id: &SagaId, payload: Payload) -> Self {
        Self::new(destination, payload)
            .with_header(REQUEST_RESPONSE_HEADER, SAGA_STEP_FLAG)
            .with_header(SAGA_HEADER, saga_id.as_str())
    }

    /// Adds a header.
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    /// Returns a header value.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    /// Returns the saga correlation id header, if present.
    pub fn saga_id(&self) -> Option<SagaId> {
        self.header(SAGA_HEADER).map(SagaId::from)
    }

    /// Returns true if this envelope starts a saga.
    pub fn is_saga_start(&self) -> bool {
        self.header(REQUEST_RESPONSE_HEADER) == Some(SAGA_START_FLAG)
    }

    /// Returns true if this envelope is a command sent by a running saga.
    pub fn is_saga_step(&self) -> bool {
        self.header(REQUEST_RESPONSE_HEADER) == Some(SAGA_STEP_FLAG)
    }
}
