//! Shared value types for the command saga workspace.

pub mod payload;
pub mod types;

pub use payload::Payload;
pub use types::{SagaId, Version};
