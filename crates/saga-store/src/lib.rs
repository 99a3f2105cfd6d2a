//! Keyed persistent store for saga state.
//!
//! Each saga instance owns exactly one record, addressed by its [`SagaId`].
//! Writes are guarded by optimistic concurrency on [`Version`]; completing a
//! saga removes its record, so "completed" is the absence of a record.

pub mod error;
pub mod memory;
pub mod postgres;
pub mod record;
pub mod store;

pub use common::{SagaId, Version};
pub use error::{Result, SagaStoreError};
pub use memory::InMemorySagaStore;
pub use postgres::PostgresSagaStore;
pub use record::SagaRecord;
pub use store::{SagaStore, SagaStoreExt};
