//! Per-saga mutual exclusion.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use common::SagaId;
use tokio::sync::OwnedMutexGuard;

type Slot = Arc<tokio::sync::Mutex<()>>;

/// Serializes work per [`SagaId`] while letting different ids run in parallel.
///
/// Slots are created on demand and dropped when the last holder or waiter
/// releases, so the map only holds ids with work in flight.
#[derive(Debug, Clone, Default)]
pub struct KeyedLocks {
    slots: Arc<Mutex<HashMap<SagaId, Slot>>>,
}

/// Exclusive access to one saga. Released on drop.
#[derive(Debug)]
pub struct SagaGuard {
    saga_id: SagaId,
    slots: Arc<Mutex<HashMap<SagaId, Slot>>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl KeyedLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `saga_id`.
    pub async fn lock(&self, saga_id: &SagaId) -> SagaGuard {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
            slots.entry(saga_id.clone()).or_default().clone()
        };

        let guard = slot.lock_owned().await;
        SagaGuard {
            saga_id: saga_id.clone(),
            slots: self.slots.clone(),
            guard: Some(guard),
        }
    }

    /// Returns the number of ids currently locked or awaited.
    pub fn active(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl SagaGuard {
    /// Returns the saga this guard protects.
    pub fn saga_id(&self) -> &SagaId {
        &self.saga_id
    }
}

impl Drop for SagaGuard {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        self.guard.take();
        // Only the map still references the slot: nobody holds or waits on it.
        if slots
            .get(&self.saga_id)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.saga_id);
        }
    }
}
