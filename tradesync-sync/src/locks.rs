//! Per-entity single-writer tokens.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use tradesync_core::LocalId;

type Slots = HashMap<LocalId, Arc<AsyncMutex<()>>>;

/// One async token per local id. Holding the token grants exclusive right to
/// sync that entity; overlapping jobs wait for each other entity by entity.
///
/// A slot lives only while someone holds or waits for it.
#[derive(Debug, Default)]
pub struct EntityLocks {
    slots: Mutex<Slots>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, id: &LocalId) -> EntityToken<'_> {
        let slot = self.slots().entry(id.clone()).or_default().clone();
        EntityToken {
            locks: self,
            id: id.clone(),
            _guard: slot.lock_owned().await,
        }
    }

    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.slots().len()
    }
}

/// Exclusive right to one entity, released on drop.
#[derive(Debug)]
pub struct EntityToken<'a> {
    locks: &'a EntityLocks,
    id: LocalId,
    _guard: OwnedMutexGuard<()>,
}

impl Drop for EntityToken<'_> {
    fn drop(&mut self) {
        // Clones are only taken under the map lock, so a count of two (map
        // plus this guard) means nobody is waiting.
        let mut slots = self.locks.slots();
        if slots
            .get(&self.id)
            .is_some_and(|slot| Arc::strong_count(slot) == 2)
        {
            slots.remove(&self.id);
        }
    }
}
