//! Keyed mutual exclusion for per-entity save serialization.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use common::EntityId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Above this many registered locks, idle entries are pruned on acquire.
const PRUNE_THRESHOLD: usize = 1024;

/// A table of per-entity mutexes.
///
/// Only one in-flight save per entity at a time; unrelated entities
/// proceed fully concurrently. Acquisition suspends the caller; the
/// returned owned guard releases on every exit path, including error
/// paths.
#[derive(Default)]
pub struct EntityLocks {
    locks: Mutex<HashMap<EntityId, Arc<Mutex<()>>>>,
}

impl EntityLocks {
    /// Creates an empty lock table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires the lock for `entity_id`, waiting at most `timeout`.
    ///
    /// Returns `None` if the lock could not be acquired in time.
    pub async fn acquire(
        &self,
        entity_id: EntityId,
        timeout: Duration,
    ) -> Option<OwnedMutexGuard<()>> {
        let lock = {
            let mut locks = self.locks.lock().await;
            if locks.len() > PRUNE_THRESHOLD {
                // Entries only the table still references are idle.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(locks.entry(entity_id).or_default())
        };

        tokio::time::timeout(timeout, lock.lock_owned()).await.ok()
    }

    /// Returns the number of registered entity locks.
    pub async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }

    /// Returns true if no locks are registered.
    pub async fn is_empty(&self) -> bool {
        self.locks.lock().await.is_empty()
    }
}
