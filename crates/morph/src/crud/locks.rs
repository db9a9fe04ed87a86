//! Per-instance write serialisation.
//!
//! An update or delete holds its instance's lock from the store write until
//! its reverse-relation writes have finished, so the relation passes of two
//! writes to the same instance never interleave.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Key = (String, String);

#[derive(Default)]
pub(crate) struct InstanceLocks {
    locks: Mutex<HashMap<Key, Arc<AsyncMutex<()>>>>,
}

impl InstanceLocks {
    pub(crate) async fn acquire(&self, entity: &str, id: &str) -> InstanceGuard<'_> {
        let key = (entity.to_string(), id.to_string());
        let lock = self
            .locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key.clone())
            .or_default()
            .clone();
        InstanceGuard {
            owner: self,
            key,
            guard: Some(lock.lock_owned().await),
        }
    }

    /// Number of instances with a live lock entry.
    pub(crate) fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

pub(crate) struct InstanceGuard<'a> {
    owner: &'a InstanceLocks,
    key: Key,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for InstanceGuard<'_> {
    fn drop(&mut self) {
        self.guard.take();
        let mut locks = self.owner.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only this map holds the lock once nobody owns or waits for it.
        if locks.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(&self.key);
        }
    }
}
