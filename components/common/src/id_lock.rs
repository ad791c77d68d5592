use std::hash::Hash;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};

/// Concurrent map of async locks, one per key, created on demand.
///
/// Holding the guard for a key serializes every operation on that key while
/// operations on other keys proceed.
pub struct IdLockMap<K: Eq + Hash> {
    map: scc::HashMap<K, Arc<Mutex<()>>>,
}

impl<K: Eq + Hash> Default for IdLockMap<K> {
    fn default() -> Self {
        IdLockMap {
            map: scc::HashMap::default(),
        }
    }
}

impl<K: Eq + Hash> IdLockMap<K> {
    pub async fn lock(&self, id: K) -> OwnedMutexGuard<()> {
        // clone the lock out so the map entry isn't held while waiting on it
        let lock = self.map.entry_async(id).await.or_default().get().clone();

        Mutex::lock_owned(lock).await
    }

    /// Number of locks currently tracked, held or not
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drops any locks that are not currently held or waited on
    pub async fn cleanup(&self) {
        self.map.retain_async(|_, lock| Arc::strong_count(lock) > 1).await;

        log::trace!("{} id locks remain after cleanup", self.map.len());
    }
}
