use crate::models::{PersistKey, RoleSet};

/// In-memory mirror of the persisted role sets.
///
/// Only ever written after the matching store operation has committed, so any
/// value read here is durable. Writers must hold the key's lock from
/// [`RolePersistService`](crate::service::RolePersistService); readers never block on the store.
#[derive(Default)]
pub struct RoleSetCache {
    map: scc::HashMap<PersistKey, RoleSet>,
}

impl RoleSetCache {
    pub async fn get(&self, key: &PersistKey) -> Option<RoleSet> {
        self.map.read_async(key, |_, roles| roles.clone()).await
    }

    pub async fn contains(&self, key: &PersistKey) -> bool {
        self.map.contains_async(key).await
    }

    /// Overwrites any previous entry. Call only after the store write committed.
    pub async fn put(&self, key: PersistKey, roles: RoleSet) {
        debug_assert!(!roles.is_empty(), "empty role sets are removed, not cached");

        match self.map.entry_async(key).await {
            scc::hash_map::Entry::Occupied(mut entry) => *entry.get_mut() = roles,
            scc::hash_map::Entry::Vacant(entry) => {
                entry.insert_entry(roles);
            }
        }
    }

    /// Call only after the store row was deleted.
    pub async fn remove(&self, key: &PersistKey) -> Option<RoleSet> {
        self.map.remove_async(key).await.map(|(_, roles)| roles)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{key, roles};

    #[tokio::test]
    async fn put_overwrites_and_remove_clears() {
        let cache = RoleSetCache::default();
        let k = key(1, 2);

        assert_eq!(cache.get(&k).await, None);

        cache.put(k, roles(&[10])).await;
        cache.put(k, roles(&[11, 12])).await;

        assert_eq!(cache.get(&k).await, Some(roles(&[11, 12])));
        assert_eq!(cache.len(), 1);

        assert_eq!(cache.remove(&k).await, Some(roles(&[11, 12])));
        assert!(!cache.contains(&k).await);
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn keys_are_scoped_by_party() {
        let cache = RoleSetCache::default();

        cache.put(key(1, 2), roles(&[10])).await;

        assert_eq!(cache.get(&key(3, 2)).await, None);
        assert_eq!(cache.get(&key(1, 2)).await, Some(roles(&[10])));
    }
}
