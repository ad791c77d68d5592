use std::sync::Arc;

use common::id_lock::IdLockMap;

use crate::cache::RoleSetCache;
use crate::error::StoreError;
use crate::models::{PersistKey, RoleSet, StoreChange};
use crate::platform::Eligibility;
use crate::sf::RoleId;
use crate::store::{RoleStore, Upserted};
use crate::toggle::toggle;

/// A toggle that has been committed to both the store and the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToggleCommit {
    pub key: PersistKey,
    pub previous: RoleSet,
    pub roles: RoleSet,
    pub change: StoreChange,
}

/// Owns the cache and the store, and serializes every mutation per member.
pub struct RolePersistService {
    cache: RoleSetCache,
    store: Arc<dyn RoleStore>,
    locks: IdLockMap<PersistKey>,
}

impl RolePersistService {
    /// Populates the cache from every stored record whose party is eligible.
    pub async fn load(store: Arc<dyn RoleStore>, eligibility: &dyn Eligibility) -> Result<Self, StoreError> {
        let records = store.load_all().await?;
        let total = records.len();

        let cache = RoleSetCache::default();
        let mut skipped = 0;

        for record in records {
            if !eligibility.is_eligible(record.party_id) {
                skipped += 1;
                continue;
            }

            if record.roles.is_empty() {
                log::warn!("Skipping empty persisted role set for {}", record.key());
                skipped += 1;
                continue;
            }

            cache.put(record.key(), record.roles).await;
        }

        log::info!("Loaded {} of {total} persisted role sets ({skipped} skipped)", cache.len());

        Ok(RolePersistService {
            cache,
            store,
            locks: IdLockMap::default(),
        })
    }

    pub async fn get(&self, key: &PersistKey) -> Option<RoleSet> {
        self.cache.get(key).await
    }

    /// Number of members with persisted roles
    pub fn tracked(&self) -> usize {
        self.cache.len()
    }

    pub fn locks(&self) -> &IdLockMap<PersistKey> {
        &self.locks
    }

    /// Flips each of `requested` against the member's persisted set, then commits
    /// the result to the store followed by the cache.
    ///
    /// On error nothing in the cache has changed.
    pub async fn toggle(&self, key: PersistKey, requested: &[RoleId]) -> Result<ToggleCommit, StoreError> {
        let _guard = self.locks.lock(key).await;

        let cached = self.cache.get(&key).await;
        let previous = cached.clone().unwrap_or_default();
        let roles = toggle(&previous, requested);

        let change = if roles == previous {
            StoreChange::Unchanged
        } else if roles.is_empty() {
            if !self.store.delete(key).await? {
                log::error!("Cached roles for {key} had no stored row to delete");
            }

            self.cache.remove(&key).await;

            StoreChange::Deleted
        } else {
            let upserted = self.store.upsert(key, &roles).await?;

            match (upserted, cached.is_some()) {
                (Upserted::Inserted, true) => log::error!("Cached roles for {key} had no stored row"),
                (Upserted::Updated, false) => log::error!("Stored roles for {key} were missing from the cache"),
                _ => {}
            }

            self.cache.put(key, roles.clone()).await;

            match upserted {
                Upserted::Inserted => StoreChange::Inserted,
                Upserted::Updated => StoreChange::Updated,
            }
        };

        log::debug!("Toggled {} role(s) for {key}: {change:?}", requested.len());

        Ok(ToggleCommit {
            key,
            previous,
            roles,
            change,
        })
    }
}
