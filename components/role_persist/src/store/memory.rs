use hashbrown::HashMap;
use parking_lot::Mutex;

use super::{check_non_empty, RoleStore, Upserted};
use crate::error::StoreError;
use crate::models::{PersistKey, RolePersistRecord, RoleSet};

/// In-process store, for tests and dry runs.
#[derive(Default)]
pub struct MemoryRoleStore {
    rows: Mutex<HashMap<PersistKey, RoleSet>>,
    unavailable: Mutex<bool>,
}

impl MemoryRoleStore {
    pub fn with_records(records: impl IntoIterator<Item = RolePersistRecord>) -> Self {
        let store = MemoryRoleStore::default();

        {
            let mut rows = store.rows.lock();
            for record in records {
                rows.insert(record.key(), record.roles);
            }
        }

        store
    }

    pub fn get(&self, key: &PersistKey) -> Option<RoleSet> {
        self.rows.lock().get(key).cloned()
    }

    pub fn len(&self) -> usize {
        self.rows.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.lock().is_empty()
    }

    /// While set, every operation fails with [`StoreError::Unavailable`]
    pub fn set_unavailable(&self, unavailable: bool) {
        *self.unavailable.lock() = unavailable;
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if *self.unavailable.lock() {
            return Err(StoreError::Unavailable("memory store marked unavailable".to_owned()));
        }

        Ok(())
    }
}

#[async_trait::async_trait]
impl RoleStore for MemoryRoleStore {
    async fn load_all(&self) -> Result<Vec<RolePersistRecord>, StoreError> {
        self.check_available()?;

        Ok(self
            .rows
            .lock()
            .iter()
            .map(|(key, roles)| RolePersistRecord {
                party_id: key.party_id,
                user_id: key.user_id,
                roles: roles.clone(),
            })
            .collect())
    }

    async fn insert(&self, key: PersistKey, roles: &RoleSet) -> Result<(), StoreError> {
        check_non_empty(key, roles)?;
        self.check_available()?;

        let mut rows = self.rows.lock();
        if rows.contains_key(&key) {
            return Err(StoreError::Conflict(key));
        }

        rows.insert(key, roles.clone());

        Ok(())
    }

    async fn update(&self, key: PersistKey, roles: &RoleSet) -> Result<(), StoreError> {
        check_non_empty(key, roles)?;
        self.check_available()?;

        match self.rows.lock().get_mut(&key) {
            Some(existing) => {
                *existing = roles.clone();
                Ok(())
            }
            None => Err(StoreError::NotFound(key)),
        }
    }

    async fn upsert(&self, key: PersistKey, roles: &RoleSet) -> Result<Upserted, StoreError> {
        check_non_empty(key, roles)?;
        self.check_available()?;

        Ok(match self.rows.lock().insert(key, roles.clone()) {
            Some(_) => Upserted::Updated,
            None => Upserted::Inserted,
        })
    }

    async fn delete(&self, key: PersistKey) -> Result<bool, StoreError> {
        self.check_available()?;

        Ok(self.rows.lock().remove(&key).is_some())
    }
}
