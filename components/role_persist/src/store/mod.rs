use crate::error::StoreError;
use crate::models::{PersistKey, RolePersistRecord, RoleSet};

pub mod memory;
pub mod pg;

pub use memory::MemoryRoleStore;
pub use pg::PgRoleStore;

/// How an upsert landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upserted {
    Inserted,
    Updated,
}

/// Durable storage of persisted role sets.
///
/// Each operation is a single atomic unit. Writes never accept an empty set,
/// an empty set is represented by the absence of a row.
#[async_trait::async_trait]
pub trait RoleStore: Send + Sync {
    async fn load_all(&self) -> Result<Vec<RolePersistRecord>, StoreError>;

    /// Fails with [`StoreError::Conflict`] if a row already exists.
    async fn insert(&self, key: PersistKey, roles: &RoleSet) -> Result<(), StoreError>;

    /// Fails with [`StoreError::NotFound`] if no row exists.
    async fn update(&self, key: PersistKey, roles: &RoleSet) -> Result<(), StoreError>;

    async fn upsert(&self, key: PersistKey, roles: &RoleSet) -> Result<Upserted, StoreError>;

    /// Returns `false` if there was nothing to delete.
    async fn delete(&self, key: PersistKey) -> Result<bool, StoreError>;
}

#[inline]
pub(crate) fn check_non_empty(key: PersistKey, roles: &RoleSet) -> Result<(), StoreError> {
    if roles.is_empty() {
        return Err(StoreError::EmptyRoleSet(key));
    }

    Ok(())
}
