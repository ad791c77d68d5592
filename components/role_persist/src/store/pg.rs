use db::Client;

use super::{check_non_empty, RoleStore, Upserted};
use crate::error::StoreError;
use crate::models::{PersistKey, RolePersistRecord, RoleSet};
use crate::sf::RoleId;

/// Role sets persisted in `lantern.role_persists`
#[derive(Clone)]
pub struct PgRoleStore {
    db: Client,
}

impl PgRoleStore {
    pub fn new(db: Client) -> Self {
        PgRoleStore { db }
    }
}

#[async_trait::async_trait]
impl RoleStore for PgRoleStore {
    async fn load_all(&self) -> Result<Vec<RolePersistRecord>, StoreError> {
        let rows = self
            .db
            .query_cached(|| "SELECT party_id, user_id, role_ids FROM lantern.role_persists", &[])
            .await?;

        let mut records = Vec::with_capacity(rows.len());

        for row in rows {
            let role_ids: Vec<RoleId> = row.try_get(2)?;

            records.push(RolePersistRecord {
                party_id: row.try_get(0)?,
                user_id: row.try_get(1)?,
                roles: RoleSet::from(role_ids),
            });
        }

        Ok(records)
    }

    async fn insert(&self, key: PersistKey, roles: &RoleSet) -> Result<(), StoreError> {
        check_non_empty(key, roles)?;

        let res = self
            .db
            .execute_cached(
                || "INSERT INTO lantern.role_persists (party_id, user_id, role_ids) VALUES ($1, $2, $3)",
                &[&key.party_id, &key.user_id, &roles.as_slice()],
            )
            .await;

        match res {
            Ok(_) => Ok(()),
            Err(e) if e.is_unique_violation() => Err(StoreError::Conflict(key)),
            Err(e) => Err(e.into()),
        }
    }

    async fn update(&self, key: PersistKey, roles: &RoleSet) -> Result<(), StoreError> {
        check_non_empty(key, roles)?;

        let updated = self
            .db
            .execute_cached(
                || {
                    "UPDATE lantern.role_persists SET role_ids = $3, updated_at = now() \
                     WHERE party_id = $1 AND user_id = $2"
                },
                &[&key.party_id, &key.user_id, &roles.as_slice()],
            )
            .await?;

        if updated == 0 {
            return Err(StoreError::NotFound(key));
        }

        Ok(())
    }

    async fn upsert(&self, key: PersistKey, roles: &RoleSet) -> Result<Upserted, StoreError> {
        check_non_empty(key, roles)?;

        // xmax is only zero for a freshly inserted tuple
        let row = self
            .db
            .query_one_cached(
                || {
                    "INSERT INTO lantern.role_persists (party_id, user_id, role_ids) VALUES ($1, $2, $3) \
                     ON CONFLICT (party_id, user_id) DO UPDATE \
                     SET role_ids = EXCLUDED.role_ids, updated_at = now() \
                     RETURNING (xmax = 0) AS inserted"
                },
                &[&key.party_id, &key.user_id, &roles.as_slice()],
            )
            .await?;

        Ok(match row.try_get::<_, bool>(0)? {
            true => Upserted::Inserted,
            false => Upserted::Updated,
        })
    }

    async fn delete(&self, key: PersistKey) -> Result<bool, StoreError> {
        let deleted = self
            .db
            .execute_cached(
                || "DELETE FROM lantern.role_persists WHERE party_id = $1 AND user_id = $2",
                &[&key.party_id, &key.user_id],
            )
            .await?;

        Ok(deleted > 0)
    }
}
