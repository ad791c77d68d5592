use std::sync::Arc;

use role_persist::{
    platform::{AllParties, GrantOutcome, Notifier, RolePlatform},
    store::MemoryRoleStore,
    NotifyError, PartyId, PersistKey, PersistenceReactor, PlatformError, Role, RoleId, RolePersistNotification,
    RolePersistRecord, RolePersistService, RoleSet, Snowflake, UserId,
};

pub fn sf(id: u64) -> Snowflake {
    Snowflake::new(id).unwrap()
}

pub fn key(party: u64, user: u64) -> PersistKey {
    PersistKey::new(sf(party), sf(user))
}

pub fn roles(ids: &[u64]) -> RoleSet {
    ids.iter().copied().map(sf).collect()
}

pub fn record(party: u64, user: u64, role_ids: &[u64]) -> RolePersistRecord {
    RolePersistRecord {
        party_id: sf(party),
        user_id: sf(user),
        roles: roles(role_ids),
    }
}

/// Every requested role exists and every grant succeeds
pub struct OpenPlatform;

#[async_trait::async_trait]
impl RolePlatform for OpenPlatform {
    async fn resolve_roles(&self, _: PartyId, ids: &[RoleId]) -> Result<Vec<Role>, PlatformError> {
        Ok(ids
            .iter()
            .map(|&id| Role {
                id,
                name: format!("role-{id}").into(),
            })
            .collect())
    }

    async fn grant_roles(&self, _: PartyId, _: UserId, ids: &[RoleId]) -> Result<GrantOutcome, PlatformError> {
        Ok(GrantOutcome::Granted { granted: ids.to_vec() })
    }
}

pub struct QuietNotifier;

#[async_trait::async_trait]
impl Notifier for QuietNotifier {
    async fn notify(&self, _: &RolePersistNotification) -> Result<(), NotifyError> {
        Ok(())
    }
}

pub async fn reactor(store: Arc<MemoryRoleStore>) -> PersistenceReactor {
    let service = Arc::new(RolePersistService::load(store, &AllParties).await.unwrap());

    PersistenceReactor::new(service, Arc::new(OpenPlatform), Arc::new(QuietNotifier))
}
