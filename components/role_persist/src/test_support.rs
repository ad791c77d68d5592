use hashbrown::HashMap;
use parking_lot::Mutex;
use proptest::prelude::*;

use crate::error::{NotifyError, PlatformError};
use crate::models::{PersistKey, Role, RolePersistNotification, RolePersistRecord, RoleSet};
use crate::platform::{GrantOutcome, Notifier, RolePlatform};
use crate::sf::{PartyId, RoleId, Snowflake, UserId};

pub fn sf(id: u64) -> Snowflake {
    Snowflake::new(id).unwrap()
}

pub fn ids(ids: &[u64]) -> Vec<RoleId> {
    ids.iter().copied().map(sf).collect()
}

pub fn roles(ids: &[u64]) -> RoleSet {
    ids.iter().copied().map(sf).collect()
}

/// Role ids drawn from a small range so requests and sets overlap often
pub fn arb_id() -> impl Strategy<Value = RoleId> {
    (1u64..16).prop_map(sf)
}

pub fn arb_ids() -> impl Strategy<Value = Vec<RoleId>> {
    prop::collection::vec(arb_id(), 0..12)
}

pub fn arb_unique_ids() -> impl Strategy<Value = Vec<RoleId>> {
    prop::collection::vec(arb_id(), 0..12).prop_map(|raw| RoleSet::from(raw).as_slice().to_vec())
}

pub fn arb_roles() -> impl Strategy<Value = RoleSet> {
    arb_ids().prop_map(RoleSet::from)
}

pub fn key(party: u64, user: u64) -> PersistKey {
    PersistKey::new(sf(party), sf(user))
}

pub fn record(party: u64, user: u64, role_ids: &[u64]) -> RolePersistRecord {
    RolePersistRecord {
        party_id: sf(party),
        user_id: sf(user),
        roles: roles(role_ids),
    }
}

/// Party roles named `role-<id>`, with every grant recorded
#[derive(Default)]
pub struct FakePlatform {
    roles: Mutex<HashMap<PartyId, Vec<RoleId>>>,
    grants: Mutex<Vec<(PartyId, UserId, Vec<RoleId>)>>,
    deny: Mutex<bool>,
}

impl FakePlatform {
    pub fn add_roles(&self, party_id: PartyId, role_ids: &[u64]) {
        self.roles.lock().entry(party_id).or_default().extend(ids(role_ids));
    }

    pub fn deny_grants(&self, deny: bool) {
        *self.deny.lock() = deny;
    }

    pub fn grants(&self) -> Vec<(PartyId, UserId, Vec<RoleId>)> {
        self.grants.lock().clone()
    }
}

#[async_trait::async_trait]
impl RolePlatform for FakePlatform {
    async fn resolve_roles(&self, party_id: PartyId, role_ids: &[RoleId]) -> Result<Vec<Role>, PlatformError> {
        let roles = self.roles.lock();
        let existing = roles.get(&party_id).map(Vec::as_slice).unwrap_or_default();

        Ok(role_ids
            .iter()
            .filter(|id| existing.contains(id))
            .map(|&id| Role {
                id,
                name: format!("role-{id}").into(),
            })
            .collect())
    }

    async fn grant_roles(
        &self,
        party_id: PartyId,
        user_id: UserId,
        role_ids: &[RoleId],
    ) -> Result<GrantOutcome, PlatformError> {
        if *self.deny.lock() {
            return Err(PlatformError::GrantDenied("missing permissions".to_owned()));
        }

        self.grants.lock().push((party_id, user_id, role_ids.to_vec()));

        Ok(GrantOutcome::Granted {
            granted: role_ids.to_vec(),
        })
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<RolePersistNotification>>,
    fail: Mutex<bool>,
}

impl RecordingNotifier {
    pub fn fail(&self, fail: bool) {
        *self.fail.lock() = fail;
    }

    pub fn take(&self) -> Vec<RolePersistNotification> {
        std::mem::take(&mut *self.sent.lock())
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &RolePersistNotification) -> Result<(), NotifyError> {
        if *self.fail.lock() {
            return Err(NotifyError("sink closed".to_owned()));
        }

        self.sent.lock().push(notification.clone());

        Ok(())
    }
}
