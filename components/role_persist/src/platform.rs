//! Collaborators the core consumes but does not own.

use crate::error::{NotifyError, PlatformError};
use crate::models::{Role, RolePersistNotification};
use crate::sf::{PartyId, RoleId, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantOutcome {
    Granted { granted: Vec<RoleId> },
    /// Some roles could not be granted, the rest were
    Partial { granted: Vec<RoleId>, missing: Vec<RoleId> },
}

#[async_trait::async_trait]
pub trait RolePlatform: Send + Sync {
    /// Returns the subset of `ids` that still exist in the party, in request order.
    async fn resolve_roles(&self, party_id: PartyId, ids: &[RoleId]) -> Result<Vec<Role>, PlatformError>;

    /// Grants all of `ids` to the member in one batch.
    async fn grant_roles(&self, party_id: PartyId, user_id: UserId, ids: &[RoleId])
        -> Result<GrantOutcome, PlatformError>;
}

/// Decides which parties get role persistence at all.
pub trait Eligibility: Send + Sync {
    fn is_eligible(&self, party_id: PartyId) -> bool;
}

impl<F> Eligibility for F
where
    F: Fn(PartyId) -> bool + Send + Sync,
{
    fn is_eligible(&self, party_id: PartyId) -> bool {
        self(party_id)
    }
}

pub struct AllParties;

impl Eligibility for AllParties {
    fn is_eligible(&self, _: PartyId) -> bool {
        true
    }
}

/// Side-channel told about every committed toggle. Failures never affect the toggle.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &RolePersistNotification) -> Result<(), NotifyError>;
}
