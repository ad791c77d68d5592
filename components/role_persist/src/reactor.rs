use std::sync::Arc;

use crate::error::Error;
use crate::event::MemberEvent;
use crate::models::{Actor, PersistKey, Role, RolePersistNotification, ToggleOutcome};
use crate::platform::{GrantOutcome, Notifier, RolePlatform};
use crate::service::RolePersistService;
use crate::sf::{PartyId, RoleId, UserId};
use crate::toggle::removed_roles;

/// What happened when a member rejoined
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The member has no persisted roles
    NotTracked,
    /// Every persisted role has since been deleted from the party
    NothingToGrant,
    Granted { roles: Vec<RoleId> },
    /// The grant was rejected or only partially applied. The record is untouched.
    GrantFailed,
}

/// Applies persisted roles on rejoin and keeps them in step with role edits.
pub struct PersistenceReactor {
    service: Arc<RolePersistService>,
    platform: Arc<dyn RolePlatform>,
    notifier: Arc<dyn Notifier>,
}

impl PersistenceReactor {
    pub fn new(
        service: Arc<RolePersistService>,
        platform: Arc<dyn RolePlatform>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        PersistenceReactor {
            service,
            platform,
            notifier,
        }
    }

    pub fn service(&self) -> &Arc<RolePersistService> {
        &self.service
    }

    /// Event entry point, returning the toggle outcome when the event ran a toggle
    pub async fn handle(&self, event: &MemberEvent) -> Result<Option<ToggleOutcome>, Error> {
        match *event {
            MemberEvent::Joined { party_id, user_id } => {
                self.on_member_joined(party_id, user_id).await;
                Ok(None)
            }
            MemberEvent::RolesChanged {
                party_id,
                user_id,
                ref before,
                ref after,
            } => self.on_member_roles_changed(party_id, user_id, before, after).await,
            MemberEvent::ToggleRequested {
                party_id,
                user_id,
                actor_id,
                ref role_ids,
            } => {
                let actor = match actor_id {
                    Some(id) => Actor::User(id),
                    None => Actor::System,
                };

                self.request_toggle(party_id, user_id, role_ids, actor).await.map(Some)
            }
        }
    }

    /// Grants whichever persisted roles still exist. Never fails, problems are logged.
    pub async fn on_member_joined(&self, party_id: PartyId, user_id: UserId) -> JoinOutcome {
        let key = PersistKey::new(party_id, user_id);

        let Some(persisted) = self.service.get(&key).await else {
            return JoinOutcome::NotTracked;
        };

        let existing = match self.platform.resolve_roles(party_id, persisted.as_slice()).await {
            Ok(roles) => roles,
            Err(e) => {
                log::warn!("Unable to resolve persisted roles for {key}: {e}");
                return JoinOutcome::GrantFailed;
            }
        };

        if existing.len() < persisted.len() {
            log::debug!("Skipping {} stale persisted role(s) for {key}", persisted.len() - existing.len());
        }

        if existing.is_empty() {
            return JoinOutcome::NothingToGrant;
        }

        let ids: Vec<RoleId> = existing.iter().map(|role| role.id).collect();

        match self.platform.grant_roles(party_id, user_id, &ids).await {
            Ok(GrantOutcome::Granted { granted }) => {
                log::debug!("Reapplied {} persisted role(s) to {key}", granted.len());
                JoinOutcome::Granted { roles: granted }
            }
            Ok(GrantOutcome::Partial { granted, missing }) => {
                log::warn!(
                    "Partially reapplied persisted roles to {key}: {} granted, {} failed",
                    granted.len(),
                    missing.len()
                );
                JoinOutcome::GrantFailed
            }
            Err(e) => {
                log::warn!("Unable to reapply persisted roles to {key}: {e}");
                JoinOutcome::GrantFailed
            }
        }
    }

    /// Toggles every role the member lost. Gained roles never change persistence.
    pub async fn on_member_roles_changed(
        &self,
        party_id: PartyId,
        user_id: UserId,
        before: &[RoleId],
        after: &[RoleId],
    ) -> Result<Option<ToggleOutcome>, Error> {
        let removed = removed_roles(before, after);

        if removed.is_empty() {
            return Ok(None);
        }

        self.apply(PersistKey::new(party_id, user_id), &removed, Actor::System)
            .await
            .map(Some)
    }

    /// The administrator command path. Role eligibility is already checked by the caller.
    pub async fn request_toggle(
        &self,
        party_id: PartyId,
        user_id: UserId,
        role_ids: &[RoleId],
        actor: Actor,
    ) -> Result<ToggleOutcome, Error> {
        self.apply(PersistKey::new(party_id, user_id), role_ids, actor).await
    }

    async fn apply(&self, key: PersistKey, requested: &[RoleId], actor: Actor) -> Result<ToggleOutcome, Error> {
        let commit = self.service.toggle(key, requested).await?;

        // names are for display only, the commit already happened
        let names = match commit.roles.is_empty() {
            true => Vec::new(),
            false => match self.platform.resolve_roles(key.party_id, commit.roles.as_slice()).await {
                Ok(roles) => roles.into_iter().map(|Role { name, .. }| name).collect(),
                Err(e) => {
                    log::warn!("Unable to resolve role names for {key}: {e}");
                    Vec::new()
                }
            },
        };

        let outcome = ToggleOutcome {
            key,
            roles: commit.roles,
            names,
            change: commit.change,
        };

        let notification = RolePersistNotification {
            party_id: key.party_id,
            user_id: key.user_id,
            actor,
            roles: outcome.names.clone(),
            removed: outcome.was_deleted(),
        };

        if let Err(e) = self.notifier.notify(&notification).await {
            log::debug!("Dropped role persist notification for {key}: {e}");
        }

        Ok(outcome)
    }
}
