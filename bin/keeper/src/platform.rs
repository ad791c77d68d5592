//! Postgres implementations of the collaborators the persistence core consumes.

use hashbrown::{HashMap, HashSet};
use smol_str::SmolStr;

use db::Client;
use role_persist::{
    platform::{Eligibility, GrantOutcome, Notifier, RolePlatform},
    NotifyError, PartyId, PlatformError, Role, RoleId, RolePersistNotification, UserId,
};

pub const NOTIFY_CHANNEL: &str = "role_persist";

/// Reads and grants roles in the platform's own tables
pub struct PgPlatform {
    db: Client,
}

impl PgPlatform {
    pub fn new(db: Client) -> Self {
        PgPlatform { db }
    }
}

fn unavailable(e: db::ClientError) -> PlatformError {
    PlatformError::Unavailable(e.to_string())
}

#[async_trait::async_trait]
impl RolePlatform for PgPlatform {
    async fn resolve_roles(&self, party_id: PartyId, ids: &[RoleId]) -> Result<Vec<Role>, PlatformError> {
        let rows = self
            .db
            .query_cached(
                || "SELECT roles.id, roles.name FROM lantern.roles WHERE roles.party_id = $1 AND roles.id = ANY($2)",
                &[&party_id, &ids],
            )
            .await
            .map_err(unavailable)?;

        let mut found: HashMap<RoleId, SmolStr> = HashMap::with_capacity(rows.len());

        for row in rows {
            let id: RoleId = row.try_get(0).map_err(|e| unavailable(e.into()))?;
            let name: &str = row.try_get(1).map_err(|e| unavailable(e.into()))?;

            found.insert(id, name.into());
        }

        // keep request order
        Ok(ids
            .iter()
            .filter_map(|&id| found.remove(&id).map(|name| Role { id, name }))
            .collect())
    }

    async fn grant_roles(
        &self,
        party_id: PartyId,
        user_id: UserId,
        ids: &[RoleId],
    ) -> Result<GrantOutcome, PlatformError> {
        let rows = self
            .db
            .query_cached(
                || {
                    "WITH valid AS (
                        SELECT roles.id FROM lantern.roles WHERE roles.party_id = $1 AND roles.id = ANY($3)
                    ), granted AS (
                        INSERT INTO lantern.role_members (role_id, user_id)
                        SELECT valid.id, $2 FROM valid
                        ON CONFLICT DO NOTHING
                    )
                    SELECT valid.id FROM valid"
                },
                &[&party_id, &user_id, &ids],
            )
            .await
            .map_err(|e| match e {
                // rejected by the database itself, such as a constraint on membership
                db::ClientError::Db(ref err) if err.code().is_some() => PlatformError::GrantDenied(err.to_string()),
                _ => unavailable(e),
            })?;

        let mut valid = HashSet::with_capacity(rows.len());

        for row in rows {
            valid.insert(row.try_get::<_, RoleId>(0).map_err(|e| unavailable(e.into()))?);
        }

        let (granted, missing): (Vec<RoleId>, Vec<RoleId>) = ids.iter().partition(|id| valid.contains(*id));

        Ok(match missing.is_empty() {
            true => GrantOutcome::Granted { granted },
            false => GrantOutcome::Partial { granted, missing },
        })
    }
}

/// Publishes each notification as JSON on the `role_persist` channel
pub struct PgNotifier {
    db: Client,
}

impl PgNotifier {
    pub fn new(db: Client) -> Self {
        PgNotifier { db }
    }
}

#[async_trait::async_trait]
impl Notifier for PgNotifier {
    async fn notify(&self, notification: &RolePersistNotification) -> Result<(), NotifyError> {
        let payload = serde_json::to_string(notification).map_err(|e| NotifyError(e.to_string()))?;

        self.db
            .execute_cached(|| "SELECT pg_notify($1, $2)", &[&NOTIFY_CHANNEL, &payload])
            .await
            .map_err(|e| NotifyError(e.to_string()))?;

        Ok(())
    }
}

/// Eligible parties from configuration. An empty list allows every party.
#[derive(Debug, Default, Clone)]
pub struct PartyAllowList {
    parties: HashSet<PartyId>,
}

impl PartyAllowList {
    pub fn new(parties: &[PartyId]) -> Self {
        PartyAllowList {
            parties: parties.iter().copied().collect(),
        }
    }

    pub fn is_restricted(&self) -> bool {
        !self.parties.is_empty()
    }
}

impl Eligibility for PartyAllowList {
    fn is_eligible(&self, party_id: PartyId) -> bool {
        self.parties.is_empty() || self.parties.contains(&party_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sf(id: u64) -> PartyId {
        PartyId::new(id).unwrap()
    }

    #[test]
    fn empty_allow_list_allows_everything() {
        let list = PartyAllowList::default();

        assert!(!list.is_restricted());
        assert!(list.is_eligible(sf(1)));
    }

    #[test]
    fn allow_list_filters() {
        let list = PartyAllowList::new(&[sf(1), sf(2)]);

        assert!(list.is_eligible(sf(2)));
        assert!(!list.is_eligible(sf(3)));
    }
}
