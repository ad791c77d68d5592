use std::fmt;

use smol_str::SmolStr;

use crate::sf::{PartyId, RoleId, UserId};

/// Identifies one member of one party, the unit of persistence and of serialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PersistKey {
    pub party_id: PartyId,
    pub user_id: UserId,
}

impl PersistKey {
    #[inline]
    pub const fn new(party_id: PartyId, user_id: UserId) -> Self {
        PersistKey { party_id, user_id }
    }
}

impl fmt::Display for PersistKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.party_id, self.user_id)
    }
}

/// Duplicate-free set of role IDs that remembers insertion order for display.
///
/// Equality ignores order.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(transparent)]
pub struct RoleSet(Vec<RoleId>);

impl RoleSet {
    pub const fn new() -> Self {
        RoleSet(Vec::new())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, id: RoleId) -> bool {
        self.0.contains(&id)
    }

    /// Removes `id` if present, otherwise appends it. Returns whether it is now present.
    pub fn flip(&mut self, id: RoleId) -> bool {
        match self.0.iter().position(|&r| r == id) {
            Some(idx) => {
                self.0.remove(idx);
                false
            }
            None => {
                self.0.push(id);
                true
            }
        }
    }

    pub fn iter(&self) -> impl ExactSizeIterator<Item = RoleId> + '_ {
        self.0.iter().copied()
    }

    #[inline]
    pub fn as_slice(&self) -> &[RoleId] {
        &self.0
    }
}

impl PartialEq for RoleSet {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|id| other.contains(id))
    }
}

impl Eq for RoleSet {}

impl FromIterator<RoleId> for RoleSet {
    fn from_iter<T: IntoIterator<Item = RoleId>>(iter: T) -> Self {
        let mut set = RoleSet::new();

        for id in iter {
            if !set.contains(id) {
                set.0.push(id);
            }
        }

        set
    }
}

impl From<Vec<RoleId>> for RoleSet {
    fn from(ids: Vec<RoleId>) -> Self {
        ids.into_iter().collect()
    }
}

impl<'de> serde::Deserialize<'de> for RoleSet {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        <Vec<RoleId> as serde::Deserialize>::deserialize(deserializer).map(RoleSet::from)
    }
}

impl<'a> IntoIterator for &'a RoleSet {
    type Item = RoleId;
    type IntoIter = std::iter::Copied<std::slice::Iter<'a, RoleId>>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter().copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePersistRecord {
    pub party_id: PartyId,
    pub user_id: UserId,
    pub roles: RoleSet,
}

impl RolePersistRecord {
    #[inline]
    pub fn key(&self) -> PersistKey {
        PersistKey::new(self.party_id, self.user_id)
    }
}

/// Who caused a change to persisted roles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum Actor {
    /// Observed from a role change made outside of an explicit request
    System,
    /// An administrator invoking the toggle command
    User(UserId),
}

/// A role as it currently exists in a party
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub id: RoleId,
    pub name: SmolStr,
}

/// What a committed toggle did to the durable store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreChange {
    Inserted,
    Updated,
    Deleted,
    /// Toggle left the persisted set as it was, nothing was written
    Unchanged,
}

/// Result of a toggle, as reported back to whoever requested it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToggleOutcome {
    pub key: PersistKey,
    pub roles: RoleSet,
    /// Names of the resulting roles that still exist, in persisted order
    pub names: Vec<SmolStr>,
    pub change: StoreChange,
}

impl ToggleOutcome {
    /// True when the member is left with no persisted roles
    #[inline]
    pub fn was_deleted(&self) -> bool {
        self.roles.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RolePersistNotification {
    pub party_id: PartyId,
    pub user_id: UserId,
    pub actor: Actor,
    pub roles: Vec<SmolStr>,
    pub removed: bool,
}
