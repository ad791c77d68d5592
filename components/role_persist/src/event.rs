use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::StreamExt;
use hashbrown::HashMap;

use crate::models::PersistKey;
use crate::sf::{PartyId, RoleId, UserId};

/// Membership events the reactor responds to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MemberEvent {
    Joined {
        party_id: PartyId,
        user_id: UserId,
    },
    RolesChanged {
        party_id: PartyId,
        user_id: UserId,
        before: Vec<RoleId>,
        after: Vec<RoleId>,
    },
    /// Administrator command, already checked for permissions and role eligibility
    ToggleRequested {
        party_id: PartyId,
        user_id: UserId,
        actor_id: Option<UserId>,
        role_ids: Vec<RoleId>,
    },
}

impl MemberEvent {
    pub fn party_id(&self) -> PartyId {
        match *self {
            MemberEvent::Joined { party_id, .. }
            | MemberEvent::RolesChanged { party_id, .. }
            | MemberEvent::ToggleRequested { party_id, .. } => party_id,
        }
    }

    pub fn key(&self) -> PersistKey {
        match *self {
            MemberEvent::Joined { party_id, user_id }
            | MemberEvent::RolesChanged { party_id, user_id, .. }
            | MemberEvent::ToggleRequested { party_id, user_id, .. } => PersistKey::new(party_id, user_id),
        }
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchStats {
    pub handled: usize,
    pub failed: usize,
}

/// Runs a batch of events through `handler`, which reports whether each event was handled.
///
/// Events for different members run concurrently, events for the same member
/// run one after another in the order given.
pub async fn dispatch<H, F>(events: Vec<MemberEvent>, handler: H) -> DispatchStats
where
    H: Fn(MemberEvent) -> F,
    F: Future<Output = bool>,
{
    let mut by_key: HashMap<PersistKey, Vec<MemberEvent>> = HashMap::new();

    for event in events {
        by_key.entry(event.key()).or_default().push(event);
    }

    log::trace!("Dispatching events for {} members", by_key.len());

    let handled = AtomicUsize::new(0);
    let failed = AtomicUsize::new(0);
    let handler = &handler;

    futures::stream::iter(by_key.into_values())
        .for_each_concurrent(None, |events| {
            let (handled, failed) = (&handled, &failed);

            async move {
                for event in events {
                    match handler(event).await {
                        true => handled.fetch_add(1, Ordering::Relaxed),
                        false => failed.fetch_add(1, Ordering::Relaxed),
                    };
                }
            }
        })
        .await;

    DispatchStats {
        handled: handled.into_inner(),
        failed: failed.into_inner(),
    }
}
