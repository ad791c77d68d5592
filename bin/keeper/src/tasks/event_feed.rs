use std::sync::atomic::{AtomicI64, Ordering};

use role_persist::{
    event::{dispatch, MemberEvent},
    platform::Eligibility,
    PartyId, PersistenceReactor, RoleId, UserId,
};
use task_runner::{retry_fn_task, TaskRunner};

use crate::error::Error;
use crate::retry::{handle_with_retry, RetryPolicy};
use crate::state::{KeeperState, CURSOR_UNLOADED};

/// Rows read per poll. A full batch is followed by another poll right away.
const BATCH_SIZE: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i16)]
pub enum EventCode {
    MemberJoined = 1,
    MemberRolesChanged = 2,
    ToggleRequested = 3,
}

impl TryFrom<i16> for EventCode {
    type Error = Error;

    fn try_from(code: i16) -> Result<Self, Error> {
        Ok(match code {
            1 => EventCode::MemberJoined,
            2 => EventCode::MemberRolesChanged,
            3 => EventCode::ToggleRequested,
            _ => return Err(Error::InvalidEvent(format!("unknown event code {code}"))),
        })
    }
}

/// The columns of one `lantern.role_persist_events` row
#[derive(Debug, Default, Clone)]
pub struct RawEvent {
    pub counter: i64,
    pub code: i16,
    pub party_id: Option<PartyId>,
    pub user_id: Option<UserId>,
    pub actor_id: Option<UserId>,
    pub before_roles: Option<Vec<RoleId>>,
    pub after_roles: Option<Vec<RoleId>>,
    pub role_ids: Option<Vec<RoleId>>,
}

impl TryFrom<RawEvent> for MemberEvent {
    type Error = Error;

    fn try_from(raw: RawEvent) -> Result<MemberEvent, Error> {
        let code = EventCode::try_from(raw.code)?;

        let (Some(party_id), Some(user_id)) = (raw.party_id, raw.user_id) else {
            return Err(Error::InvalidEvent(format!("event {} is missing its member", raw.counter)));
        };

        Ok(match code {
            EventCode::MemberJoined => MemberEvent::Joined { party_id, user_id },
            EventCode::MemberRolesChanged => MemberEvent::RolesChanged {
                party_id,
                user_id,
                before: raw.before_roles.unwrap_or_default(),
                after: raw.after_roles.unwrap_or_default(),
            },
            EventCode::ToggleRequested => MemberEvent::ToggleRequested {
                party_id,
                user_id,
                actor_id: raw.actor_id,
                role_ids: raw.role_ids.unwrap_or_default(),
            },
        })
    }
}

/// Where the feed reads events and keeps its cursor
#[async_trait::async_trait]
pub trait EventSource: Send + Sync {
    /// The persisted cursor, or the newest event if none was saved yet
    async fn load_cursor(&self) -> Result<i64, Error>;

    /// Up to `limit` events after `after`, oldest first
    async fn fetch(&self, after: i64, limit: usize) -> Result<Vec<RawEvent>, Error>;

    async fn save_cursor(&self, counter: i64) -> Result<(), Error>;
}

#[async_trait::async_trait]
impl EventSource for db::Client {
    async fn load_cursor(&self) -> Result<i64, Error> {
        let row = self
            .query_opt_cached(|| "SELECT counter FROM lantern.role_persist_cursor WHERE id = 1", &[])
            .await?;

        if let Some(row) = row {
            return Ok(row.try_get(0)?);
        }

        let row = self
            .query_one_cached(|| "SELECT coalesce(max(counter), 0) FROM lantern.role_persist_events", &[])
            .await?;

        let newest: i64 = row.try_get(0)?;

        self.save_cursor(newest).await?;

        Ok(newest)
    }

    async fn fetch(&self, after: i64, limit: usize) -> Result<Vec<RawEvent>, Error> {
        let limit = limit as i64;

        let rows = self
            .query_cached(
                || {
                    "SELECT counter, code, party_id, user_id, actor_id, before_roles, after_roles, role_ids \
                     FROM lantern.role_persist_events WHERE counter > $1 ORDER BY counter ASC LIMIT $2"
                },
                &[&after, &limit],
            )
            .await?;

        let mut events = Vec::with_capacity(rows.len());

        for row in rows {
            events.push(RawEvent {
                counter: row.try_get(0)?,
                code: row.try_get(1)?,
                party_id: row.try_get(2)?,
                user_id: row.try_get(3)?,
                actor_id: row.try_get(4)?,
                before_roles: row.try_get(5)?,
                after_roles: row.try_get(6)?,
                role_ids: row.try_get(7)?,
            });
        }

        Ok(events)
    }

    async fn save_cursor(&self, counter: i64) -> Result<(), Error> {
        self.execute_cached(
            || {
                "INSERT INTO lantern.role_persist_cursor (id, counter) VALUES (1, $1) \
                 ON CONFLICT (id) DO UPDATE SET counter = EXCLUDED.counter"
            },
            &[&counter],
        )
        .await?;

        Ok(())
    }
}

pub fn add_event_feed_task(state: &KeeperState, runner: &TaskRunner) {
    let backoff = state.config.persist.retry_backoff;

    runner.add(retry_fn_task(state.clone(), backoff, |mut alive, state| async move {
        // if the task has never run before, resume from the persisted cursor,
        // or from the newest event if there is none
        if state.last_event.load(Ordering::SeqCst) == CURSOR_UNLOADED {
            let cursor = state.db.load_cursor().await?;

            log::info!("Resuming role persist events after {cursor}");
            state.last_event.store(cursor, Ordering::SeqCst);
        }

        let feed = Feed {
            source: &state.db,
            reactor: &state.reactor,
            eligibility: &state.eligibility,
            policy: state.config.persist.retry_policy(),
            cursor: &state.last_event,
        };

        let mut interval = tokio::time::interval(state.config.persist.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = alive.changed() => break,
                _ = interval.tick() => {},
            }

            // an in-flight batch always completes before shutdown is noticed
            while feed.poll_once().await? == BATCH_SIZE {
                if !*alive.borrow() {
                    break;
                }
            }
        }

        Ok::<(), Error>(())
    }));
}

pub struct Feed<'a> {
    pub source: &'a dyn EventSource,
    pub reactor: &'a PersistenceReactor,
    pub eligibility: &'a dyn Eligibility,
    pub policy: RetryPolicy,

    /// Counter of the last event handled, kept ahead of the persisted cursor
    pub cursor: &'a AtomicI64,
}

impl Feed<'_> {
    /// Handles the next batch of events, returning how many rows were read.
    ///
    /// Only a failed read is an error. Once a batch is dispatched the cursor
    /// moves past it even if saving the cursor fails.
    pub async fn poll_once(&self) -> Result<usize, Error> {
        let last_event = self.cursor.load(Ordering::SeqCst);

        let rows = self.source.fetch(last_event, BATCH_SIZE).await?;
        let read = rows.len();

        if read == 0 {
            return Ok(0);
        }

        let mut latest_event = last_event;
        let mut events = Vec::with_capacity(read);
        let mut skipped = 0;

        for raw in rows {
            latest_event = raw.counter;

            match MemberEvent::try_from(raw) {
                Ok(event) if self.eligibility.is_eligible(event.party_id()) => events.push(event),
                Ok(_) => skipped += 1,
                Err(e) => {
                    log::warn!("Skipping event {latest_event}: {e}");
                    skipped += 1;
                }
            }
        }

        let (reactor, policy) = (self.reactor, self.policy);

        let stats = dispatch(events, |event| async move { handle_with_retry(reactor, &event, policy).await }).await;

        log::debug!(
            "Processed role persist events up to {latest_event}: {} handled, {} failed, {skipped} skipped",
            stats.handled,
            stats.failed,
        );

        // a dispatched batch is never replayed
        self.cursor.store(latest_event, Ordering::SeqCst);

        if let Err(e) = self.source.save_cursor(latest_event).await {
            log::warn!("Error saving role persist cursor {latest_event}: {e}");
        }

        Ok(read)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    use parking_lot::Mutex;
    use role_persist::{platform::AllParties, store::MemoryRoleStore};

    use super::*;
    use crate::test_support::{key, reactor, record, roles, sf};

    /// Event log held in memory, with a cursor that can refuse to save
    #[derive(Default)]
    struct MemorySource {
        events: Mutex<Vec<RawEvent>>,
        saved: Mutex<Option<i64>>,
        fail_saves: AtomicBool,
    }

    #[async_trait::async_trait]
    impl EventSource for MemorySource {
        async fn load_cursor(&self) -> Result<i64, Error> {
            Ok(self.saved.lock().unwrap_or(0))
        }

        async fn fetch(&self, after: i64, limit: usize) -> Result<Vec<RawEvent>, Error> {
            Ok(self
                .events
                .lock()
                .iter()
                .filter(|raw| raw.counter > after)
                .take(limit)
                .cloned()
                .collect())
        }

        async fn save_cursor(&self, counter: i64) -> Result<(), Error> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(Error::DbError(db::ClientError::Disconnected));
            }

            *self.saved.lock() = Some(counter);
            Ok(())
        }
    }

    fn toggle_row(counter: i64, party: u64, user: u64, role_ids: &[u64]) -> RawEvent {
        RawEvent {
            counter,
            code: EventCode::ToggleRequested as i16,
            party_id: Some(sf(party)),
            user_id: Some(sf(user)),
            role_ids: Some(role_ids.iter().copied().map(sf).collect()),
            ..RawEvent::default()
        }
    }

    #[tokio::test]
    async fn failed_cursor_save_does_not_replay_batch() {
        let store = Arc::new(MemoryRoleStore::default());
        let reactor = reactor(store.clone()).await;

        let source = MemorySource::default();
        source.events.lock().push(toggle_row(1, 1, 2, &[10]));
        source.fail_saves.store(true, Ordering::SeqCst);

        let cursor = AtomicI64::new(0);
        let feed = Feed {
            source: &source,
            reactor: &reactor,
            eligibility: &AllParties,
            policy: RetryPolicy::NEVER,
            cursor: &cursor,
        };

        assert_eq!(feed.poll_once().await.unwrap(), 1);
        assert_eq!(cursor.load(Ordering::SeqCst), 1);
        assert_eq!(*source.saved.lock(), None);

        // a second pass over the same toggle would undo it
        assert_eq!(feed.poll_once().await.unwrap(), 0);
        assert_eq!(store.get(&key(1, 2)), Some(roles(&[10])));

        source.fail_saves.store(false, Ordering::SeqCst);
        source.events.lock().push(toggle_row(2, 1, 2, &[11]));

        assert_eq!(feed.poll_once().await.unwrap(), 1);
        assert_eq!(*source.saved.lock(), Some(2));
        assert_eq!(store.get(&key(1, 2)), Some(roles(&[10, 11])));
    }

    #[tokio::test]
    async fn skipped_rows_still_advance_cursor() {
        let store = Arc::new(MemoryRoleStore::with_records([record(1, 2, &[10])]));
        let reactor = reactor(store.clone()).await;

        let source = MemorySource::default();
        source.events.lock().extend([
            toggle_row(5, 3, 2, &[10]),
            RawEvent {
                counter: 6,
                code: 99,
                ..RawEvent::default()
            },
            toggle_row(7, 1, 2, &[10]),
        ]);

        let eligibility = |party: PartyId| party == sf(1);

        let cursor = AtomicI64::new(4);
        let feed = Feed {
            source: &source,
            reactor: &reactor,
            eligibility: &eligibility,
            policy: RetryPolicy::NEVER,
            cursor: &cursor,
        };

        assert_eq!(feed.poll_once().await.unwrap(), 3);
        assert_eq!(cursor.load(Ordering::SeqCst), 7);
        assert_eq!(*source.saved.lock(), Some(7));

        // only the eligible toggle ran, removing the last role
        assert_eq!(store.get(&key(1, 2)), None);
        assert_eq!(store.get(&key(3, 2)), None);
    }

    #[tokio::test]
    async fn reads_at_most_one_batch() {
        let store = Arc::new(MemoryRoleStore::default());
        let reactor = reactor(store).await;

        let source = MemorySource::default();
        let total = BATCH_SIZE as i64 + 1;
        source.events.lock().extend((1..=total).map(|counter| RawEvent {
            counter,
            code: 99,
            ..RawEvent::default()
        }));

        let cursor = AtomicI64::new(0);
        let feed = Feed {
            source: &source,
            reactor: &reactor,
            eligibility: &AllParties,
            policy: RetryPolicy::NEVER,
            cursor: &cursor,
        };

        assert_eq!(feed.poll_once().await.unwrap(), BATCH_SIZE);
        assert_eq!(cursor.load(Ordering::SeqCst), BATCH_SIZE as i64);

        assert_eq!(feed.poll_once().await.unwrap(), 1);
        assert_eq!(*source.saved.lock(), Some(total));
    }

    #[test]
    fn maps_roles_changed_rows() {
        let raw = RawEvent {
            counter: 7,
            code: 2,
            party_id: Some(sf(1)),
            user_id: Some(sf(2)),
            before_roles: Some(vec![sf(10), sf(11)]),
            ..RawEvent::default()
        };

        assert_eq!(
            MemberEvent::try_from(raw).unwrap(),
            MemberEvent::RolesChanged {
                party_id: sf(1),
                user_id: sf(2),
                before: vec![sf(10), sf(11)],
                after: vec![],
            }
        );
    }

    #[test]
    fn maps_toggle_requests() {
        let raw = RawEvent {
            code: 3,
            party_id: Some(sf(1)),
            user_id: Some(sf(2)),
            actor_id: Some(sf(9)),
            role_ids: Some(vec![sf(10)]),
            ..RawEvent::default()
        };

        assert_eq!(
            MemberEvent::try_from(raw).unwrap(),
            MemberEvent::ToggleRequested {
                party_id: sf(1),
                user_id: sf(2),
                actor_id: Some(sf(9)),
                role_ids: vec![sf(10)],
            }
        );
    }

    #[test]
    fn rejects_bad_rows() {
        let unknown = RawEvent {
            code: 99,
            party_id: Some(sf(1)),
            user_id: Some(sf(2)),
            ..RawEvent::default()
        };
        assert!(matches!(MemberEvent::try_from(unknown), Err(Error::InvalidEvent(_))));

        let memberless = RawEvent {
            code: 1,
            party_id: Some(sf(1)),
            ..RawEvent::default()
        };
        assert!(matches!(MemberEvent::try_from(memberless), Err(Error::InvalidEvent(_))));
    }
}
