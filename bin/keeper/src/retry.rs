use std::time::Duration;

use role_persist::{event::MemberEvent, PersistenceReactor};

/// How often a retryable failure is attempted again before the event is dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl RetryPolicy {
    pub const NEVER: RetryPolicy = RetryPolicy {
        attempts: 0,
        backoff: Duration::ZERO,
    };
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Runs one event through the reactor, returning whether it was eventually handled.
pub async fn handle_with_retry(reactor: &PersistenceReactor, event: &MemberEvent, policy: RetryPolicy) -> bool {
    let mut attempt = 0;

    loop {
        let err = match reactor.handle(event).await {
            Ok(_) => return true,
            Err(e) => e,
        };

        if err.is_retryable() && attempt < policy.attempts {
            attempt += 1;
            log::warn!("Retrying event for {} ({attempt}/{}): {err}", event.key(), policy.attempts);
            tokio::time::sleep(policy.backoff).await;
            continue;
        }

        match err.is_fatal() {
            true => log::error!("Persisted roles diverged while processing {event:?}: {err}"),
            false => log::error!("Error processing member event: {event:?} {err}"),
        }

        return false;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use role_persist::store::MemoryRoleStore;

    use super::*;
    use crate::test_support::{key, reactor, record, roles, sf};

    fn toggle(user: u64, role_ids: &[u64]) -> MemberEvent {
        MemberEvent::ToggleRequested {
            party_id: sf(1),
            user_id: sf(user),
            actor_id: None,
            role_ids: role_ids.iter().copied().map(sf).collect(),
        }
    }

    #[tokio::test]
    async fn unavailable_store_fails_after_retries() {
        let store = Arc::new(MemoryRoleStore::with_records([record(1, 2, &[10])]));
        let reactor = reactor(store.clone()).await;

        store.set_unavailable(true);

        let policy = RetryPolicy {
            attempts: 2,
            backoff: Duration::from_millis(1),
        };

        assert!(!handle_with_retry(&reactor, &toggle(2, &[11]), policy).await);

        // joins only read the cache
        let joined = MemberEvent::Joined {
            party_id: sf(1),
            user_id: sf(2),
        };
        assert!(handle_with_retry(&reactor, &joined, policy).await);

        store.set_unavailable(false);
        assert_eq!(store.get(&key(1, 2)), Some(roles(&[10])));
        assert_eq!(reactor.service().get(&key(1, 2)).await, Some(roles(&[10])));
    }

    #[tokio::test]
    async fn recovered_store_succeeds_on_retry() {
        let store = Arc::new(MemoryRoleStore::with_records([record(1, 2, &[10])]));
        let reactor = reactor(store.clone()).await;

        store.set_unavailable(true);

        let recover = store.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            recover.set_unavailable(false);
        });

        let policy = RetryPolicy {
            attempts: 50,
            backoff: Duration::from_millis(5),
        };

        assert!(handle_with_retry(&reactor, &toggle(2, &[11]), policy).await);
        assert_eq!(store.get(&key(1, 2)), Some(roles(&[10, 11])));
    }

    #[tokio::test]
    async fn never_policy_does_not_retry() {
        let store = Arc::new(MemoryRoleStore::default());
        let reactor = reactor(store.clone()).await;

        store.set_unavailable(true);

        assert!(!handle_with_retry(&reactor, &toggle(2, &[10]), RetryPolicy::NEVER).await);
        assert!(reactor.service().get(&key(1, 2)).await.is_none());
    }
}
