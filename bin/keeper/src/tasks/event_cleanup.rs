use std::{sync::atomic::Ordering, time::Duration};

use task_runner::{interval_fn_task, TaskRunner};

use crate::state::{KeeperState, CURSOR_UNLOADED};

pub fn add_event_cleanup_task(state: &KeeperState, runner: &TaskRunner) {
    runner.add(interval_fn_task(state.clone(), Duration::from_secs(60), |_, state| {
        let state = state.clone();

        async move {
            let cursor = state.last_event.load(Ordering::SeqCst);

            if cursor == CURSOR_UNLOADED {
                return;
            }

            log::trace!("Cleaning up role persist events");

            // never delete events the feed has yet to see
            let res = state
                .db
                .execute_cached(
                    || {
                        "DELETE FROM lantern.role_persist_events \
                         WHERE counter <= $1 AND created_at < now() - make_interval(secs => $2)"
                    },
                    &[&cursor, &state.config.persist.event_retention.as_secs_f64()],
                )
                .await;

            match res {
                Ok(0) => {}
                Ok(n) => log::debug!("Deleted {n} expired role persist events"),
                Err(e) => log::warn!("Error cleaning up role persist events: {e}"),
            }
        }
    }))
}
