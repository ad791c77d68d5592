use task_runner::TaskRunner;

use crate::state::KeeperState;

pub mod event_cleanup;
pub mod event_feed;
pub mod lock_cleanup;

pub fn add_tasks(state: &KeeperState, runner: &TaskRunner) {
    event_feed::add_event_feed_task(state, runner);
    event_cleanup::add_event_cleanup_task(state, runner);
    lock_cleanup::add_lock_cleanup_task(state, runner);
}
