use task_runner::{interval_fn_task, TaskRunner};

use crate::state::KeeperState;

pub fn add_lock_cleanup_task(state: &KeeperState, runner: &TaskRunner) {
    runner.add(interval_fn_task(
        state.clone(),
        state.config.persist.lock_cleanup_interval,
        |_, state| {
            let state = state.clone();

            async move {
                let locks = state.service().locks();
                let before = locks.len();

                locks.cleanup().await;

                log::trace!("Cleaned up {} idle member locks", before.saturating_sub(locks.len()));
            }
        },
    ))
}
