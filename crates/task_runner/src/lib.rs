//! Task Runner
//!
//! Collects the long-running loops of a node (event feeds, periodic cleanups) and
//! runs them on shared state until a single shutdown signal is raised. Each task
//! observes the signal itself, so it decides where it is safe to stop.

extern crate tracing as log;

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, Stream, StreamExt};
use futures::TryStreamExt;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Duration;

/// Receiver half of the shutdown signal, `true` while the runner is alive.
pub type Alive = watch::Receiver<bool>;

pub trait Task {
    fn start(self, alive: Alive) -> JoinHandle<()>;
}

#[derive(Debug, Clone)]
#[repr(transparent)]
pub struct ShutdownSignal(Arc<watch::Sender<bool>>);

impl ShutdownSignal {
    fn new() -> Self {
        ShutdownSignal(Arc::new(watch::channel(true).0))
    }

    fn subscribe(&self) -> Alive {
        self.0.subscribe()
    }

    pub fn stop(&self) {
        // only fails when every task already exited
        if self.0.send(false).is_err() {
            log::debug!("Shutdown requested with no running tasks");
        }
    }
}

pub struct TaskRunner {
    tasks: FuturesUnordered<JoinHandle<()>>,
    alive: ShutdownSignal,
}

impl Default for TaskRunner {
    fn default() -> Self {
        TaskRunner::new()
    }
}

impl TaskRunner {
    pub fn new() -> Self {
        TaskRunner {
            tasks: FuturesUnordered::new(),
            alive: ShutdownSignal::new(),
        }
    }

    pub fn add(&self, task: impl Task) {
        self.tasks.push(task.start(self.alive.subscribe()))
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn stop(&self) {
        self.alive.stop();
    }

    pub fn signal(&self) -> ShutdownSignal {
        self.alive.clone()
    }

    /// Waits for every task to finish. Tasks are never aborted, so an iteration
    /// in progress when the signal is raised runs to completion.
    pub async fn wait(self) -> Result<(), JoinError> {
        self.try_fold((), |_, _| futures::future::ok(())).await
    }
}

impl Stream for TaskRunner {
    type Item = Result<(), JoinError>;

    #[inline]
    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.tasks.poll_next_unpin(cx)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.tasks.size_hint()
    }
}

pub fn fn_task<S, T, F>(state: S, f: T) -> impl Task
where
    T: FnOnce(Alive, S) -> F + Send + 'static,
    F: Future<Output = ()> + Send + 'static,
    S: Send + 'static,
{
    struct AsyncTask<S, T>(S, T);

    impl<S, T, F> Task for AsyncTask<S, T>
    where
        T: FnOnce(Alive, S) -> F + Send + 'static,
        F: Future<Output = ()> + Send + 'static,
        S: Send + 'static,
    {
        fn start(self, alive: Alive) -> JoinHandle<()> {
            tokio::task::spawn(async move {
                let AsyncTask(state, f) = self;
                f(alive, state).await
            })
        }
    }

    AsyncTask(state, f)
}

pub fn interval_fn_task<S, T, F>(state: S, interval: Duration, f: T) -> impl Task
where
    T: Fn(tokio::time::Instant, &S) -> F + Send + Sync + 'static,
    F: Future<Output = ()> + Send + 'static,
    S: Send + Sync + 'static,
{
    fn_task(state, move |mut alive, state| async move {
        let mut interval = tokio::time::interval(interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        while *alive.borrow_and_update() {
            tokio::select! {
                biased;
                _ = alive.changed() => break,
                t = interval.tick() => f(t, &state).await,
            }
        }
    })
}

/// Runs `f` until it returns `Ok`, restarting it after `backoff` whenever it fails.
///
/// Used for loops that hold external resources, like a database cursor, where
/// the simplest recovery is to start over from persisted state.
pub fn retry_fn_task<S, T, F, E>(state: S, backoff: Duration, f: T) -> impl Task
where
    T: Fn(Alive, S) -> F + Send + 'static,
    F: Future<Output = Result<(), E>> + Send + 'static,
    E: Display + Send + 'static,
    S: Clone + Send + 'static,
{
    fn_task(state, move |mut alive, state| async move {
        while *alive.borrow_and_update() {
            match f(alive.clone(), state.clone()).await {
                Ok(()) => break,
                Err(e) => {
                    log::error!("Task failed, restarting in {backoff:?}: {e}");

                    tokio::select! {
                        biased;
                        _ = alive.changed() => break,
                        _ = tokio::time::sleep(backoff) => {}
                    }
                }
            }
        }
    })
}
