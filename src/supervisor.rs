//! # Per-request supervision of background workflows.
//!
//! Background tasks started while rendering (saga watchers, component
//! subscriptions) must not outlive the request that started them.  Every
//! such task is spawned through the request's [`Supervisor`], which owns
//! the task handles and a request-wide [`CancellationToken`].
//!
//! ```text
//! spawn(name, f) ──► f(child_token) ──► JoinSet
//!
//! terminate()   ──► token.cancel(), further spawns refused
//! stopped()     ──► join all within grace:
//!                     ├─ all joined          → Ok(StopReport { stalled: [] })
//!                     ├─ a task failed       → Err(TaskError)
//!                     └─ grace exceeded      → remaining tasks aborted,
//!                                              Ok(StopReport { stalled: names })
//! ```

use std::{
    collections::HashMap,
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex, MutexGuard, PoisonError,
    },
    time::Duration,
};

use futures::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

type TaskOutput = (u64, String, Result<(), TaskError>);

/// Outcome of [`Supervisor::stopped`] when no task failed.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StopReport {
    /// Tasks that were still running when the grace period ran out.
    pub stalled: Vec<String>,
}

impl StopReport {
    pub fn is_clean(&self) -> bool {
        self.stalled.is_empty()
    }
}

/// Owns the background tasks of one request.
pub struct Supervisor {
    token: CancellationToken,
    grace: Option<Duration>,
    terminated: AtomicBool,
    next_id: AtomicU64,
    tasks: Mutex<Tasks>,
}

#[derive(Default)]
struct Tasks {
    set: JoinSet<TaskOutput>,
    running: HashMap<u64, String>,
}

impl Supervisor {
    /// Creates a supervisor whose [`stopped`](Self::stopped) waits at most
    /// `grace`, or without bound when `None`.
    pub fn new(grace: Option<Duration>) -> Self {
        Self {
            token: CancellationToken::new(),
            grace,
            terminated: AtomicBool::new(false),
            next_id: AtomicU64::new(0),
            tasks: Mutex::new(Tasks::default()),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawns a supervised task.
    ///
    /// The task receives a child of the request token, cancelled by
    /// [`terminate`](Self::terminate).  Returns `false` without running
    /// `f` once the supervisor has been terminated.
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn<F, Fut>(&self, name: impl Into<String>, f: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        let name = name.into();
        if self.is_terminated() {
            tracing::debug!(task = name.as_str(), "ssr.supervisor.spawn_refused");
            return false;
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let fut = f(self.token.child_token());
        let mut tasks = self.tasks();
        tracing::trace!(task = name.as_str(), running = tasks.running.len(), "ssr.supervisor.spawn");
        tasks.running.insert(id, name.clone());
        tasks.set.spawn(async move {
            let result = match AssertUnwindSafe(fut).catch_unwind().await {
                Ok(result) => result,
                Err(_) => Err(TaskError::Aborted {
                    name: name.clone(),
                    reason: "panicked".to_string(),
                }),
            };
            (id, name, result)
        });
        true
    }

    /// Asks every task to wind down and refuses new ones.
    pub fn terminate(&self) {
        if !self.terminated.swap(true, Ordering::AcqRel) {
            tracing::debug!(running = self.running(), "ssr.supervisor.terminate");
            self.token.cancel();
        }
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::Acquire)
    }

    /// Number of tasks not yet joined.
    pub fn running(&self) -> usize {
        self.tasks().running.len()
    }

    /// Waits for every spawned task to finish.
    ///
    /// Fails fast with the first task error.  Tasks still running after
    /// the grace period are aborted and named in the report.
    pub async fn stopped(&self) -> Result<StopReport, TaskError> {
        let Tasks { mut set, mut running } = std::mem::take(&mut *self.tasks());

        let drain = async {
            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((id, name, result)) => {
                        running.remove(&id);
                        if let Err(err) = result {
                            tracing::error!(task = name.as_str(), error = %err, "ssr.supervisor.task_failed");
                            return Err(err);
                        }
                        tracing::trace!(task = name.as_str(), "ssr.supervisor.task_stopped");
                    }
                    Err(err) => {
                        tracing::warn!(error = %err, "ssr.supervisor.join_failed");
                    }
                }
            }
            Ok(())
        };

        let outcome = match self.grace {
            Some(grace) => tokio::time::timeout(grace, drain).await.ok(),
            None => Some(drain.await),
        };

        match outcome {
            Some(result) => {
                result?;
                Ok(StopReport::default())
            }
            None => {
                set.abort_all();
                let mut stalled: Vec<String> = running.into_values().collect();
                stalled.sort_unstable();
                tracing::warn!(
                    grace = ?self.grace,
                    stalled = ?stalled,
                    "ssr.supervisor.grace_exceeded"
                );
                Ok(StopReport { stalled })
            }
        }
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
