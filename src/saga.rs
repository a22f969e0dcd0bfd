//! Long-running action watchers bound to one request.
//!
//! An [`ActionChannel`] sits in the store's middleware pipeline and
//! forwards every dispatched action to the watchers started through
//! [`Saga::take_every`] whose pattern matches it.  Each watcher owns an
//! unbounded queue, so no action put before the end is ever dropped.
//! Terminating the saga puts an `End` marker on every queue behind the
//! actions already there, so watchers still act on everything dispatched
//! during the collecting pass, then stop taking actions and wait for the
//! work they forked.
//!
//! An action put after the end that a watcher would have taken is
//! recorded as missed; the renderer fails the request on it.

use std::{
    future::Future,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tokio::{
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
    task::JoinSet,
};

use crate::{
    error::TaskError,
    store::{Middleware, Reducer, Store},
    supervisor::Supervisor,
};

#[derive(Clone, Debug)]
enum Signal<A> {
    Action(A),
    End,
}

struct Watcher<A> {
    name: String,
    pattern: Box<dyn Fn(&A) -> bool + Send>,
    sender: UnboundedSender<Signal<A>>,
}

struct ChannelInner<A> {
    ended: bool,
    watchers: Vec<Watcher<A>>,
    missed: Vec<TaskError>,
}

/// Forwards dispatched actions to saga watchers.
pub struct ActionChannel<A> {
    inner: Mutex<ChannelInner<A>>,
}

impl<A> Default for ActionChannel<A> {
    fn default() -> Self {
        Self {
            inner: Mutex::new(ChannelInner {
                ended: false,
                watchers: Vec::new(),
                missed: Vec::new(),
            }),
        }
    }
}

impl<A: Clone + std::fmt::Debug + Send + 'static> ActionChannel<A> {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ChannelInner<A>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn subscribe(
        &self,
        name: &str,
        pattern: impl Fn(&A) -> bool + Send + 'static,
    ) -> UnboundedReceiver<Signal<A>> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        if inner.ended {
            let _ = sender.send(Signal::End);
        }
        inner.watchers.push(Watcher {
            name: name.to_string(),
            pattern: Box::new(pattern),
            sender,
        });
        receiver
    }

    /// Sends `action` to every watcher whose pattern matches it.
    pub fn put(&self, action: A) {
        let mut inner = self.lock();
        if inner.ended {
            let names: Vec<String> = inner
                .watchers
                .iter()
                .filter(|watcher| (watcher.pattern)(&action))
                .map(|watcher| watcher.name.clone())
                .collect();
            if names.is_empty() {
                return;
            }
            tracing::warn!(watchers = ?names, ?action, "ssr.saga.after_end");
            for name in names {
                inner.missed.push(TaskError::Missed {
                    name,
                    action: format!("{action:?}"),
                });
            }
            return;
        }
        for watcher in &inner.watchers {
            if (watcher.pattern)(&action) {
                // A closed queue means the watcher already stopped.
                let _ = watcher.sender.send(Signal::Action(action.clone()));
            }
        }
    }

    /// Tells every watcher to stop taking actions.
    pub fn end(&self) {
        let mut inner = self.lock();
        if inner.ended {
            return;
        }
        inner.ended = true;
        for watcher in &inner.watchers {
            let _ = watcher.sender.send(Signal::End);
        }
    }

    pub fn is_ended(&self) -> bool {
        self.lock().ended
    }

    /// Takes the actions put after the end that a watcher would have
    /// taken, one error per watcher and action.
    pub fn take_missed(&self) -> Vec<TaskError> {
        std::mem::take(&mut self.lock().missed)
    }
}

impl<R: Reducer> Middleware<R> for ActionChannel<R::Action> {
    fn on_dispatch(&self, action: &R::Action, _state: &R::State) {
        self.put(action.clone());
    }
}

/// The store, action channel and supervisor of one request.
pub struct Saga<R: Reducer> {
    store: Store<R>,
    channel: Arc<ActionChannel<R::Action>>,
    supervisor: Supervisor,
}

impl<R: Reducer> Saga<R> {
    /// Creates a fresh store wired to a fresh action channel.
    pub fn new(reducer: R, supervisor: Supervisor) -> Self {
        Self::with_state(reducer, R::State::default(), supervisor)
    }

    /// Like [`new`](Self::new), with the store seeded from `state`.
    pub fn with_state(reducer: R, state: R::State, supervisor: Supervisor) -> Self {
        let channel = Arc::new(ActionChannel::new());
        let middleware: Arc<dyn Middleware<R>> = channel.clone();
        Self {
            store: Store::with_state(reducer, state, vec![middleware]),
            channel,
            supervisor,
        }
    }

    pub fn store(&self) -> &Store<R> {
        &self.store
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn channel(&self) -> &ActionChannel<R::Action> {
        &self.channel
    }

    /// Watches for actions matching `pattern` and forks `handler` for
    /// each of them.
    ///
    /// The watcher subscribes immediately, so actions dispatched after
    /// this call returns are never missed.  It stops on the end marker,
    /// or on cancellation of its token once its queue is drained.
    /// Returns `false` when the saga has already been terminated.
    pub fn take_every<P, H, Fut>(&self, name: &str, pattern: P, handler: H) -> bool
    where
        P: Fn(&R::Action) -> bool + Send + 'static,
        H: Fn(Store<R>, R::Action) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        if self.supervisor.is_terminated() {
            tracing::debug!(saga = name, "ssr.saga.refused");
            return false;
        }
        let mut receiver = self.channel.subscribe(name, pattern);
        let store = self.store.clone();
        let name = name.to_string();
        self.supervisor.spawn(name.clone(), move |token| async move {
            let mut forks = JoinSet::new();
            loop {
                let signal = tokio::select! {
                    biased;
                    signal = receiver.recv() => signal,
                    _ = token.cancelled() => None,
                };
                match signal {
                    Some(Signal::Action(action)) => {
                        tracing::trace!(saga = name.as_str(), ?action, "ssr.saga.fork");
                        forks.spawn(handler(store.clone(), action));
                    }
                    Some(Signal::End) | None => break,
                }
            }
            while let Some(joined) = forks.join_next().await {
                joined.map_err(|err| TaskError::Aborted {
                    name: name.clone(),
                    reason: err.to_string(),
                })??;
            }
            Ok::<(), TaskError>(())
        })
    }

    /// Ends every watcher and terminates the supervisor.
    pub fn terminate(&self) {
        self.channel.end();
        self.supervisor.terminate();
    }
}
