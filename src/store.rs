//! A minimal state container.
//!
//! A [`Reducer`] owns the state transitions, and every dispatched
//! action is then handed to the registered [`Middleware`] in order.  The server creates one [`Store`]
//! per request; the client creates one at startup, seeded from the
//! hydration snapshot.

use std::{
    fmt,
    sync::{Arc, PoisonError, RwLock},
};

use serde::{de::DeserializeOwned, Serialize};

/// State transitions for a [`Store`].
pub trait Reducer: Send + Sync + 'static {
    type State: Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static;
    type Action: Clone + fmt::Debug + Send + Sync + 'static;

    fn reduce(&self, state: &mut Self::State, action: &Self::Action);
}

/// Observes actions after the reducer has applied them.
pub trait Middleware<R: Reducer>: Send + Sync {
    fn on_dispatch(&self, action: &R::Action, state: &R::State);
}

/// Shared handle to a state container.
pub struct Store<R: Reducer> {
    inner: Arc<StoreInner<R>>,
}

struct StoreInner<R: Reducer> {
    reducer: R,
    state: RwLock<R::State>,
    middleware: Vec<Arc<dyn Middleware<R>>>,
}

impl<R: Reducer> Clone for Store<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R: Reducer> Store<R> {
    /// Creates an empty store with no middleware.
    pub fn new(reducer: R) -> Self {
        Self::with_state(reducer, R::State::default(), Vec::new())
    }

    /// Creates a store seeded with `state` and the given middleware
    /// pipeline.
    pub fn with_state(
        reducer: R,
        state: R::State,
        middleware: Vec<Arc<dyn Middleware<R>>>,
    ) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                reducer,
                state: RwLock::new(state),
                middleware,
            }),
        }
    }

    /// Returns a copy of the current state.
    pub fn get_state(&self) -> R::State {
        self.select(Clone::clone)
    }

    /// Projects a value out of the current state.
    pub fn select<T>(&self, f: impl FnOnce(&R::State) -> T) -> T {
        let state = self
            .inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        f(&state)
    }

    /// Applies `action` and notifies the middleware pipeline.
    ///
    /// The write lock is released before middleware run, so middleware
    /// may read from or dispatch to this store.
    pub fn dispatch(&self, action: R::Action) {
        let snapshot = {
            let mut state = self
                .inner
                .state
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            self.inner.reducer.reduce(&mut state, &action);
            if self.inner.middleware.is_empty() {
                return;
            }
            state.clone()
        };
        for middleware in &self.inner.middleware {
            middleware.on_dispatch(&action, &snapshot);
        }
    }
}

impl<R: Reducer> fmt::Debug for Store<R>
where
    R::State: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.select(|state| {
            f.debug_struct("Store")
                .field("state", state)
                .field("middleware", &self.inner.middleware.len())
                .finish()
        })
    }
}
