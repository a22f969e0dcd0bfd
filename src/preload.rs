//! Registration of data fetches during the collecting render pass.
//!
//! A [`PreloadRegistry`] is created by the renderer for exactly one
//! request and handed to every component through
//! [`RenderCx`](crate::RenderCx).  Components never see a registry on the
//! client, which is what makes the triggers safe to call from code that
//! runs on both sides: with no registry, or with a registry already
//! marked done, a trigger does nothing.
//!
//! Both trigger forms funnel into [`PreloadRegistry::register`]:
//!
//! ```
//! use ssr_preload::preload::{preloader, use_preloader, PreloadRegistry};
//!
//! let registry = PreloadRegistry::new();
//!
//! // The declarative form renders nothing.
//! let markup = preloader(Some(&registry), || async { Ok(()) });
//! assert_eq!(markup, "");
//!
//! // The imperative form is called for its effect only.
//! use_preloader(Some(&registry), || async { Ok(()) });
//! assert_eq!(registry.pending_len(), 2);
//!
//! // Without a registry nothing is registered.
//! use_preloader(None, || async { Ok(()) });
//! assert_eq!(registry.pending_len(), 2);
//! ```
//!
//! # Thunks and saga watchers
//!
//! A thunk is called while the collecting pass runs, but the future it
//! returns is only polled once the pass is over, after saga watchers
//! have been told to stop.  An action meant for a watcher must therefore
//! be dispatched in the synchronous part of the thunk:
//!
//! ```ignore
//! cx.use_preloader(move || {
//!     store.dispatch(Action::GetUser(id)); // seen by the watcher
//!     futures::future::ready(Ok(()))
//! });
//! ```
//!
//! Dispatching it inside an `async move` block instead reaches the
//! watcher too late, and the render fails with
//! [`TaskError::Missed`](crate::TaskError::Missed).

use std::{
    collections::HashSet,
    fmt,
    future::Future,
    sync::{Mutex, MutexGuard, PoisonError},
};

use futures::future::{BoxFuture, FutureExt};

use crate::error::FetchError;

/// A registered, not yet awaited fetch.
pub type PreloadFuture = BoxFuture<'static, Result<(), FetchError>>;

/// Per-request collection of in-flight fetches.
#[derive(Default)]
pub struct PreloadRegistry {
    inner: Mutex<RegistryInner>,
}

#[derive(Default)]
struct RegistryInner {
    done: bool,
    pending: Vec<PreloadFuture>,
    keys: HashSet<String>,
    registered: usize,
}

impl PreloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the data for this request has been finalized.
    pub fn is_done(&self) -> bool {
        self.lock().done
    }

    /// Marks the data as finalized.  Every later registration is a no-op.
    pub fn mark_done(&self) {
        self.lock().done = true;
    }

    /// Invokes `thunk` and keeps the resulting fetch for the join,
    /// unless the registry is already done.
    ///
    /// Returns whether a fetch was issued.
    pub fn register<F, Fut>(&self, thunk: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), FetchError>> + Send + 'static,
    {
        if self.is_done() {
            return false;
        }
        // The lock is not held while the thunk runs, as the thunk may
        // itself register further fetches.
        let fetch = thunk().boxed();
        self.push(fetch);
        true
    }

    /// Like [`register`](Self::register), but a given `key` is issued at
    /// most once over the lifetime of the registry, across all
    /// collecting passes.
    pub fn register_keyed<F, Fut>(&self, key: impl Into<String>, thunk: F) -> bool
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), FetchError>> + Send + 'static,
    {
        {
            let mut inner = self.lock();
            if inner.done || !inner.keys.insert(key.into()) {
                return false;
            }
        }
        let fetch = thunk().boxed();
        self.push(fetch);
        true
    }

    fn push(&self, fetch: PreloadFuture) {
        let mut inner = self.lock();
        inner.pending.push(fetch);
        inner.registered += 1;
    }

    /// Drains the fetches registered since the last call.
    pub fn take_pending(&self) -> Vec<PreloadFuture> {
        std::mem::take(&mut self.lock().pending)
    }

    /// Number of fetches registered and not yet taken.
    pub fn pending_len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Total number of fetches ever issued through this registry.
    pub fn registered(&self) -> usize {
        self.lock().registered
    }
}

impl fmt::Debug for PreloadRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.lock();
        f.debug_struct("PreloadRegistry")
            .field("done", &inner.done)
            .field("pending", &inner.pending.len())
            .field("registered", &inner.registered)
            .finish()
    }
}

/// Declarative trigger: registers `resolve` and renders nothing.
///
/// Place the call where the marker belongs in the markup being built;
/// the returned fragment is always empty.  Actions for saga watchers go
/// in the synchronous part of `resolve` (see the [module docs](self)).
pub fn preloader<F, Fut>(registry: Option<&PreloadRegistry>, resolve: F) -> &'static str
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), FetchError>> + Send + 'static,
{
    use_preloader(registry, resolve);
    ""
}

/// Imperative trigger: registers `resolve` when running under a
/// registry that is still collecting.
///
/// `resolve` runs right away; the future it returns runs after the
/// collecting pass.  Dispatch actions meant for saga watchers before
/// returning the future.
pub fn use_preloader<F, Fut>(registry: Option<&PreloadRegistry>, resolve: F)
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<(), FetchError>> + Send + 'static,
{
    if let Some(registry) = registry {
        registry.register(resolve);
    }
}
