use std::future::Future;

use crate::{
    assets::ChunkCollector,
    error::FetchError,
    preload::{self, PreloadRegistry},
    store::{Reducer, Store},
};

#[cfg(feature = "ssr")]
mod ssr {
    pub use crate::{error::TaskError, supervisor::Supervisor};
    pub use tokio_util::sync::CancellationToken;
}
#[cfg(feature = "ssr")]
use ssr::*;

/// Everything a component may need while rendering, passed explicitly
/// down the tree.
///
/// The renderer builds one of these for each pass with the request's
/// registry attached.  Client code builds one with [`RenderCx::client`],
/// which has no registry, so the same component code runs unchanged on
/// both sides.
pub struct RenderCx<'a, R: Reducer> {
    store: &'a Store<R>,
    preload: Option<&'a PreloadRegistry>,
    chunks: Option<&'a ChunkCollector>,
    #[cfg(feature = "ssr")]
    supervisor: Option<&'a Supervisor>,
}

impl<'a, R: Reducer> RenderCx<'a, R> {
    /// A context for rendering on the server.
    #[cfg(feature = "ssr")]
    pub fn server(
        store: &'a Store<R>,
        preload: &'a PreloadRegistry,
        chunks: &'a ChunkCollector,
        supervisor: &'a Supervisor,
    ) -> Self {
        Self {
            store,
            preload: Some(preload),
            chunks: Some(chunks),
            supervisor: Some(supervisor),
        }
    }

    /// A context without a preload registry.
    pub fn client(store: &'a Store<R>) -> Self {
        Self {
            store,
            preload: None,
            chunks: None,
            #[cfg(feature = "ssr")]
            supervisor: None,
        }
    }

    pub fn store(&self) -> &'a Store<R> {
        self.store
    }

    pub fn preload(&self) -> Option<&'a PreloadRegistry> {
        self.preload
    }

    /// Whether this render is a server pass still collecting preloads.
    pub fn is_collecting(&self) -> bool {
        self.preload.is_some_and(|registry| !registry.is_done())
    }

    /// See [`preload::preloader`].
    pub fn preloader<F, Fut>(&self, resolve: F) -> &'static str
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), FetchError>> + Send + 'static,
    {
        preload::preloader(self.preload, resolve)
    }

    /// See [`preload::use_preloader`].
    pub fn use_preloader<F, Fut>(&self, resolve: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), FetchError>> + Send + 'static,
    {
        preload::use_preloader(self.preload, resolve)
    }

    /// Keyed variant of [`use_preloader`](Self::use_preloader); the same
    /// key is fetched at most once per request.
    pub fn use_preloader_keyed<F, Fut>(&self, key: impl Into<String>, resolve: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<(), FetchError>> + Send + 'static,
    {
        if let Some(registry) = self.preload {
            registry.register_keyed(key, resolve);
        }
    }

    /// Starts a background task supervised for the rest of the request.
    ///
    /// The renderer terminates the task's token before the final pass
    /// and waits for it to stop.  Returns `false` without calling `f` on
    /// the client, or once the request's supervisor has been terminated.
    #[cfg(feature = "ssr")]
    pub fn spawn<F, Fut>(&self, name: &str, f: F) -> bool
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<(), TaskError>> + Send + 'static,
    {
        match self.supervisor {
            Some(supervisor) => supervisor.spawn(name, f),
            None => false,
        }
    }

    /// Records that the code-split chunk `name` is needed by this page.
    pub fn use_chunk(&self, name: &str) {
        if let Some(chunks) = self.chunks {
            chunks.add(name);
        }
    }
}
