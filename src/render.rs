//! The dual-pass server renderer.
//!
//! Rendering one request moves through three states:
//!
//! ```text
//! COLLECTING ──► AWAITING ──► FINALIZED
//!
//! COLLECTING  render the app with a fresh registry, markup discarded;
//!             preload triggers register their fetches
//! AWAITING    terminate the saga, then wait for both the supervisor to
//!             stop and every registered fetch to settle (fail fast)
//! FINALIZED   mark the registry done, render again with the populated
//!             store, snapshot the store
//! ```
//!
//! The app is called with the same path on every pass, so the final
//! pass is a pure function of the route and the now-populated state.

use std::{future::Future, sync::Arc, time::Duration};

use futures::future::try_join_all;
use tracing::Instrument;

use crate::{
    assets::{AssetResolver, AssetTags, ChunkCollector},
    config::RenderConfig,
    context::RenderCx,
    document::DocumentShell,
    error::{HydrationError, RenderError},
    hydrate::{serialize_state, state_script},
    preload::{PreloadFuture, PreloadRegistry},
    saga::Saga,
    store::Reducer,
    supervisor::Supervisor,
};

/// The routed component tree of an application.
pub trait App<R: Reducer>: Send + Sync + 'static {
    /// Renders the tree for `path` to markup.
    fn render(&self, path: &str, cx: &RenderCx<'_, R>) -> Result<String, RenderError>;
}

impl<R, F> App<R> for F
where
    R: Reducer,
    F: Fn(&str, &RenderCx<'_, R>) -> Result<String, RenderError> + Send + Sync + 'static,
{
    fn render(&self, path: &str, cx: &RenderCx<'_, R>) -> Result<String, RenderError> {
        self(path, cx)
    }
}

type SagaSetup<R> = dyn Fn(&Saga<R>) + Send + Sync;

/// The result of a successful render.
#[derive(Clone, Debug)]
pub struct RenderedPage {
    /// Markup of the final pass.
    pub markup: String,
    /// The store's state once the final pass finished.
    pub state: serde_json::Value,
    /// Asset tags; `scripts` starts with the state snapshot script.
    pub tags: AssetTags,
}

impl RenderedPage {
    /// Assembles the full HTML document.
    pub fn into_html(self, shell: &DocumentShell) -> String {
        shell.render(&self.markup, &self.tags)
    }
}

/// Renders requests for one application.
///
/// A renderer is shared by all requests; everything mutable (store,
/// registry, supervisor) is created per call to [`render`](Self::render).
pub struct Renderer<R: Reducer + Clone> {
    reducer: R,
    app: Arc<dyn App<R>>,
    setup: Option<Arc<SagaSetup<R>>>,
    assets: Option<Arc<dyn AssetResolver>>,
    config: RenderConfig,
}

impl<R: Reducer + Clone> Renderer<R> {
    pub fn new(reducer: R, app: impl App<R>) -> Self {
        Self {
            reducer,
            app: Arc::new(app),
            setup: None,
            assets: None,
            config: RenderConfig::default(),
        }
    }

    /// Starts the request's saga watchers before the first pass.
    pub fn with_saga(mut self, setup: impl Fn(&Saga<R>) + Send + Sync + 'static) -> Self {
        self.setup = Some(Arc::new(setup));
        self
    }

    pub fn with_assets(mut self, assets: impl AssetResolver + 'static) -> Self {
        self.assets = Some(Arc::new(assets));
        self
    }

    pub fn with_config(mut self, config: RenderConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    /// Renders `path` starting from an empty store.
    ///
    /// Any error means no page and no snapshot are produced.
    pub async fn render(&self, path: &str) -> Result<RenderedPage, RenderError> {
        self.render_with_state(path, None).await
    }

    /// Renders `path` with the request's store seeded from `initial`,
    /// or from the default state when absent.
    pub async fn render_with_state(
        &self,
        path: &str,
        initial: Option<R::State>,
    ) -> Result<RenderedPage, RenderError> {
        let span = tracing::info_span!("ssr.render", path, seeded = initial.is_some());
        async {
            let result = self.render_inner(path, initial).await;
            if let Err(err) = &result {
                tracing::error!(label = err.as_label(), error = %err, "ssr.render.failed");
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn render_inner(
        &self,
        path: &str,
        initial: Option<R::State>,
    ) -> Result<RenderedPage, RenderError> {
        let saga = Saga::with_state(
            self.reducer.clone(),
            initial.unwrap_or_default(),
            Supervisor::new(self.config.grace()),
        );
        if let Some(setup) = &self.setup {
            setup(&saga);
        }
        let registry = PreloadRegistry::new();

        // COLLECTING
        let passes = self.config.collect_passes_clamped();
        for pass in 1..=passes {
            self.dry_run(path, &saga, &registry)?;
            let pending = registry.take_pending();
            tracing::debug!(pass, registered = pending.len(), "ssr.render.collected");

            if pass < passes && !pending.is_empty() {
                self.settle_preloads(pending).await?;
                continue;
            }

            // AWAITING
            saga.terminate();
            tokio::try_join!(self.settle_saga(&saga), self.settle_preloads(pending))?;
            check_missed(&saga)?;
            break;
        }

        // FINALIZED
        registry.mark_done();
        let chunks = ChunkCollector::new();
        let markup = {
            let cx = RenderCx::server(saga.store(), &registry, &chunks, saga.supervisor());
            self.app.render(path, &cx)?
        };
        self.finish(markup, &saga, &chunks)
    }

    fn dry_run(
        &self,
        path: &str,
        saga: &Saga<R>,
        registry: &PreloadRegistry,
    ) -> Result<(), RenderError> {
        let chunks = ChunkCollector::new();
        let cx = RenderCx::server(saga.store(), registry, &chunks, saga.supervisor());
        self.app.render(path, &cx).map(drop)
    }

    async fn settle_saga(&self, saga: &Saga<R>) -> Result<(), RenderError> {
        let report = saga.supervisor().stopped().await?;
        if !report.is_clean() {
            // Proceed with whatever state the stalled tasks left behind.
            tracing::warn!(stalled = ?report.stalled, "ssr.render.saga_stalled");
        }
        Ok(())
    }

    async fn settle_preloads(&self, pending: Vec<PreloadFuture>) -> Result<(), RenderError> {
        if pending.is_empty() {
            return Ok(());
        }
        let count = pending.len();
        with_timeout(self.config.preload_timeout(), try_join_all(pending)).await??;
        tracing::debug!(count, "ssr.render.preloads_settled");
        Ok(())
    }

    fn finish(
        &self,
        markup: String,
        saga: &Saga<R>,
        chunks: &ChunkCollector,
    ) -> Result<RenderedPage, RenderError> {
        check_missed(saga)?;
        let state = saga.store().get_state();
        let snapshot = serialize_state(&state)?;
        let state = serde_json::to_value(&state).map_err(HydrationError::Serialize)?;

        let mut tags = self
            .assets
            .as_ref()
            .map(|assets| assets.resolve(&chunks.chunks()))
            .unwrap_or_default();
        tags.scripts = state_script(&self.config.snapshot_var, &snapshot) + &tags.scripts;

        Ok(RenderedPage {
            markup,
            state,
            tags,
        })
    }
}

/// Fails when a watcher would have taken an action dispatched after the
/// saga ended, as the page would then lack the data it was to load.
fn check_missed<R: Reducer>(saga: &Saga<R>) -> Result<(), RenderError> {
    match saga.channel().take_missed().into_iter().next() {
        Some(missed) => Err(missed.into()),
        None => Ok(()),
    }
}

async fn with_timeout<T>(
    timeout: Option<Duration>,
    fut: impl Future<Output = T>,
) -> Result<T, RenderError> {
    match timeout {
        Some(timeout) => tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| RenderError::PreloadTimeout { timeout }),
        None => Ok(fut.await),
    }
}
