//! Serving rendered pages with `axum`.
//!
//! [`router`] answers every request it receives by rendering the request
//! path.  Static assets are expected to be routed before it.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{StatusCode, Uri},
    response::{Html, IntoResponse, Response},
    Router,
};

use crate::{
    document::DocumentShell,
    error::RenderError,
    render::{RenderedPage, Renderer},
    store::Reducer,
};

struct PageState<R: Reducer + Clone> {
    renderer: Arc<Renderer<R>>,
    shell: Arc<DocumentShell>,
}

impl<R: Reducer + Clone> Clone for PageState<R> {
    fn clone(&self) -> Self {
        Self {
            renderer: Arc::clone(&self.renderer),
            shell: Arc::clone(&self.shell),
        }
    }
}

/// A router rendering every path through `renderer`.
pub fn router<R: Reducer + Clone>(renderer: Arc<Renderer<R>>, shell: DocumentShell) -> Router {
    Router::new()
        .fallback(render_page::<R>)
        .with_state(PageState {
            renderer,
            shell: Arc::new(shell),
        })
}

async fn render_page<R: Reducer + Clone>(State(state): State<PageState<R>>, uri: Uri) -> Response {
    match state.renderer.render(uri.path()).await {
        Ok(page) => page_response(page, &state.shell),
        Err(err) => err.into_response(),
    }
}

fn page_response(page: RenderedPage, shell: &DocumentShell) -> Response {
    Html(page.into_html(shell)).into_response()
}

impl IntoResponse for RenderError {
    /// The details stay in the server log; the client only learns that
    /// rendering failed and falls back to its own bootstrap.
    fn into_response(self) -> Response {
        (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error").into_response()
    }
}
