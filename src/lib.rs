//! This crate renders pages on the server with their data already in
//! place.  The markup a browser receives is the fully populated page,
//! and the state the page was rendered from travels along with it so
//! that the client can resume from where the server left off instead of
//! fetching everything again.
//!
//! ## The problem
//!
//! Rendering a component tree is synchronous, while the data behind it
//! comes from asynchronous calls to a backend API.  Components deep in
//! the tree know what they need, but the renderer has no way of waiting
//! on them in the middle of a walk.  The approach taken here is to walk
//! the tree twice:
//!
//! 1. A collecting pass, where every component that needs remote data
//!    registers a fetch with the request's [`PreloadRegistry`].  The
//!    markup of this pass is thrown away.
//! 2. The renderer then waits for every registered fetch, and for the
//!    request's background workflows to wind down, as those may still
//!    be writing to the store.
//! 3. The registry is marked done, and a second pass renders the tree
//!    against the now-populated store.  Triggers do nothing in this pass.
//!
//! The store's final state is embedded in the page as an inline script
//! (see [`hydrate`]), which the client reads at startup to seed its own
//! store.  Views on the client then consult [`resume`] before fetching,
//! so that data the server already obtained is not requested again.
//!
//! Nothing here is global: the registry, the store and the supervisor
//! of background tasks are created per request and passed down the tree
//! explicitly through a [`RenderCx`].  On the client the context simply
//! carries no registry, which turns every trigger into a no-op, so the
//! same component code runs on both sides.
//!
//! # Example
//!
//! ```
//! # #[cfg(feature = "ssr")]
//! # tokio_test::block_on(async {
//! use serde::{Deserialize, Serialize};
//! use ssr_preload::{store::Reducer, RenderCx, RenderError, Renderer};
//!
//! #[derive(Clone, Default, Serialize, Deserialize)]
//! struct State {
//!     greeting: Option<String>,
//! }
//!
//! #[derive(Clone, Debug)]
//! enum Action {
//!     Greeted(String),
//! }
//!
//! #[derive(Clone)]
//! struct Greeter;
//!
//! impl Reducer for Greeter {
//!     type State = State;
//!     type Action = Action;
//!
//!     fn reduce(&self, state: &mut State, action: &Action) {
//!         match action {
//!             Action::Greeted(text) => state.greeting = Some(text.clone()),
//!         }
//!     }
//! }
//!
//! fn app(_path: &str, cx: &RenderCx<'_, Greeter>) -> Result<String, RenderError> {
//!     let store = cx.store().clone();
//!     // This pretends to be a call to the backend.
//!     let marker = cx.preloader(move || async move {
//!         store.dispatch(Action::Greeted("hello".into()));
//!         Ok(())
//!     });
//!     let greeting = cx.store().select(|s| s.greeting.clone()).unwrap_or_default();
//!     Ok(format!("<p>{greeting}</p>{marker}"))
//! }
//!
//! let renderer = Renderer::new(Greeter, app);
//! let page = renderer.render("/").await.unwrap();
//! assert_eq!(page.markup, "<p>hello</p>");
//! assert!(page.tags.scripts.starts_with(
//!     r#"<script>window.__PRELOADED_STATE__ = {"greeting":"hello"};</script>"#
//! ));
//! # });
//! ```
//!
//! # Feature Flags
#![cfg_attr(
    feature = "document-features",
    cfg_attr(doc, doc = ::document_features::document_features!())
)]

pub mod assets;
mod config;
mod context;
pub mod document;
pub mod error;
#[cfg(feature = "axum")]
pub mod http;
pub mod hydrate;
pub mod preload;
#[cfg(feature = "ssr")]
mod render;
pub mod resume;
#[cfg(feature = "ssr")]
pub mod saga;
pub mod store;
#[cfg(feature = "ssr")]
pub mod supervisor;


pub use config::{RenderConfig, DEFAULT_SNAPSHOT_VAR};
pub use context::RenderCx;
pub use document::DocumentShell;
pub use error::{FetchError, RenderError, TaskError};
pub use preload::PreloadRegistry;
#[cfg(feature = "ssr")]
pub use render::{App, RenderedPage, Renderer};
