//! Error types raised while rendering a page on the server.
//!
//! - [`RenderError`] is the only error a caller of the renderer sees;
//!   every variant maps to a server-error outcome for the request.
//! - [`FetchError`] is returned by preload thunks.
//! - [`TaskError`] is returned by supervised background tasks.
//! - [`HydrationError`], [`AssetError`] and [`ConfigError`] cover the
//!   snapshot bridge, asset inputs and configuration loading.
//!
//! Each type provides `as_label` for logs.

use std::time::Duration;

use thiserror::Error;

/// Failure of a single preload fetch.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum FetchError {
    /// The remote call failed.
    #[error("request failed: {reason}")]
    Request {
        /// What went wrong, as reported by the API client.
        reason: String,
    },

    /// Any other error raised by the fetch.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl FetchError {
    /// Shorthand for [`FetchError::Request`].
    pub fn request(reason: impl Into<String>) -> Self {
        FetchError::Request {
            reason: reason.into(),
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            FetchError::Request { .. } => "fetch_request",
            FetchError::Other(_) => "fetch_other",
        }
    }
}

/// Failure of a supervised background task.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum TaskError {
    /// The task returned an error.
    #[error("task `{name}` failed: {reason}")]
    Failed { name: String, reason: String },

    /// The task panicked or was aborted before reporting.
    #[error("task `{name}` did not complete: {reason}")]
    Aborted { name: String, reason: String },

    /// A watcher would have taken an action dispatched after it was
    /// told to stop.
    #[error("task `{name}` missed an action dispatched after the end: {action}")]
    Missed { name: String, action: String },
}

impl TaskError {
    /// Shorthand for [`TaskError::Failed`].
    pub fn failed(name: impl Into<String>, reason: impl ToString) -> Self {
        TaskError::Failed {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn as_label(&self) -> &'static str {
        match self {
            TaskError::Failed { .. } => "task_failed",
            TaskError::Aborted { .. } => "task_aborted",
            TaskError::Missed { .. } => "task_missed",
        }
    }
}

/// Failure to move state across the server/client boundary.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum HydrationError {
    /// The state could not be represented as JSON.
    #[error("state is not JSON-representable: {0}")]
    Serialize(#[source] serde_json::Error),

    /// The embedded snapshot could not be read back into state.
    #[error("snapshot could not be decoded: {0}")]
    Deserialize(#[source] serde_json::Error),
}

impl HydrationError {
    pub fn as_label(&self) -> &'static str {
        match self {
            HydrationError::Serialize(_) => "hydration_serialize",
            HydrationError::Deserialize(_) => "hydration_deserialize",
        }
    }
}

/// Failure to load the asset manifest or chunk statistics.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum AssetError {
    #[error("failed to read asset file: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed asset file: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure to load a [`RenderConfig`](crate::RenderConfig).
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Errors produced while rendering one request.
///
/// None of these are retried; the request is answered with a
/// server error and no partial page or snapshot is sent.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RenderError {
    /// The application failed to produce markup.
    #[error("view failed to render: {0}")]
    View(String),

    /// A registered preload rejected.
    #[error("preload failed: {0}")]
    Fetch(#[from] FetchError),

    /// Preloads did not settle within the configured bound.
    #[error("preloads did not settle within {timeout:?}")]
    PreloadTimeout { timeout: Duration },

    /// A background workflow failed while the page data was settling.
    #[error(transparent)]
    Task(#[from] TaskError),

    /// The final state could not be embedded.
    #[error(transparent)]
    Snapshot(#[from] HydrationError),
}

impl RenderError {
    /// Shorthand for [`RenderError::View`].
    pub fn view(reason: impl ToString) -> Self {
        RenderError::View(reason.to_string())
    }

    /// Returns a short stable label (snake_case) for use in logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            RenderError::View(_) => "render_view",
            RenderError::Fetch(_) => "render_fetch",
            RenderError::PreloadTimeout { .. } => "render_preload_timeout",
            RenderError::Task(_) => "render_task",
            RenderError::Snapshot(_) => "render_snapshot",
        }
    }
}
