//! Renderer configuration.
//!
//! ## Sentinel values
//! - `grace_ms = 0` waits for background workflows without bound
//! - `preload_timeout_ms = 0` waits for preloads without bound
//! - `collect_passes = 0` is treated as a single collecting pass

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Name of the global the snapshot script assigns to.
pub const DEFAULT_SNAPSHOT_VAR: &str = "__PRELOADED_STATE__";

/// Settings applied to every server render.
///
/// All fields have defaults, so a TOML document only needs to name the
/// ones it overrides:
///
/// ```
/// use ssr_preload::RenderConfig;
///
/// let cfg = RenderConfig::from_toml_str("grace_ms = 250").unwrap();
/// assert_eq!(cfg.grace(), Some(std::time::Duration::from_millis(250)));
/// assert_eq!(cfg.snapshot_var, "__PRELOADED_STATE__");
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Global variable the client reads its initial state from.
    pub snapshot_var: String,

    /// Upper bound on collecting passes before the final pass.
    ///
    /// A pass that registers no new preloads ends collection early.
    pub collect_passes: usize,

    /// How long terminated background workflows may take to wind down.
    pub grace_ms: u64,

    /// How long the join over registered preloads may take.
    pub preload_timeout_ms: u64,
}

impl RenderConfig {
    /// Parses a config from TOML text.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Reads and parses a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    /// Grace period for background workflows, `None` when unbounded.
    #[inline]
    pub fn grace(&self) -> Option<Duration> {
        match self.grace_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    /// Bound on the preload join, `None` when unbounded.
    #[inline]
    pub fn preload_timeout(&self) -> Option<Duration> {
        match self.preload_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        }
    }

    #[inline]
    pub fn collect_passes_clamped(&self) -> usize {
        self.collect_passes.max(1)
    }
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            snapshot_var: DEFAULT_SNAPSHOT_VAR.to_string(),
            collect_passes: 1,
            grace_ms: 5_000,
            preload_timeout_ms: 0,
        }
    }
}
