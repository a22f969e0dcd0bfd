//! Script, link and style tags for a rendered page.
//!
//! Two inputs are understood:
//!
//! - [`AssetManifest`], the `asset-manifest.json` emitted by the bundler,
//!   mapping logical file keys to hashed paths.
//! - [`ChunkStats`], mapping a code-split chunk name to the files it
//!   needs.  Components announce the chunks they use through
//!   [`RenderCx::use_chunk`](crate::RenderCx::use_chunk), which records
//!   them in a [`ChunkCollector`].

use std::{
    collections::{BTreeMap, BTreeSet},
    path::Path,
    sync::{Mutex, PoisonError},
};

use serde::Deserialize;

use crate::error::AssetError;

/// Tags to place in the emitted document.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssetTags {
    /// Placed at the end of `<body>`.
    pub scripts: String,
    /// Placed in `<head>`.
    pub links: String,
    /// Placed in `<head>`.
    pub styles: String,
}

/// Produces the tags needed by the chunks exercised in a render.
pub trait AssetResolver: Send + Sync {
    fn resolve(&self, chunks: &[String]) -> AssetTags;
}

/// Records the chunks reached while rendering.
#[derive(Debug, Default)]
pub struct ChunkCollector {
    chunks: Mutex<BTreeSet<String>>,
}

impl ChunkCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, chunk: impl Into<String>) {
        self.chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(chunk.into());
    }

    /// The recorded chunk names, sorted.
    pub fn chunks(&self) -> Vec<String> {
        self.chunks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }
}

/// The bundler's `asset-manifest.json`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AssetManifest {
    pub files: BTreeMap<String, String>,
    #[serde(default)]
    pub entrypoints: Vec<String>,
}

impl AssetManifest {
    pub fn from_json(text: &str) -> Result<Self, AssetError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }

    /// One script tag per `*chunk.js` entry, in key order.
    pub fn chunk_script_tags(&self) -> String {
        self.files
            .iter()
            .filter(|(key, _)| key.ends_with("chunk.js"))
            .map(|(_, path)| format!(r#"<script src="{path}"></script>"#))
            .collect()
    }
}

impl AssetResolver for AssetManifest {
    fn resolve(&self, _chunks: &[String]) -> AssetTags {
        AssetTags {
            scripts: self.chunk_script_tags(),
            ..AssetTags::default()
        }
    }
}

/// Chunk name to file list, plus the chunks every page needs.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkStats {
    #[serde(default)]
    pub public_path: String,
    #[serde(default)]
    pub entrypoints: Vec<String>,
    pub chunks: BTreeMap<String, Vec<String>>,
}

impl ChunkStats {
    pub fn from_json(text: &str) -> Result<Self, AssetError> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, AssetError> {
        Self::from_json(&std::fs::read_to_string(path)?)
    }
}

impl AssetResolver for ChunkStats {
    /// Entrypoint chunks come last so that they execute after the
    /// split chunks they depend on have been fetched.
    fn resolve(&self, chunks: &[String]) -> AssetTags {
        let mut tags = AssetTags::default();
        let mut seen = BTreeSet::new();
        let ordered = chunks
            .iter()
            .filter(|chunk| !self.entrypoints.contains(*chunk))
            .chain(self.entrypoints.iter());
        for chunk in ordered {
            let Some(files) = self.chunks.get(chunk) else {
                tracing::debug!(chunk = chunk.as_str(), "ssr.assets.unknown_chunk");
                continue;
            };
            for file in files {
                if !seen.insert(file.as_str()) {
                    continue;
                }
                let href = format!("{}{file}", self.public_path);
                if file.ends_with(".js") {
                    tags.scripts.push_str(&format!(
                        r#"<script async data-chunk="{chunk}" src="{href}"></script>"#
                    ));
                    tags.links.push_str(&format!(
                        r#"<link data-chunk="{chunk}" rel="preload" as="script" href="{href}">"#
                    ));
                } else if file.ends_with(".css") {
                    tags.styles.push_str(&format!(
                        r#"<link data-chunk="{chunk}" rel="stylesheet" href="{href}">"#
                    ));
                    tags.links.push_str(&format!(
                        r#"<link data-chunk="{chunk}" rel="preload" as="style" href="{href}">"#
                    ));
                }
            }
        }
        tags
    }
}
