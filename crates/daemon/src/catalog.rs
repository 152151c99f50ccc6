//! Catalog module: the read-only view of the media library.
//!
//! The library index itself lives outside this crate. It is consumed through
//! the [`Catalog`] trait, with a JSON export reader for the daemon and an
//! in-memory implementation for embedding hosts and tests.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use thiserror::Error;

/// Errors that can occur while reading the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// The catalog export could not be read.
    #[error("Failed to read catalog {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The catalog export is not valid JSON.
    #[error("Failed to parse catalog {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The in-memory catalog lock was poisoned by a panicking writer.
    #[error("Catalog lock poisoned")]
    Poisoned,
}

/// Broad type of a catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MediaKind {
    Video,
    Audio,
    #[serde(other)]
    Other,
}

/// Type of an elementary stream inside a media file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
    #[serde(other)]
    Other,
}

/// Stream metadata as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaStream {
    pub kind: StreamKind,
    /// Codec name (e.g., "hevc", "h264").
    pub codec: String,
    #[serde(default)]
    pub is_default: bool,
}

impl MediaStream {
    pub fn video(codec: &str) -> Self {
        Self {
            kind: StreamKind::Video,
            codec: codec.to_string(),
            is_default: true,
        }
    }

    pub fn audio(codec: &str) -> Self {
        Self {
            kind: StreamKind::Audio,
            codec: codec.to_string(),
            is_default: true,
        }
    }
}

/// A single entry of the media library.
///
/// The path doubles as the identity key of the item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaItem {
    #[serde(default)]
    pub path: Option<PathBuf>,
    pub kind: MediaKind,
    #[serde(default)]
    pub streams: Vec<MediaStream>,
}

impl MediaItem {
    /// A video item with a single default video stream.
    pub fn video<P: Into<PathBuf>>(path: P, codec: &str) -> Self {
        Self {
            path: Some(path.into()),
            kind: MediaKind::Video,
            streams: vec![MediaStream::video(codec)],
        }
    }

    pub fn is_video(&self) -> bool {
        self.kind == MediaKind::Video
    }

    /// The stream players pick by default: the first video stream flagged
    /// default, falling back to the first video stream.
    pub fn default_video_stream(&self) -> Option<&MediaStream> {
        let mut videos = self.streams.iter().filter(|s| s.kind == StreamKind::Video);
        let first = videos.clone().next();
        videos.find(|s| s.is_default).or(first)
    }

    /// Codec of the default video stream, if any.
    pub fn video_codec(&self) -> Option<&str> {
        self.default_video_stream().map(|s| s.codec.as_str())
    }
}

/// Filter passed to [`Catalog::list_items`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemQuery {
    /// Restrict to one kind of item (None = everything).
    pub kind: Option<MediaKind>,
}

impl ItemQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn matches(&self, item: &MediaItem) -> bool {
        self.kind.map_or(true, |kind| item.kind == kind)
    }
}

/// Read-only access to the media library index.
pub trait Catalog: Send + Sync {
    fn list_items(&self, query: &ItemQuery) -> Result<Vec<MediaItem>, CatalogError>;
}

/// Shape of a catalog export file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default)]
    pub items: Vec<MediaItem>,
}

/// Catalog backed by a JSON export, re-read on every query.
#[derive(Debug, Clone)]
pub struct JsonCatalog {
    path: PathBuf,
}

impl JsonCatalog {
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_document(&self) -> Result<CatalogDocument, CatalogError> {
        let content = fs::read_to_string(&self.path).map_err(|source| CatalogError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| CatalogError::Parse {
            path: self.path.clone(),
            source,
        })
    }
}

impl Catalog for JsonCatalog {
    fn list_items(&self, query: &ItemQuery) -> Result<Vec<MediaItem>, CatalogError> {
        let document = self.read_document()?;
        Ok(document
            .items
            .into_iter()
            .filter(|item| query.matches(item))
            .collect())
    }
}

/// Catalog held in memory; hosts can mutate it between scans.
#[derive(Debug, Default)]
pub struct InMemoryCatalog {
    items: RwLock<Vec<MediaItem>>,
}

impl InMemoryCatalog {
    pub fn new(items: Vec<MediaItem>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }

    pub fn replace_items(&self, items: Vec<MediaItem>) -> Result<(), CatalogError> {
        let mut guard = self.items.write().map_err(|_| CatalogError::Poisoned)?;
        *guard = items;
        Ok(())
    }
}

impl Catalog for InMemoryCatalog {
    fn list_items(&self, query: &ItemQuery) -> Result<Vec<MediaItem>, CatalogError> {
        let items = self.items.read().map_err(|_| CatalogError::Poisoned)?;
        Ok(items.iter().filter(|item| query.matches(item)).cloned().collect())
    }
}
