//! Candidate selection: which catalog items need re-encoding right now.

use crate::catalog::{Catalog, CatalogError, ItemQuery, MediaItem};
use crate::guard::TranscodeGuard;
use std::sync::Arc;

/// True if `codec` is exactly `wanted`, as the catalog reports it.
pub fn codec_matches(codec: &str, wanted: &str) -> bool {
    codec == wanted
}

/// Eligibility rule shared by the selector and the orchestrator's re-check.
///
/// An item is eligible when it is a video with a path, its default video
/// stream uses `source_codec`, and its path is not claimed.
pub fn is_eligible(item: &MediaItem, source_codec: &str, guard: &TranscodeGuard) -> bool {
    let Some(path) = item.path.as_deref() else {
        return false;
    };
    if !item.is_video() {
        return false;
    }
    let Some(codec) = item.video_codec() else {
        return false;
    };
    codec_matches(codec, source_codec) && !guard.is_claimed(path)
}

/// Queries the catalog for items eligible for transcoding.
pub struct CandidateSelector {
    catalog: Arc<dyn Catalog>,
    guard: TranscodeGuard,
    source_codec: String,
}

impl CandidateSelector {
    pub fn new(catalog: Arc<dyn Catalog>, guard: TranscodeGuard, source_codec: impl Into<String>) -> Self {
        Self {
            catalog,
            guard,
            source_codec: source_codec.into(),
        }
    }

    pub fn source_codec(&self) -> &str {
        &self.source_codec
    }

    /// Point-in-time snapshot of eligible items, in catalog order.
    ///
    /// The catalog may change while the caller works through the list.
    pub fn select_candidates(&self) -> Result<Vec<MediaItem>, CatalogError> {
        let items = self.catalog.list_items(&ItemQuery::all())?;
        Ok(items
            .into_iter()
            .filter(|item| is_eligible(item, &self.source_codec, &self.guard))
            .collect())
    }
}
