//! Cached transform output
//!
//! A `TransformEntry` is one completed rendition: the produced bytes and
//! the content type to serve them under. Entries are shared between the
//! store and coalesced waiters, so the body uses `Bytes` and clones are
//! cheap.

use bytes::Bytes;
use chrono::{DateTime, Utc};

/// A completed transform result held by the cache.
#[derive(Debug, Clone)]
pub struct TransformEntry {
    /// Rendition body.
    pub bytes: Bytes,
    /// Content type the rendition is served under.
    pub content_type: String,
    /// When the transform completed.
    pub created_at: DateTime<Utc>,
}

impl TransformEntry {
    pub fn new(bytes: Bytes, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
            created_at: Utc::now(),
        }
    }

    pub fn size_bytes(&self) -> usize {
        self.bytes.len()
    }
}
