//! Image transformer boundary
//!
//! This module defines the `ImageTransformer` trait that pixel codecs
//! plug into. The crate itself never decodes or encodes pixels; hosts
//! supply an implementation, and a byte-passthrough implementation ships
//! for hosts and tests that serve sources unchanged.

use async_trait::async_trait;
use bytes::Bytes;

use super::error::TransformError;
use crate::transform::{OutputFormat, TransformParams};

/// Output of a transform: encoded bytes plus their media type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedImage {
    pub bytes: Bytes,
    pub content_type: String,
}

impl TransformedImage {
    pub fn new(bytes: Bytes, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }
}

/// Pixel codec boundary for the static provider
///
/// `params.format` is always concrete by the time a codec sees it:
/// format negotiation resolves `auto` or drops it beforehand.
#[async_trait]
pub trait ImageTransformer: Send + Sync {
    /// Formats this codec can encode to
    ///
    /// An empty list means the codec cannot transcode; format negotiation
    /// then refuses explicit format requests and `auto` degrades to the
    /// source format.
    fn output_formats(&self) -> Vec<OutputFormat>;

    /// Apply `params` to source bytes, re-encoding to `params.format`
    /// when set and preserving the source format otherwise
    async fn transform(
        &self,
        source: &str,
        bytes: Bytes,
        content_type: &str,
        params: &TransformParams,
    ) -> Result<TransformedImage, TransformError>;
}

/// Serves source bytes unchanged. Resize and quality parameters are
/// accepted but have no effect; transcoding is refused upstream because
/// `output_formats` is empty.
pub struct PassthroughTransformer;

#[async_trait]
impl ImageTransformer for PassthroughTransformer {
    fn output_formats(&self) -> Vec<OutputFormat> {
        Vec::new()
    }

    async fn transform(
        &self,
        _source: &str,
        bytes: Bytes,
        content_type: &str,
        params: &TransformParams,
    ) -> Result<TransformedImage, TransformError> {
        if let Some(format) = params.format {
            // Negotiation never selects a format the codec cannot emit
            return Err(TransformError::internal(format!(
                "passthrough cannot encode {}",
                format.as_str()
            )));
        }
        Ok(TransformedImage::new(bytes, content_type))
    }
}
