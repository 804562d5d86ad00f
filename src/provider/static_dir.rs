//! Static filesystem provider
//!
//! Resolves source locators under a configured directory, enforces a
//! containment boundary against traversal and symlink escape, and hands
//! bytes to the image transformer. Sources without transform parameters
//! skip the transformer entirely.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use super::error::{ProviderResolutionError, TransformError};
use super::transformer::{ImageTransformer, TransformedImage};
use super::Provider;
use crate::constants::MAX_SOURCE_FILE_BYTES;
use crate::transform::{source_content_type, OutputFormat, TransformParams};

pub struct StaticProvider {
    root: PathBuf,
    base_url: String,
    transformer: Arc<dyn ImageTransformer>,
    max_source_bytes: u64,
}

impl StaticProvider {
    /// Canonicalizes the configured directory up front so containment
    /// checks compare resolved paths. Fails when the directory does not
    /// exist: a missing root is a deployment error, not a per-request
    /// condition.
    pub async fn new(
        dir: &Path,
        base_url: &str,
        transformer: Arc<dyn ImageTransformer>,
    ) -> Result<Self, ProviderResolutionError> {
        let root = tokio::fs::canonicalize(dir)
            .await
            .map_err(|_| ProviderResolutionError::missing_static_dir(dir.display().to_string()))?;

        debug!(root = %root.display(), "static provider rooted");

        Ok(Self {
            root,
            base_url: base_url.to_string(),
            transformer,
            max_source_bytes: MAX_SOURCE_FILE_BYTES,
        })
    }

    #[cfg(test)]
    pub(crate) fn with_max_source_bytes(mut self, max: u64) -> Self {
        self.max_source_bytes = max;
        self
    }

    /// Resolved on-disk path for a source locator
    ///
    /// Rejects traversal segments before touching the filesystem, then
    /// canonicalizes and re-checks containment so symlinks cannot escape
    /// the root either.
    async fn resolve_source(&self, source: &str) -> Result<PathBuf, TransformError> {
        let relative = source.trim_start_matches('/');

        if relative.is_empty()
            || relative.contains('\\')
            || relative.split('/').any(|segment| segment == "..")
        {
            return Err(TransformError::forbidden(source));
        }

        let candidate = self.root.join(relative);
        let canonical = tokio::fs::canonicalize(&candidate)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => TransformError::not_found(source),
                _ => TransformError::backend("static", e.to_string()),
            })?;

        if !canonical.starts_with(&self.root) {
            return Err(TransformError::forbidden(source));
        }

        Ok(canonical)
    }

    async fn read_source(&self, source: &str, path: &Path) -> Result<Bytes, TransformError> {
        let metadata = tokio::fs::metadata(path)
            .await
            .map_err(|e| TransformError::backend("static", e.to_string()))?;

        if !metadata.is_file() {
            return Err(TransformError::not_found(source));
        }
        if metadata.len() > self.max_source_bytes {
            return Err(TransformError::too_large(
                source,
                metadata.len(),
                self.max_source_bytes,
            ));
        }

        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TransformError::backend("static", e.to_string()))?;
        Ok(Bytes::from(bytes))
    }
}

#[async_trait]
impl Provider for StaticProvider {
    fn name(&self) -> &str {
        "static"
    }

    fn supports_transform(&self) -> bool {
        true
    }

    fn output_formats(&self) -> Vec<OutputFormat> {
        self.transformer.output_formats()
    }

    fn resolve_url(&self, source: &str, params: &TransformParams) -> String {
        let relative = source.trim_start_matches('/');
        let segment = params.to_path_segment();
        if segment.is_empty() {
            format!("{}/{}", self.base_url, relative)
        } else {
            format!("{}/{}/{}", self.base_url, segment, relative)
        }
    }

    fn runtime_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }

    async fn transform(
        &self,
        source: &str,
        params: &TransformParams,
    ) -> Result<TransformedImage, TransformError> {
        let path = self.resolve_source(source).await?;
        let bytes = self.read_source(source, &path).await?;
        let content_type = source_content_type(source);

        if !params.has_transformations() {
            return Ok(TransformedImage::new(bytes, content_type));
        }

        self.transformer
            .transform(source, bytes, content_type, params)
            .await
    }
}
