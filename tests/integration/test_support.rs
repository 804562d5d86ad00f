// Shared fixtures for integration tests

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use kagami::config::{RawOptions, RawStaticOptions};
use kagami::provider::{ImageTransformer, TransformedImage};
use kagami::{ImageLayer, OutputFormat, TransformError, TransformParams};

/// Transformer that counts invocations and optionally sleeps, so tests
/// can hold a transform open and observe coalescing. Bytes pass through
/// untouched; the content type follows the requested format.
pub struct CountingTransformer {
    calls: AtomicUsize,
    delay: Duration,
}

impl CountingTransformer {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ImageTransformer for CountingTransformer {
    fn output_formats(&self) -> Vec<OutputFormat> {
        vec![
            OutputFormat::Avif,
            OutputFormat::WebP,
            OutputFormat::Jpeg,
            OutputFormat::Png,
        ]
    }

    async fn transform(
        &self,
        _source: &str,
        bytes: Bytes,
        content_type: &str,
        params: &TransformParams,
    ) -> Result<TransformedImage, TransformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let content_type = match params.format {
            Some(format) => format.content_type().to_string(),
            None => content_type.to_string(),
        };
        Ok(TransformedImage::new(bytes, content_type))
    }
}

/// Transformer that fails its first `n` calls, then succeeds
pub struct FlakyTransformer {
    failures_remaining: AtomicUsize,
}

impl FlakyTransformer {
    pub fn failing(n: usize) -> Self {
        Self {
            failures_remaining: AtomicUsize::new(n),
        }
    }
}

#[async_trait]
impl ImageTransformer for FlakyTransformer {
    fn output_formats(&self) -> Vec<OutputFormat> {
        vec![OutputFormat::WebP, OutputFormat::Jpeg, OutputFormat::Png]
    }

    async fn transform(
        &self,
        source: &str,
        bytes: Bytes,
        content_type: &str,
        _params: &TransformParams,
    ) -> Result<TransformedImage, TransformError> {
        let consumed_failure = self
            .failures_remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if consumed_failure {
            return Err(TransformError::backend(
                "static",
                format!("induced failure for {}", source),
            ));
        }
        Ok(TransformedImage::new(bytes, content_type.to_string()))
    }
}

/// Raw options pointing the static provider at `static_dir`
pub fn raw_options(static_dir: &Path) -> RawOptions {
    RawOptions {
        static_: Some(RawStaticOptions {
            dir: Some(static_dir.to_path_buf()),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub async fn layer_with(
    static_dir: &Path,
    transformer: Arc<dyn ImageTransformer>,
) -> ImageLayer {
    ImageLayer::initialize(&raw_options(static_dir), &RawOptions::default(), transformer)
        .await
        .expect("layer initialization failed")
}

pub fn write_image(dir: &Path, name: &str, bytes: &[u8]) {
    std::fs::write(dir.join(name), bytes).expect("fixture write failed");
}
