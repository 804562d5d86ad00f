//! TwicPics URL-generation provider
//!
//! Maps sources onto TwicPics API URLs with the transformation chain in
//! the `twic` query parameter. URL-only, like the Cloudinary provider.

use async_trait::async_trait;

use super::Provider;
use crate::transform::{OutputFormat, TransformParams};

pub struct TwicPicsProvider {
    base_url: String,
}

impl TwicPicsProvider {
    /// `base_url` is the workspace domain, e.g. `https://demo.twic.pics`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Slash-joined transformation chain, e.g. `resize=300x200/quality=80`
    fn operations(params: &TransformParams) -> Vec<String> {
        let mut ops = Vec::new();

        match (params.width, params.height) {
            (Some(w), Some(h)) => ops.push(format!("resize={}x{}", w, h)),
            (Some(w), None) => ops.push(format!("resize={}", w)),
            // Width placeholder keeps the aspect ratio
            (None, Some(h)) => ops.push(format!("resize=-x{}", h)),
            (None, None) => {}
        }
        if let Some(q) = params.quality {
            ops.push(format!("quality={}", q));
        }
        if let Some(f) = params.format {
            ops.push(format!("output={}", f.as_str()));
        }

        ops
    }
}

#[async_trait]
impl Provider for TwicPicsProvider {
    fn name(&self) -> &str {
        "twicpics"
    }

    fn supports_transform(&self) -> bool {
        false
    }

    fn output_formats(&self) -> Vec<OutputFormat> {
        vec![
            OutputFormat::Avif,
            OutputFormat::WebP,
            OutputFormat::Jpeg,
            OutputFormat::Png,
        ]
    }

    fn resolve_url(&self, source: &str, params: &TransformParams) -> String {
        let path = source.trim_start_matches('/');
        let operations = Self::operations(params);

        if operations.is_empty() {
            format!("{}/{}", self.base_url, path)
        } else {
            format!("{}/{}?twic=v1/{}", self.base_url, path, operations.join("/"))
        }
    }

    fn runtime_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
