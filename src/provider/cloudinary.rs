//! Cloudinary URL-generation provider
//!
//! Maps sources and transform parameters onto Cloudinary delivery URLs.
//! The CDN performs the actual transformation, so this provider never
//! produces bytes itself.

use async_trait::async_trait;

use super::Provider;
use crate::transform::{OutputFormat, TransformParams};

pub struct CloudinaryProvider {
    base_url: String,
}

impl CloudinaryProvider {
    /// `base_url` is the delivery prefix, e.g.
    /// `https://res.cloudinary.com/<cloud>/image/upload`.
    pub fn new(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Comma-joined transformation component, e.g. `w_300,q_80,f_webp`
    fn operations(params: &TransformParams) -> String {
        let mut ops = Vec::new();

        if let Some(w) = params.width {
            ops.push(format!("w_{}", w));
        }
        if let Some(h) = params.height {
            ops.push(format!("h_{}", h));
        }
        if let Some(q) = params.quality {
            ops.push(format!("q_{}", q));
        }
        if let Some(f) = params.format {
            ops.push(format!("f_{}", f.as_str()));
        }

        ops.join(",")
    }
}

#[async_trait]
impl Provider for CloudinaryProvider {
    fn name(&self) -> &str {
        "cloudinary"
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
        let public_id = source.trim_start_matches('/');
        let operations = Self::operations(params);

        if operations.is_empty() {
            format!("{}/{}", self.base_url, public_id)
        } else {
            format!("{}/{}/{}", self.base_url, operations, public_id)
        }
    }

    fn runtime_base_url(&self) -> Option<String> {
        Some(self.base_url.clone())
    }
}
