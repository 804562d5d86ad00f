//! Transform parameter parsing
//!
//! Supports two URL formats:
//! 1. Query parameters: `?w=300&h=200&q=80&f=webp`
//! 2. Path-based options: `/w:300,h:200,q:80,f:webp/<source>`

use std::collections::HashMap;
use std::str::FromStr;

use super::error::RequestError;

/// Output image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
    Avif,
    /// Negotiate from the Accept header; resolved to a concrete format
    /// (or dropped) before a transform key is built
    Auto,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpeg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Avif => "avif",
            Self::Auto => "auto",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::WebP => "image/webp",
            Self::Avif => "image/avif",
            Self::Auto => "image/jpeg", // Fallback, resolved before use
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::WebP => "webp",
            Self::Avif => "avif",
            Self::Auto => "jpg",
        }
    }

    /// Format matching a MIME type, e.g. `image/webp`
    pub fn from_content_type(mime: &str) -> Option<Self> {
        match mime.trim() {
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            "image/webp" => Some(Self::WebP),
            "image/avif" => Some(Self::Avif),
            _ => None,
        }
    }
}

impl FromStr for OutputFormat {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(OutputFormat::Jpeg),
            "png" => Ok(OutputFormat::Png),
            "webp" => Ok(OutputFormat::WebP),
            "avif" => Ok(OutputFormat::Avif),
            "auto" => Ok(OutputFormat::Auto),
            _ => Err(RequestError::invalid_param(
                "format",
                format!("unknown format: {}", s),
            )),
        }
    }
}

/// Transformation parameters carried by an optimization request.
///
/// Only the fields that change the visual output participate in cache
/// key derivation, so this set is deliberately small.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransformParams {
    /// Target width in pixels
    pub width: Option<u32>,
    /// Target height in pixels
    pub height: Option<u32>,
    /// Output quality (1-100)
    pub quality: Option<u8>,
    /// Output format (None = preserve original)
    pub format: Option<OutputFormat>,
}

impl TransformParams {
    /// Parse from query parameters (e.g., ?w=300&h=200&q=80&f=webp)
    ///
    /// Keys outside the known set are ignored.
    pub fn from_query(params: &HashMap<String, String>) -> Result<Self, RequestError> {
        let mut result = Self::default();

        if let Some(w) = params.get("w") {
            result.width = Some(parse_dimension("w", w)?);
        }

        if let Some(h) = params.get("h") {
            result.height = Some(parse_dimension("h", h)?);
        }

        if let Some(q) = params.get("q") {
            let quality: u8 = q
                .parse()
                .map_err(|_| RequestError::invalid_param("q", "must be 1-100"))?;
            if !(1..=100).contains(&quality) {
                return Err(RequestError::invalid_param("q", "must be 1-100"));
            }
            result.quality = Some(quality);
        }

        // Format (f or fmt)
        if let Some(fmt) = params.get("f").or_else(|| params.get("fmt")) {
            result.format = Some(fmt.parse()?);
        }

        Ok(result)
    }

    /// Parse from a path options segment (e.g., `w:300,h:200,q:80`)
    pub fn from_path_segment(segment: &str) -> Result<Self, RequestError> {
        let mut params = HashMap::new();

        for part in segment.split(',') {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }

            match part.split_once(':') {
                Some((key, value)) => {
                    params.insert(key.to_string(), value.to_string());
                }
                None => {
                    return Err(RequestError::invalid_param(
                        part,
                        "expected key:value in options segment",
                    ));
                }
            }
        }

        Self::from_query(&params)
    }

    /// Canonical path segment for this parameter set, with fields in a
    /// fixed order so equal parameters always render identically.
    pub fn to_path_segment(&self) -> String {
        let mut parts = Vec::new();

        if let Some(w) = self.width {
            parts.push(format!("w:{}", w));
        }
        if let Some(h) = self.height {
            parts.push(format!("h:{}", h));
        }
        if let Some(q) = self.quality {
            parts.push(format!("q:{}", q));
        }
        if let Some(f) = self.format {
            parts.push(format!("f:{}", f.as_str()));
        }

        parts.join(",")
    }

    /// Replaces the format field, used after Accept negotiation resolves
    /// `auto` to a concrete format or drops it.
    pub fn with_format(mut self, format: Option<OutputFormat>) -> Self {
        self.format = format;
        self
    }

    /// Check if any transformation is requested
    pub fn has_transformations(&self) -> bool {
        self.width.is_some()
            || self.height.is_some()
            || self.quality.is_some()
            || self.format.is_some()
    }
}

fn parse_dimension(param: &str, value: &str) -> Result<u32, RequestError> {
    let px: u32 = value
        .parse()
        .map_err(|_| RequestError::invalid_param(param, "must be a positive integer"))?;
    if px == 0 {
        return Err(RequestError::invalid_param(param, "must be greater than 0"));
    }
    Ok(px)
}
