//! Transform key derivation
//!
//! A `TransformKey` is the identity of one optimized rendition: the
//! provider that produces it, the source it reads, and the normalized
//! parameter set. Format negotiation resolves `auto` before a key is
//! built, so two requests that produce the same visual output always
//! land on the same key.

use sha2::{Digest, Sha256};
use std::fmt;

use crate::transform::{OutputFormat, TransformParams};

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
pub struct TransformKey {
    pub provider: String,
    pub source: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub quality: Option<u8>,
    pub format: Option<OutputFormat>,
}

impl TransformKey {
    pub fn new(provider: &str, source: &str, params: &TransformParams) -> Self {
        Self {
            provider: provider.to_string(),
            source: source.to_string(),
            width: params.width,
            height: params.height,
            quality: params.quality,
            format: params.format,
        }
    }

    /// Canonical string rendering with fields in a fixed order, so equal
    /// keys always render identically. Absent parameters render empty.
    pub fn canonical(&self) -> String {
        format!(
            "provider={}&source={}&w={}&h={}&q={}&f={}",
            self.provider,
            urlencoding::encode(&self.source),
            opt_to_string(&self.width),
            opt_to_string(&self.height),
            opt_to_string(&self.quality),
            self.format.map(|f| f.as_str()).unwrap_or(""),
        )
    }

    /// Hex SHA-256 digest of the canonical rendering.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical().as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Strong validator for conditional requests.
    pub fn etag(&self) -> String {
        format!("\"{}\"", self.fingerprint())
    }

    /// Output file name for pre-rendered images. A pure function of the
    /// key, so generation and later lookups agree on the name.
    pub fn file_name(&self) -> String {
        let extension = match self.format {
            Some(format) => format.extension().to_string(),
            None => source_extension(&self.source),
        };
        format!("{}.{}", self.fingerprint(), extension)
    }
}

impl fmt::Display for TransformKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical())
    }
}

fn opt_to_string<T: fmt::Display>(value: &Option<T>) -> String {
    match value {
        Some(v) => v.to_string(),
        None => String::new(),
    }
}

fn source_extension(source: &str) -> String {
    std::path::Path::new(source)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_ascii_lowercase())
        .unwrap_or_else(|| "img".to_string())
}
