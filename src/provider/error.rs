//! Provider error types
//!
//! Provides structured error handling with HTTP status mapping,
//! consistent with the request error pattern in the transform module.

use std::fmt;

/// Errors that can occur while fetching or transforming a source image
///
/// Clone is required: a failed computation is broadcast to every caller
/// waiting on the same cache key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformError {
    // === Source Errors ===
    /// Source image does not exist
    SourceNotFound { source: String },
    /// Source resolves outside the provider's root
    SourceForbidden { source: String },
    /// Source file exceeds the size limit
    SourceTooLarge {
        source: String,
        size: u64,
        max_size: u64,
    },

    // === Processing Errors ===
    /// Provider backend failed to fetch or transform
    BackendFailed { provider: String, message: String },
    /// Provider cannot transform locally
    Unsupported { provider: String },

    // === Internal Errors ===
    /// Shared computation ended without producing a result
    Interrupted,
    /// Unexpected internal failure
    Internal { message: String },
}

impl fmt::Display for TransformError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            // Source errors
            TransformError::SourceNotFound { source } => {
                write!(f, "Source image not found: {}", source)
            }
            TransformError::SourceForbidden { source } => {
                write!(f, "Source not allowed: {}", source)
            }
            TransformError::SourceTooLarge {
                source,
                size,
                max_size,
            } => {
                write!(
                    f,
                    "Source {} is {} bytes, exceeds maximum {} bytes",
                    source, size, max_size
                )
            }

            // Processing errors
            TransformError::BackendFailed { provider, message } => {
                write!(f, "Provider '{}' failed: {}", provider, message)
            }
            TransformError::Unsupported { provider } => {
                write!(f, "Provider '{}' does not transform locally", provider)
            }

            // Internal errors
            TransformError::Interrupted => {
                write!(f, "Transform interrupted before completion")
            }
            TransformError::Internal { message } => {
                write!(f, "Internal transform error: {}", message)
            }
        }
    }
}

impl std::error::Error for TransformError {}

impl TransformError {
    /// Maps transform errors to HTTP status codes
    ///
    /// Status mapping:
    /// - SourceNotFound → 404 (Not Found)
    /// - SourceForbidden → 403 (Forbidden)
    /// - SourceTooLarge → 413 (Payload Too Large)
    /// - BackendFailed, Interrupted → 502 (Bad Gateway)
    /// - Unsupported → 400 (Bad Request)
    /// - Internal → 500 (Internal Server Error)
    pub fn to_http_status(&self) -> u16 {
        match self {
            // 404 Not Found
            TransformError::SourceNotFound { .. } => 404,

            // 403 Forbidden
            TransformError::SourceForbidden { .. } => 403,

            // 413 Payload Too Large
            TransformError::SourceTooLarge { .. } => 413,

            // 400 Bad Request
            TransformError::Unsupported { .. } => 400,

            // 502 Bad Gateway
            TransformError::BackendFailed { .. } | TransformError::Interrupted => 502,

            // 500 Internal Server Error
            TransformError::Internal { .. } => 500,
        }
    }

    /// Helper constructors for common error patterns
    pub fn not_found(source: impl Into<String>) -> Self {
        TransformError::SourceNotFound {
            source: source.into(),
        }
    }

    pub fn forbidden(source: impl Into<String>) -> Self {
        TransformError::SourceForbidden {
            source: source.into(),
        }
    }

    pub fn too_large(source: impl Into<String>, size: u64, max_size: u64) -> Self {
        TransformError::SourceTooLarge {
            source: source.into(),
            size,
            max_size,
        }
    }

    pub fn backend(provider: impl Into<String>, message: impl Into<String>) -> Self {
        TransformError::BackendFailed {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn unsupported(provider: impl Into<String>) -> Self {
        TransformError::Unsupported {
            provider: provider.into(),
        }
    }

    pub fn interrupted() -> Self {
        TransformError::Interrupted
    }

    pub fn internal(message: impl Into<String>) -> Self {
        TransformError::Internal {
            message: message.into(),
        }
    }
}

/// Errors raised while building the provider registry from resolved
/// options at startup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderResolutionError {
    /// Configured provider name has no known implementation
    UnknownProvider { name: String },
    /// Provider settings are missing a required key
    InvalidSettings { provider: String, message: String },
    /// Static provider directory does not exist
    MissingStaticDir { dir: String },
}

impl fmt::Display for ProviderResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderResolutionError::UnknownProvider { name } => {
                write!(f, "Unknown provider: {}", name)
            }
            ProviderResolutionError::InvalidSettings { provider, message } => {
                write!(f, "Invalid settings for provider '{}': {}", provider, message)
            }
            ProviderResolutionError::MissingStaticDir { dir } => {
                write!(f, "Static image directory does not exist: {}", dir)
            }
        }
    }
}

impl std::error::Error for ProviderResolutionError {}

impl ProviderResolutionError {
    pub fn unknown(name: impl Into<String>) -> Self {
        ProviderResolutionError::UnknownProvider { name: name.into() }
    }

    pub fn invalid_settings(provider: impl Into<String>, message: impl Into<String>) -> Self {
        ProviderResolutionError::InvalidSettings {
            provider: provider.into(),
            message: message.into(),
        }
    }

    pub fn missing_static_dir(dir: impl Into<String>) -> Self {
        ProviderResolutionError::MissingStaticDir { dir: dir.into() }
    }
}
