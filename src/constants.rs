// Constants module - centralized default values for the image layer
//
// This module defines all default values used throughout the codebase.
// Using constants instead of magic numbers improves maintainability
// and makes it easier to understand and modify defaults.

// =============================================================================
// Options defaults
// =============================================================================

/// Default responsive width ladder, in ascending pixel order
pub const DEFAULT_SIZES: [u32; 6] = [320, 420, 768, 1024, 1200, 1600];

/// Provider selected when neither the environment nor the options name one
pub const DEFAULT_PROVIDER: &str = "static";

/// Environment variable that overrides the configured provider name
pub const PROVIDER_ENV_VAR: &str = "KAGAMI_PROVIDER";

/// Public URL prefix claimed by the serving middleware
pub const DEFAULT_BASE_URL: &str = "/_img";

/// Directory served by the static provider, relative to the working dir
pub const DEFAULT_STATIC_DIR: &str = "static";

/// Scratch directory for transformer backends
pub const DEFAULT_CACHE_DIR: &str = ".cache/kagami";

// =============================================================================
// Transform cache defaults
// =============================================================================

/// Completed transform entries retained in memory before LRU eviction
pub const DEFAULT_TRANSFORM_CACHE_CAPACITY: u64 = 1024;

/// Largest source file the static provider will read (50 MB)
pub const MAX_SOURCE_FILE_BYTES: u64 = 50 * 1024 * 1024;

// =============================================================================
// Serving defaults
// =============================================================================

/// Cache-Control applied to optimized responses. Transform output is
/// content-addressed, so far-future immutable caching is safe.
pub const IMMUTABLE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Fallback content type when the source extension is unrecognized
pub const FALLBACK_CONTENT_TYPE: &str = "application/octet-stream";

// =============================================================================
// Static generation defaults
// =============================================================================

/// Upper bound on concurrently rendered images during a generation run
pub const GENERATE_CONCURRENCY: usize = 8;
