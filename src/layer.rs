//! Layer lifecycle
//!
//! [`ImageLayer`] owns everything the image pipeline needs: resolved
//! options, the provider registry, the transform cache, and metrics.
//! `initialize` runs the whole startup sequence; nothing can serve a
//! request before every provider has resolved, so a misconfigured
//! provider fails the process instead of the first unlucky request.
//!
//! The layer hands out middleware and bridge instances over shared
//! handles. There is no global state; two layers in one process stay
//! fully independent.

use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, OnceLock};

use tracing::{info, warn};

use crate::cache::{CacheStats, TransformCache};
use crate::config::{ConfigError, RawOptions, ResolvedOptions};
use crate::constants::DEFAULT_TRANSFORM_CACHE_CAPACITY;
use crate::generate::StaticGenerationBridge;
use crate::metrics::Metrics;
use crate::provider::{ImageTransformer, ProviderRegistry, ProviderResolutionError};
use crate::runtime::RuntimeOptions;
use crate::serve::ServingMiddleware;

/// Startup failure. Both variants are fatal; the layer never comes up
/// half-initialized.
#[derive(Debug)]
pub enum InitError {
    Config(ConfigError),
    Provider(ProviderResolutionError),
}

impl std::fmt::Display for InitError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InitError::Config(err) => write!(f, "options error: {}", err),
            InitError::Provider(err) => write!(f, "provider error: {}", err),
        }
    }
}

impl std::error::Error for InitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            InitError::Config(err) => Some(err),
            InitError::Provider(err) => Some(err),
        }
    }
}

impl From<ConfigError> for InitError {
    fn from(err: ConfigError) -> Self {
        InitError::Config(err)
    }
}

impl From<ProviderResolutionError> for InitError {
    fn from(err: ProviderResolutionError) -> Self {
        InitError::Provider(err)
    }
}

/// The initialized image pipeline
pub struct ImageLayer {
    options: Arc<ResolvedOptions>,
    registry: Arc<ProviderRegistry>,
    cache: Arc<TransformCache>,
    metrics: Arc<Metrics>,
    /// Bound listener URL, set at most once
    internal_url: OnceLock<String>,
}

impl ImageLayer {
    /// Runs the startup sequence: resolve and validate options, honor
    /// `clearCache`, resolve every provider, build the cache.
    ///
    /// A `clearCache` removal failure is logged and ignored; a provider
    /// resolution failure aborts initialization.
    pub async fn initialize(
        raw: &RawOptions,
        host: &RawOptions,
        transformer: Arc<dyn ImageTransformer>,
    ) -> Result<Self, InitError> {
        let options = ResolvedOptions::resolve(raw, host);
        options.validate()?;

        if options.static_.clear_cache {
            clear_cache_dir(&options.static_.cache_dir);
        }

        let registry = ProviderRegistry::resolve(&options, transformer).await?;

        info!(
            provider = options.provider.as_str(),
            base_url = options.static_.base_url.as_str(),
            cache_capacity = DEFAULT_TRANSFORM_CACHE_CAPACITY,
            "image layer initialized"
        );

        Ok(Self {
            options: Arc::new(options),
            registry: Arc::new(registry),
            cache: Arc::new(TransformCache::new(DEFAULT_TRANSFORM_CACHE_CAPACITY)),
            metrics: Arc::new(Metrics::new()),
            internal_url: OnceLock::new(),
        })
    }

    /// Request handler over shared handles. Instances are cheap; one per
    /// connection or one per process both work.
    pub fn middleware(&self) -> ServingMiddleware {
        ServingMiddleware::new(
            Arc::clone(&self.options),
            Arc::clone(&self.registry),
            Arc::clone(&self.cache),
            Arc::clone(&self.metrics),
        )
    }

    /// Generation bridge sharing this layer's cache, so generated files
    /// and live responses come from the same entries.
    pub fn before_generate(&self) -> StaticGenerationBridge {
        StaticGenerationBridge::new(
            Arc::clone(&self.options),
            Arc::clone(&self.registry),
            Arc::clone(&self.cache),
            Arc::clone(&self.metrics),
        )
    }

    /// Records the bound listener address. Only the first call takes
    /// effect; repeats are logged and ignored.
    pub fn on_listener_bound(&self, addr: SocketAddr) {
        let url = format!("http://{}", addr);
        match self.internal_url.set(url.clone()) {
            Ok(()) => info!(internal_url = url.as_str(), "listener bound"),
            Err(_) => warn!(
                ignored = url.as_str(),
                "listener already bound, address ignored"
            ),
        }
    }

    /// Read-only options projection for client code
    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions::from_resolved(
            &self.options,
            &self.registry,
            self.internal_url.get().map(String::as_str),
        )
    }

    /// Drops every cached rendition
    pub async fn clear_cache(&self) {
        self.cache.clear().await;
        info!("transform cache cleared");
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Prometheus text exposition of request and cache metrics
    pub fn metrics_text(&self) -> String {
        self.metrics.export_prometheus(&self.cache.stats())
    }

    pub fn options(&self) -> &Arc<ResolvedOptions> {
        &self.options
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }
}

fn clear_cache_dir(dir: &Path) {
    match std::fs::remove_dir_all(dir) {
        Ok(()) => info!(dir = %dir.display(), "cache directory cleared"),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
        Err(err) => warn!(
            dir = %dir.display(),
            error = %err,
            "cache directory not cleared"
        ),
    }
}
