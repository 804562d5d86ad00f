//! Provider registry
//!
//! A provider maps source locators onto images. The `static` provider
//! reads the local filesystem and can transform through the codec
//! boundary; `cloudinary` and `twicpics` generate CDN URLs and never
//! produce bytes themselves. The set of known providers is closed:
//! resolution fails at startup for any other name, so a running layer
//! never discovers a bad provider at request time.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::info;

use crate::config::ResolvedOptions;
use crate::transform::{OutputFormat, TransformParams};

pub mod cloudinary;
pub mod error;
pub mod static_dir;
pub mod transformer;
pub mod twicpics;

pub use cloudinary::CloudinaryProvider;
pub use error::{ProviderResolutionError, TransformError};
pub use static_dir::StaticProvider;
pub use transformer::{ImageTransformer, PassthroughTransformer, TransformedImage};
pub use twicpics::TwicPicsProvider;

/// Image source provider
#[async_trait]
pub trait Provider: Send + Sync {
    /// Registry name, e.g. `static`
    fn name(&self) -> &str;

    /// Whether this provider produces transformed bytes in-process.
    /// URL-generation providers return false and are never invoked by
    /// the serving path.
    fn supports_transform(&self) -> bool;

    /// Formats this provider can deliver
    fn output_formats(&self) -> Vec<OutputFormat> {
        vec![
            OutputFormat::Avif,
            OutputFormat::WebP,
            OutputFormat::Jpeg,
            OutputFormat::Png,
        ]
    }

    /// Provider-native URL for a source with the given parameters
    fn resolve_url(&self, source: &str, params: &TransformParams) -> String;

    /// Base URL advertised in the runtime export, if any
    fn runtime_base_url(&self) -> Option<String> {
        None
    }

    /// Fetch and transform a source
    ///
    /// Only invoked when `supports_transform()` is true; the default
    /// implementation refuses.
    async fn transform(
        &self,
        _source: &str,
        _params: &TransformParams,
    ) -> Result<TransformedImage, TransformError> {
        Err(TransformError::unsupported(self.name()))
    }
}

/// Resolved provider handles: one primary plus zero or more auxiliaries
/// addressable by name in per-image overrides.
pub struct ProviderRegistry {
    primary: Arc<dyn Provider>,
    auxiliary: BTreeMap<String, Arc<dyn Provider>>,
}

impl ProviderRegistry {
    /// Builds every configured provider. The primary resolves first,
    /// then auxiliary entries in lexicographic name order; an auxiliary
    /// entry named like the primary only contributes its settings and
    /// does not create a second handle.
    ///
    /// Any failure here is startup-fatal: requests are never served
    /// against a partially resolved registry.
    pub async fn resolve(
        options: &ResolvedOptions,
        transformer: Arc<dyn ImageTransformer>,
    ) -> Result<Self, ProviderResolutionError> {
        let primary = build_provider(&options.provider, options, &transformer).await?;
        info!(provider = primary.name(), "primary provider resolved");

        let mut auxiliary = BTreeMap::new();
        for name in options.providers.keys() {
            if name == &options.provider {
                continue;
            }
            let provider = build_provider(name, options, &transformer).await?;
            info!(provider = name.as_str(), "auxiliary provider resolved");
            auxiliary.insert(name.clone(), provider);
        }

        Ok(Self { primary, auxiliary })
    }

    pub fn primary(&self) -> &Arc<dyn Provider> {
        &self.primary
    }

    /// Handle for a named provider, primary included
    pub fn get(&self, name: &str) -> Option<&Arc<dyn Provider>> {
        if name == self.primary.name() {
            Some(&self.primary)
        } else {
            self.auxiliary.get(name)
        }
    }

    /// Every handle, primary first then auxiliaries in name order
    pub fn handles(&self) -> Vec<&Arc<dyn Provider>> {
        let mut handles = Vec::with_capacity(1 + self.auxiliary.len());
        handles.push(&self.primary);
        handles.extend(self.auxiliary.values());
        handles
    }
}

async fn build_provider(
    name: &str,
    options: &ResolvedOptions,
    transformer: &Arc<dyn ImageTransformer>,
) -> Result<Arc<dyn Provider>, ProviderResolutionError> {
    match name {
        "static" => {
            let provider = StaticProvider::new(
                &options.static_.dir,
                &options.static_.base_url,
                Arc::clone(transformer),
            )
            .await?;
            Ok(Arc::new(provider))
        }
        "cloudinary" => {
            let base_url = required_base_url(options, "cloudinary")?;
            Ok(Arc::new(CloudinaryProvider::new(&base_url)))
        }
        "twicpics" => {
            let base_url = required_base_url(options, "twicpics")?;
            Ok(Arc::new(TwicPicsProvider::new(&base_url)))
        }
        other => Err(ProviderResolutionError::unknown(other)),
    }
}

fn required_base_url(
    options: &ResolvedOptions,
    provider: &str,
) -> Result<String, ProviderResolutionError> {
    options
        .provider_settings(provider)
        .base_url
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ProviderResolutionError::invalid_settings(provider, "baseURL is required"))
}
