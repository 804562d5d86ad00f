//! Runtime options export
//!
//! A read-only projection of the resolved options for client-side code:
//! the width ladder, presets, provider summaries, and the bound listener
//! URL once known. Serialized with the published camelCase field names
//! so client helpers read it without translation. How the JSON reaches
//! the client bundle is the host's business.

use serde::Serialize;

use crate::config::{Preset, ResolvedOptions};
use crate::provider::ProviderRegistry;
use std::collections::BTreeMap;

/// What client code may know about one provider
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeProvider {
    pub name: String,

    #[serde(rename = "baseURL", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    pub can_transform: bool,
}

/// Read-only subset of the resolved options for the client bundle
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RuntimeOptions {
    /// Primary provider name
    pub provider: String,

    pub sizes: Vec<u32>,

    pub presets: Vec<Preset>,

    /// Viewport-intersection loader options, carried verbatim
    pub intersect_options: BTreeMap<String, serde_yaml::Value>,

    pub accept: Vec<String>,

    /// Primary first, then auxiliaries in registry order
    pub providers: Vec<RuntimeProvider>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_url: Option<String>,
}

impl RuntimeOptions {
    /// Projects the resolved options and registry into the export shape.
    ///
    /// `internal_url` is the bound listener URL when one is known; when
    /// absent, a non-empty configured `internalUrl` is used instead.
    pub fn from_resolved(
        options: &ResolvedOptions,
        registry: &ProviderRegistry,
        internal_url: Option<&str>,
    ) -> Self {
        let providers = registry
            .handles()
            .into_iter()
            .map(|provider| RuntimeProvider {
                name: provider.name().to_string(),
                base_url: provider.runtime_base_url(),
                can_transform: provider.supports_transform(),
            })
            .collect();

        let internal_url = internal_url
            .map(String::from)
            .or_else(|| (!options.internal_url.is_empty()).then(|| options.internal_url.clone()));

        Self {
            provider: options.provider.clone(),
            sizes: options.sizes.clone(),
            presets: options.presets.clone(),
            intersect_options: options.intersect_options.clone(),
            accept: options.accept.clone(),
            providers,
            internal_url,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
