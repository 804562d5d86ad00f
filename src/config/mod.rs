// Options module
//
// Host applications hand the layer a sparse `RawOptions` tree. Resolution
// merges it with host-level options and built-in defaults into a
// `ResolvedOptions` value that every other component reads. Resolution is
// deterministic and pure: the same inputs always produce the same output,
// and the inputs are never mutated.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::constants::{
    DEFAULT_BASE_URL, DEFAULT_CACHE_DIR, DEFAULT_PROVIDER, DEFAULT_SIZES, DEFAULT_STATIC_DIR,
    PROVIDER_ENV_VAR,
};

pub mod error;

pub use error::ConfigError;

/// Image options as a host application provides them. Every field is
/// optional; resolution fills the gaps. External key names follow the
/// published options format (`baseURL`, `cacheDir`, `intersectOptions`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Vec<u32>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub presets: Option<Vec<Preset>>,

    #[serde(rename = "static", skip_serializing_if = "Option::is_none")]
    pub static_: Option<RawStaticOptions>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub internal_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub providers: Option<BTreeMap<String, ProviderSettings>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub intersect_options: Option<BTreeMap<String, serde_yaml::Value>>,

    /// Unrecognized top-level keys. Carried through resolution unchanged.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Static provider options before resolution.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct RawStaticOptions {
    #[serde(rename = "baseURL", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub clear_cache: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub accept: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sharp: Option<BTreeMap<String, serde_yaml::Value>>,
}

/// A named bundle of transform modifiers, exported to the runtime so
/// markup helpers can reference it by name.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Preset {
    pub name: String,

    #[serde(default)]
    pub modifiers: BTreeMap<String, serde_yaml::Value>,
}

/// Per-provider settings keyed by provider name in the options tree.
/// Unknown keys are kept so individual providers can read their own
/// extensions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ProviderSettings {
    #[serde(rename = "baseURL", skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Fully resolved static provider options. Every field has a concrete
/// value after resolution.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StaticOptions {
    /// URL prefix the serving middleware claims. Always has a leading
    /// slash and no trailing slash.
    #[serde(rename = "baseURL")]
    pub base_url: String,

    /// Directory source paths are resolved against.
    pub dir: PathBuf,

    /// When set, the on-disk scratch directory is removed at startup.
    pub clear_cache: bool,

    /// Scratch directory for transformer backends.
    pub cache_dir: PathBuf,

    /// MIME allowlist for format negotiation on the static route. Falls
    /// back to the top-level `accept` list when empty.
    pub accept: Vec<String>,

    /// Opaque backend settings passed to the image transformer.
    pub sharp: BTreeMap<String, serde_yaml::Value>,
}

/// The single source of truth read by providers, middleware, and the
/// generation bridge. Produced by [`ResolvedOptions::resolve`].
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedOptions {
    /// Name of the primary provider.
    pub provider: String,

    /// Responsive width ladder, ascending and deduplicated.
    pub sizes: Vec<u32>,

    pub presets: Vec<Preset>,

    #[serde(rename = "static")]
    pub static_: StaticOptions,

    /// Origin-local URL of the bound listener. Empty until a listener
    /// address is known.
    pub internal_url: String,

    pub providers: BTreeMap<String, ProviderSettings>,

    /// Global MIME allowlist for format negotiation.
    pub accept: Vec<String>,

    /// Options for viewport-intersection loading, exported verbatim to
    /// the runtime.
    pub intersect_options: BTreeMap<String, serde_yaml::Value>,

    /// Unrecognized keys carried through from the inputs, raw over host.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl RawOptions {
    /// Parses options YAML after substituting `${VAR_NAME}` references
    /// with environment variable values. Fails if a referenced variable
    /// is not set.
    pub fn from_yaml_with_env(yaml: &str) -> Result<Self, ConfigError> {
        let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
            .map_err(|e| ConfigError::Pattern(e.to_string()))?;

        // First, check that all referenced environment variables exist
        for caps in re.captures_iter(yaml) {
            let var_name = &caps[1];
            std::env::var(var_name).map_err(|_| ConfigError::MissingEnvVar(var_name.to_string()))?;
        }

        // Now perform the substitution (we know all vars exist)
        let substituted = re.replace_all(yaml, |caps: &regex::Captures| {
            std::env::var(&caps[1]).unwrap_or_default()
        });

        let options: RawOptions = serde_yaml::from_str(&substituted)?;
        Ok(options)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let yaml = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io {
            path: path.as_ref().display().to_string(),
            source: e,
        })?;
        Self::from_yaml_with_env(&yaml)
    }
}

impl ResolvedOptions {
    /// Merges raw options over host options over built-in defaults.
    ///
    /// Precedence is raw > host > default for every field. Mapping-valued
    /// fields (`providers`, `intersectOptions`, `static.sharp`) merge
    /// key-wise; arrays replace wholesale rather than concatenating, except
    /// `sizes` which is sanitized after merging. The environment variable
    /// named by [`PROVIDER_ENV_VAR`] overrides the provider when set
    /// non-empty.
    pub fn resolve(raw: &RawOptions, host: &RawOptions) -> Self {
        let env_provider = std::env::var(PROVIDER_ENV_VAR).ok();
        Self::resolve_with_provider_override(raw, host, env_provider.as_deref())
    }

    /// Same as [`resolve`](Self::resolve) with the environment read
    /// replaced by an explicit value, so resolution stays a pure function
    /// of its arguments.
    pub fn resolve_with_provider_override(
        raw: &RawOptions,
        host: &RawOptions,
        provider_override: Option<&str>,
    ) -> Self {
        let provider = provider_override
            .filter(|p| !p.is_empty())
            .map(String::from)
            .or_else(|| pick(&raw.provider, &host.provider))
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());

        let sizes = sanitize_sizes(pick(&raw.sizes, &host.sizes).as_deref());

        let mut extra = host.extra.clone();
        extra.extend(raw.extra.clone());

        ResolvedOptions {
            provider,
            sizes,
            presets: pick(&raw.presets, &host.presets).unwrap_or_default(),
            static_: resolve_static(raw.static_.as_ref(), host.static_.as_ref()),
            internal_url: pick(&raw.internal_url, &host.internal_url).unwrap_or_default(),
            providers: merge_maps(raw.providers.as_ref(), host.providers.as_ref()),
            accept: pick(&raw.accept, &host.accept).unwrap_or_default(),
            intersect_options: merge_maps(
                raw.intersect_options.as_ref(),
                host.intersect_options.as_ref(),
            ),
            extra,
        }
    }

    /// MIME allowlist effective for the static route: the static list
    /// when non-empty, otherwise the global list.
    pub fn effective_accept(&self) -> &[String] {
        if self.static_.accept.is_empty() {
            &self.accept
        } else {
            &self.static_.accept
        }
    }

    /// Settings block for a named provider, or empty defaults when the
    /// options tree does not mention it.
    pub fn provider_settings(&self, name: &str) -> ProviderSettings {
        self.providers.get(name).cloned().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.provider.is_empty() {
            return Err(ConfigError::Invalid("provider name is empty".to_string()));
        }
        if !self.static_.base_url.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "static.baseURL '{}' does not start with /",
                self.static_.base_url
            )));
        }
        if self.static_.base_url.len() > 1 && self.static_.base_url.ends_with('/') {
            return Err(ConfigError::Invalid(format!(
                "static.baseURL '{}' has a trailing slash",
                self.static_.base_url
            )));
        }
        if self.sizes.windows(2).any(|w| w[0] >= w[1]) {
            return Err(ConfigError::Invalid(
                "sizes ladder is not strictly ascending".to_string(),
            ));
        }
        Ok(())
    }
}

fn pick<T: Clone>(raw: &Option<T>, host: &Option<T>) -> Option<T> {
    raw.clone().or_else(|| host.clone())
}

fn pick_static<T: Clone>(
    raw: Option<&RawStaticOptions>,
    host: Option<&RawStaticOptions>,
    get: impl Fn(&RawStaticOptions) -> Option<T>,
) -> Option<T> {
    raw.and_then(|s| get(s)).or_else(|| host.and_then(|s| get(s)))
}

/// Key-wise merge for mapping-valued fields: host keys survive unless raw
/// names the same key, in which case raw's value replaces host's.
fn merge_maps<V: Clone>(
    raw: Option<&BTreeMap<String, V>>,
    host: Option<&BTreeMap<String, V>>,
) -> BTreeMap<String, V> {
    let mut merged = host.cloned().unwrap_or_default();
    if let Some(overrides) = raw {
        for (key, value) in overrides {
            merged.insert(key.clone(), value.clone());
        }
    }
    merged
}

fn resolve_static(
    raw: Option<&RawStaticOptions>,
    host: Option<&RawStaticOptions>,
) -> StaticOptions {
    StaticOptions {
        base_url: normalize_base_url(
            pick_static(raw, host, |s| s.base_url.clone())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .as_str(),
        ),
        dir: pick_static(raw, host, |s| s.dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_STATIC_DIR)),
        clear_cache: pick_static(raw, host, |s| s.clear_cache).unwrap_or(false),
        cache_dir: pick_static(raw, host, |s| s.cache_dir.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CACHE_DIR)),
        accept: pick_static(raw, host, |s| s.accept.clone()).unwrap_or_default(),
        sharp: merge_maps(
            raw.and_then(|s| s.sharp.as_ref()),
            host.and_then(|s| s.sharp.as_ref()),
        ),
    }
}

/// Drops non-positive widths, sorts ascending, and deduplicates. Missing,
/// empty, or entirely invalid input falls back to the default ladder.
fn sanitize_sizes(sizes: Option<&[u32]>) -> Vec<u32> {
    match sizes {
        Some(list) if !list.is_empty() => {
            let mut out: Vec<u32> = list.iter().copied().filter(|s| *s > 0).collect();
            out.sort_unstable();
            out.dedup();
            if out.is_empty() {
                DEFAULT_SIZES.to_vec()
            } else {
                out
            }
        }
        _ => DEFAULT_SIZES.to_vec(),
    }
}

/// Guarantees a leading slash and strips any trailing slash. Empty or
/// bare-slash input falls back to the default prefix.
fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_BASE_URL.to_string();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{}", trimmed)
    }
}
