//! Static generation bridge
//!
//! During a static build the host renders pages, rewrites image URLs to
//! hashed file names, and asks the bridge to materialize every planned
//! rendition on disk. URLs are parsed with the same parser and rendered
//! through the same cache path as the serving middleware, so a generated
//! file is byte-identical to the live response for its URL.
//!
//! Generation runs without an Accept header, so `auto` format requests
//! degrade to the source format. That keeps the planned file name a pure
//! function of the URL.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use regex::Regex;
use serde::Serialize;
use tracing::{info, warn};

use crate::cache::{TransformCache, TransformEntry};
use crate::config::ResolvedOptions;
use crate::constants::GENERATE_CONCURRENCY;
use crate::metrics::Metrics;
use crate::provider::ProviderRegistry;
use crate::serve::{ImageRequest, PreparedRequest};
use crate::transform::RequestError;

/// One artifact written by a generation run
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GeneratedArtifact {
    pub url: String,
    pub file_name: String,
    pub size_bytes: usize,
}

/// One URL the run could not materialize
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct GenerationFailure {
    pub url: String,
    pub reason: String,
}

/// Outcome of a generation run. Both lists are sorted by URL so repeated
/// runs over the same manifest report identically.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationReport {
    pub written: Vec<GeneratedArtifact>,
    pub failures: Vec<GenerationFailure>,
    pub finished_at: DateTime<Utc>,
}

impl GenerationReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Collects image URLs during rendering and materializes them afterwards
pub struct StaticGenerationBridge {
    options: Arc<ResolvedOptions>,
    registry: Arc<ProviderRegistry>,
    cache: Arc<TransformCache>,
    metrics: Arc<Metrics>,
    /// URL to planned output file name
    manifest: Mutex<BTreeMap<String, String>>,
}

impl StaticGenerationBridge {
    pub fn new(
        options: Arc<ResolvedOptions>,
        registry: Arc<ProviderRegistry>,
        cache: Arc<TransformCache>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            options,
            registry,
            cache,
            metrics,
            manifest: Mutex::new(BTreeMap::new()),
        }
    }

    /// Rewrites an image URL to its static path and records the pair for
    /// the next [`run`](Self::run). URLs outside the image prefix, and
    /// URLs that do not parse, come back unchanged.
    pub fn map_to_static(&self, url: &str) -> String {
        match self.plan(url) {
            Ok(Some(static_url)) => static_url,
            Ok(None) => url.to_string(),
            Err(err) => {
                warn!(url = url, error = %err, "image url left unmapped");
                url.to_string()
            }
        }
    }

    fn plan(&self, url: &str) -> Result<Option<String>, RequestError> {
        let (path, query) = split_url(url);
        let Some(request) = ImageRequest::parse(path, query, &self.options.static_.base_url)?
        else {
            return Ok(None);
        };

        let prepared = PreparedRequest::prepare(&request, None, &self.options, &self.registry)?;
        let file_name = prepared.key.file_name();
        self.manifest
            .lock()
            .insert(url.to_string(), file_name.clone());

        Ok(Some(format!(
            "{}/{}",
            self.options.static_.base_url, file_name
        )))
    }

    /// Extracts image URLs under the configured prefix from rendered page
    /// text. Deduplicated and sorted.
    pub fn discover(&self, html: &str) -> Vec<String> {
        let pattern = format!(
            r#"{}/[^\s"'<>)]+"#,
            regex::escape(&self.options.static_.base_url)
        );
        let regex = match Regex::new(&pattern) {
            Ok(regex) => regex,
            Err(err) => {
                warn!(error = %err, "discovery pattern failed to compile");
                return Vec::new();
            }
        };

        let mut found = BTreeSet::new();
        for hit in regex.find_iter(html) {
            found.insert(hit.as_str().to_string());
        }
        found.into_iter().collect()
    }

    /// Number of URLs currently planned for generation
    pub fn planned_count(&self) -> usize {
        self.manifest.lock().len()
    }

    /// Materializes every manifest entry into `out_dir`. Individual
    /// failures are collected in the report and never abort the run.
    pub async fn run(&self, out_dir: &Path) -> GenerationReport {
        let planned: Vec<(String, String)> = {
            let manifest = self.manifest.lock();
            manifest
                .iter()
                .map(|(url, file_name)| (url.clone(), file_name.clone()))
                .collect()
        };

        info!(
            planned = planned.len(),
            out_dir = %out_dir.display(),
            "generation run started"
        );

        if let Err(err) = tokio::fs::create_dir_all(out_dir).await {
            let failures: Vec<GenerationFailure> = planned
                .into_iter()
                .map(|(url, _)| GenerationFailure {
                    url,
                    reason: format!("output directory not writable: {err}"),
                })
                .collect();
            self.metrics.add_generation_failed(failures.len() as u64);
            return GenerationReport {
                written: Vec::new(),
                failures,
                finished_at: Utc::now(),
            };
        }

        let results: Vec<Result<GeneratedArtifact, GenerationFailure>> =
            stream::iter(planned.into_iter().map(|(url, file_name)| {
                let out_path = out_dir.join(&file_name);
                async move {
                    let entry = self.render(&url).await.map_err(|reason| {
                        GenerationFailure {
                            url: url.clone(),
                            reason,
                        }
                    })?;
                    tokio::fs::write(&out_path, &entry.bytes)
                        .await
                        .map_err(|err| GenerationFailure {
                            url: url.clone(),
                            reason: format!("write failed: {err}"),
                        })?;
                    Ok(GeneratedArtifact {
                        url,
                        file_name,
                        size_bytes: entry.size_bytes(),
                    })
                }
            }))
            .buffer_unordered(GENERATE_CONCURRENCY)
            .collect()
            .await;

        let mut written = Vec::new();
        let mut failures = Vec::new();
        for result in results {
            match result {
                Ok(artifact) => written.push(artifact),
                Err(failure) => {
                    warn!(url = failure.url.as_str(), reason = failure.reason.as_str(), "generation failed");
                    failures.push(failure);
                }
            }
        }
        written.sort_by(|a, b| a.url.cmp(&b.url));
        failures.sort_by(|a, b| a.url.cmp(&b.url));

        self.metrics.add_generation_written(written.len() as u64);
        self.metrics.add_generation_failed(failures.len() as u64);

        info!(
            written = written.len(),
            failed = failures.len(),
            "generation run finished"
        );

        GenerationReport {
            written,
            failures,
            finished_at: Utc::now(),
        }
    }

    /// Renders one URL through the shared transform cache
    async fn render(&self, url: &str) -> Result<TransformEntry, String> {
        let (path, query) = split_url(url);
        let request = ImageRequest::parse(path, query, &self.options.static_.base_url)
            .map_err(|err| err.to_string())?
            .ok_or_else(|| "url is outside the image prefix".to_string())?;
        let prepared = PreparedRequest::prepare(&request, None, &self.options, &self.registry)
            .map_err(|err| err.to_string())?;

        let provider = Arc::clone(&prepared.provider);
        let source = request.source.clone();
        let params = prepared.params.clone();
        self.cache
            .get_or_compute(prepared.key.clone(), move || async move {
                provider
                    .transform(&source, &params)
                    .await
                    .map(|image| TransformEntry::new(image.bytes, image.content_type))
            })
            .await
            .map_err(|err| err.to_string())
    }
}

fn split_url(url: &str) -> (&str, Option<&str>) {
    match url.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (url, None),
    }
}
