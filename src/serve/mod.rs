//! Serving middleware
//!
//! Handles requests under the configured image prefix and hands every
//! other request back to the host untouched. Two request grammars are
//! accepted:
//!
//! 1. Query parameters: `/_img/logo.png?w=300&q=80&f=webp`
//! 2. Path options segment: `/_img/w:300,q:80,f:webp/logo.png`
//!
//! Path-segment parameters win over query parameters field by field.
//! An optional `provider` query parameter addresses an auxiliary
//! provider by name. All failures become structured JSON responses;
//! this module never panics on request input.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::Utc;
use http::{header, Method, Request, Response, StatusCode};
use tracing::{info, warn};
use uuid::Uuid;

use crate::cache::{TransformCache, TransformEntry, TransformKey};
use crate::config::ResolvedOptions;
use crate::constants::IMMUTABLE_CACHE_CONTROL;
use crate::metrics::Metrics;
use crate::provider::{Provider, ProviderRegistry, TransformError};
use crate::transform::{
    negotiate_format, vary_header, OutputFormat, RequestError, TransformParams,
};

/// Middleware verdict for one request
pub enum Outcome {
    /// The request is not under the image prefix; the host serves it
    PassThrough,
    /// A complete response for a request under the prefix
    Response(Response<Bytes>),
}

/// A decoded request under the image prefix
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageRequest {
    /// Source locator with a leading slash, percent-decoded
    pub source: String,
    pub params: TransformParams,
    /// Per-request provider override from the `provider` query parameter
    pub provider: Option<String>,
}

impl ImageRequest {
    /// Decodes a path and query against the image prefix.
    ///
    /// Returns `Ok(None)` when the path is not under `base_url`; that is
    /// the pass-through signal, not an error. Paths under the prefix
    /// that fail to decode are errors.
    pub fn parse(
        path: &str,
        query: Option<&str>,
        base_url: &str,
    ) -> Result<Option<ImageRequest>, RequestError> {
        let rest = match path.strip_prefix(base_url) {
            None => return Ok(None),
            // A sibling path like `/_imgs/...` shares the prefix bytes
            // but is not ours
            Some(rest) if !rest.is_empty() && !rest.starts_with('/') => return Ok(None),
            Some(rest) => rest,
        };

        let rest = rest.trim_start_matches('/');
        if rest.is_empty() {
            return Err(RequestError::malformed("missing source locator"));
        }

        let query_map = parse_query(query)?;
        let query_params = TransformParams::from_query(&query_map)?;

        let (segment_params, encoded_source) = match rest.split_once('/') {
            Some((first, remainder)) if is_options_segment(first) => {
                (Some(TransformParams::from_path_segment(first)?), remainder)
            }
            None if is_options_segment(rest) => {
                return Err(RequestError::malformed("missing source locator"));
            }
            _ => (None, rest),
        };

        if encoded_source.is_empty() {
            return Err(RequestError::malformed("missing source locator"));
        }

        let decoded = urlencoding::decode(encoded_source)
            .map_err(|_| RequestError::malformed("source is not valid UTF-8"))?;
        let source = format!("/{}", decoded);

        let params = match segment_params {
            Some(path_params) => merge_params(path_params, query_params),
            None => query_params,
        };

        let provider = query_map
            .get("provider")
            .filter(|name| !name.is_empty())
            .cloned();

        Ok(Some(ImageRequest {
            source,
            params,
            provider,
        }))
    }
}

/// A request bound to a provider with its format negotiated and its
/// cache key derived. Shared by the middleware and the generation
/// bridge so both produce identical keys for identical URLs.
pub struct PreparedRequest {
    pub provider: Arc<dyn Provider>,
    pub params: TransformParams,
    pub key: TransformKey,
    /// True when the client asked for `auto`; responses then carry a
    /// Vary header because the outcome depends on the Accept header
    pub vary_accept: bool,
}

impl PreparedRequest {
    pub fn prepare(
        request: &ImageRequest,
        accept_header: Option<&str>,
        options: &ResolvedOptions,
        registry: &ProviderRegistry,
    ) -> Result<Self, RequestError> {
        let provider = match &request.provider {
            Some(name) => registry
                .get(name)
                .ok_or_else(|| RequestError::unknown_provider(name.clone()))?,
            None => registry.primary(),
        };

        if !provider.supports_transform() {
            return Err(RequestError::not_servable(provider.name()));
        }

        let vary_accept = request.params.format == Some(OutputFormat::Auto);
        let negotiated = negotiate_format(
            request.params.format,
            accept_header,
            options.effective_accept(),
            &provider.output_formats(),
        )?;

        let params = request.params.clone().with_format(negotiated);
        let key = TransformKey::new(provider.name(), &request.source, &params);

        Ok(Self {
            provider: Arc::clone(provider),
            params,
            key,
            vary_accept,
        })
    }
}

/// Request handler for the image prefix
pub struct ServingMiddleware {
    options: Arc<ResolvedOptions>,
    registry: Arc<ProviderRegistry>,
    cache: Arc<TransformCache>,
    metrics: Arc<Metrics>,
}

impl ServingMiddleware {
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
        }
    }

    /// Handles one request. Paths outside the image prefix come back as
    /// [`Outcome::PassThrough`]; everything else is answered, errors
    /// included.
    pub async fn handle<B>(&self, req: &Request<B>) -> Outcome {
        let path = req.uri().path();
        let parsed = ImageRequest::parse(path, req.uri().query(), &self.options.static_.base_url);

        if matches!(parsed, Ok(None)) {
            self.metrics.increment_pass_through();
            return Outcome::PassThrough;
        }

        let started = Instant::now();
        let request_id = Uuid::new_v4();
        self.metrics.increment_request_count();
        self.metrics.increment_method_count(req.method().as_str());

        let response = match check_method(req.method()) {
            Err(err) => self.request_error_response(&err, request_id),
            Ok(head_only) => match parsed {
                Ok(Some(image_request)) => {
                    let accept = header_str(req, header::ACCEPT);
                    let if_none_match = header_str(req, header::IF_NONE_MATCH);
                    self.serve_image(image_request, accept, if_none_match, head_only, request_id)
                        .await
                }
                Err(err) => self.request_error_response(&err, request_id),
                // Pass-through was returned above
                Ok(None) => self.request_error_response(
                    &RequestError::malformed("missing source locator"),
                    request_id,
                ),
            },
        };

        let status = response.status().as_u16();
        self.metrics.increment_status_count(status);
        let duration_ms = started.elapsed().as_secs_f64() * 1000.0;
        self.metrics.record_duration(duration_ms);

        info!(
            request_id = %request_id,
            method = %req.method(),
            path = path,
            status = status,
            duration_ms = duration_ms as u64,
            "image request"
        );

        Outcome::Response(response)
    }

    async fn serve_image(
        &self,
        request: ImageRequest,
        accept: Option<String>,
        if_none_match: Option<String>,
        head_only: bool,
        request_id: Uuid,
    ) -> Response<Bytes> {
        let prepared = match PreparedRequest::prepare(
            &request,
            accept.as_deref(),
            &self.options,
            &self.registry,
        ) {
            Ok(prepared) => prepared,
            Err(err) => return self.request_error_response(&err, request_id),
        };

        self.metrics.increment_provider_count(prepared.provider.name());

        // Conditional requests are answered before any transform work;
        // the fingerprint is a strong validator because equal keys mean
        // byte-identical output
        if let Some(candidates) = if_none_match.as_deref() {
            if etag_matches(candidates, &prepared.key.etag()) {
                self.metrics.increment_not_modified();
                return self.not_modified_response(&prepared);
            }
        }

        let request_time = Utc::now();
        let compute_started = Instant::now();

        let provider = Arc::clone(&prepared.provider);
        let source = request.source.clone();
        let params = prepared.params.clone();
        let result = self
            .cache
            .get_or_compute(prepared.key.clone(), move || async move {
                provider
                    .transform(&source, &params)
                    .await
                    .map(|image| TransformEntry::new(image.bytes, image.content_type))
            })
            .await;

        match result {
            Ok(entry) => {
                let fresh = entry.created_at >= request_time;
                if fresh {
                    self.metrics
                        .record_transform_duration(compute_started.elapsed().as_secs_f64() * 1000.0);
                }
                self.success_response(&prepared, entry, fresh, head_only)
            }
            Err(err) => {
                warn!(
                    request_id = %request_id,
                    source = request.source.as_str(),
                    error = %err,
                    "transform failed"
                );
                self.transform_error_response(&err, request_id)
            }
        }
    }

    fn success_response(
        &self,
        prepared: &PreparedRequest,
        entry: TransformEntry,
        fresh: bool,
        head_only: bool,
    ) -> Response<Bytes> {
        let mut builder = Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, entry.content_type.as_str())
            .header(header::CONTENT_LENGTH, entry.size_bytes())
            .header(header::CACHE_CONTROL, IMMUTABLE_CACHE_CONTROL)
            .header(header::ETAG, prepared.key.etag())
            .header("x-cache-status", if fresh { "MISS" } else { "HIT" });

        if prepared.vary_accept {
            builder = builder.header(header::VARY, vary_header());
        }

        let body = if head_only { Bytes::new() } else { entry.bytes };
        finalize(builder, body)
    }

    fn not_modified_response(&self, prepared: &PreparedRequest) -> Response<Bytes> {
        let mut builder = Response::builder()
            .status(StatusCode::NOT_MODIFIED)
            .header(header::CACHE_CONTROL, IMMUTABLE_CACHE_CONTROL)
            .header(header::ETAG, prepared.key.etag());

        if prepared.vary_accept {
            builder = builder.header(header::VARY, vary_header());
        }

        finalize(builder, Bytes::new())
    }

    fn request_error_response(&self, err: &RequestError, request_id: Uuid) -> Response<Bytes> {
        let mut response = error_response(err.to_http_status(), &err.to_string(), request_id);
        if matches!(err, RequestError::MethodNotAllowed { .. }) {
            response
                .headers_mut()
                .insert(header::ALLOW, header::HeaderValue::from_static("GET, HEAD"));
        }
        response
    }

    fn transform_error_response(&self, err: &TransformError, request_id: Uuid) -> Response<Bytes> {
        error_response(err.to_http_status(), &err.to_string(), request_id)
    }
}

fn check_method(method: &Method) -> Result<bool, RequestError> {
    match *method {
        Method::GET => Ok(false),
        Method::HEAD => Ok(true),
        _ => Err(RequestError::MethodNotAllowed {
            method: method.to_string(),
        }),
    }
}

fn header_str<B>(req: &Request<B>, name: header::HeaderName) -> Option<String> {
    req.headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(String::from)
}

/// A path segment is an options segment when it holds `key:value` pairs
fn is_options_segment(segment: &str) -> bool {
    segment.contains(':')
}

fn merge_params(path: TransformParams, query: TransformParams) -> TransformParams {
    TransformParams {
        width: path.width.or(query.width),
        height: path.height.or(query.height),
        quality: path.quality.or(query.quality),
        format: path.format.or(query.format),
    }
}

fn parse_query(query: Option<&str>) -> Result<HashMap<String, String>, RequestError> {
    let mut map = HashMap::new();
    let Some(query) = query else {
        return Ok(map);
    };

    for pair in query.split('&') {
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once('=').unwrap_or((pair, ""));
        let key = urlencoding::decode(key)
            .map_err(|_| RequestError::malformed("query key is not valid UTF-8"))?;
        let value = urlencoding::decode(value)
            .map_err(|_| RequestError::malformed("query value is not valid UTF-8"))?;
        map.insert(key.into_owned(), value.into_owned());
    }

    Ok(map)
}

fn etag_matches(header_value: &str, etag: &str) -> bool {
    header_value.split(',').map(str::trim).any(|candidate| {
        candidate == "*" || candidate == etag || candidate.strip_prefix("W/") == Some(etag)
    })
}

fn error_response(status: u16, message: &str, request_id: Uuid) -> Response<Bytes> {
    let body = serde_json::json!({
        "error": message,
        "status": status,
        "request_id": request_id.to_string(),
    })
    .to_string();

    finalize(
        Response::builder()
            .status(StatusCode::from_u16(status).unwrap_or(StatusCode::BAD_REQUEST))
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::CONTENT_LENGTH, body.len()),
        Bytes::from(body),
    )
}

fn finalize(builder: http::response::Builder, body: Bytes) -> Response<Bytes> {
    builder.body(body).unwrap_or_else(|_| {
        let mut response = Response::new(Bytes::new());
        *response.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
        response
    })
}
