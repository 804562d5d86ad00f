//! Format negotiation against the Accept header
//!
//! An `auto` format request resolves to the best concrete format that the
//! client accepts, the configured accept-list allows, and the provider can
//! emit. Explicit format requests are validated against the same two
//! allowlists. The result feeds transform key derivation, so negotiation
//! happens before any cache lookup.

use super::error::RequestError;
use super::params::OutputFormat;
use crate::constants::FALLBACK_CONTENT_TYPE;

/// Parsed Accept header preference
#[derive(Debug, Clone)]
struct FormatPreference {
    format: OutputFormat,
    quality: f32,
}

/// Resolve the output format for a request.
///
/// - `None`: no conversion requested, the source format is preserved.
/// - `auto`: pick the best candidate the client, the accept-list, and
///   the provider all agree on; `None` when they agree on nothing.
/// - explicit format: validated against the accept-list and the
///   provider's emittable formats.
///
/// `provider_formats` empty means the provider cannot transcode at all.
pub fn negotiate_format(
    requested: Option<OutputFormat>,
    accept_header: Option<&str>,
    configured_accept: &[String],
    provider_formats: &[OutputFormat],
) -> Result<Option<OutputFormat>, RequestError> {
    match requested {
        None => Ok(None),
        Some(OutputFormat::Auto) => Ok(auto_select(
            accept_header,
            configured_accept,
            provider_formats,
        )),
        Some(format) => {
            if !allowed_by_list(configured_accept, format) || !provider_formats.contains(&format) {
                return Err(RequestError::format_not_accepted(format.as_str()));
            }
            Ok(Some(format))
        }
    }
}

/// Candidate walk in compression-efficiency order, constrained by the
/// client's parsed preferences and both allowlists.
fn auto_select(
    accept_header: Option<&str>,
    configured_accept: &[String],
    provider_formats: &[OutputFormat],
) -> Option<OutputFormat> {
    let accept = accept_header?;
    let preferences = parse_accept_header(accept);

    for candidate in [
        OutputFormat::Avif,
        OutputFormat::WebP,
        OutputFormat::Jpeg,
        OutputFormat::Png,
    ] {
        if !is_format_acceptable(&preferences, candidate) {
            continue;
        }
        if !allowed_by_list(configured_accept, candidate) {
            continue;
        }
        if !provider_formats.contains(&candidate) {
            continue;
        }
        return Some(candidate);
    }

    None
}

/// An empty accept-list places no restriction.
fn allowed_by_list(configured: &[String], format: OutputFormat) -> bool {
    if configured.is_empty() {
        return true;
    }
    configured
        .iter()
        .any(|mime| OutputFormat::from_content_type(mime) == Some(format))
}

/// Parse Accept header into format preferences with quality values
fn parse_accept_header(accept: &str) -> Vec<FormatPreference> {
    let mut preferences = Vec::new();

    for part in accept.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        // Split on semicolon to get quality
        let (media_type, quality) = if let Some((mt, params)) = part.split_once(';') {
            (mt.trim(), parse_quality(params))
        } else {
            (part, 1.0)
        };

        if let Some(format) = parse_image_media_type(media_type) {
            preferences.push(FormatPreference { format, quality });
        }
    }

    // Sort by quality (highest first)
    preferences.sort_by(|a, b| {
        b.quality
            .partial_cmp(&a.quality)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    preferences
}

/// Parse quality value from parameters (e.g., "q=0.8")
fn parse_quality(params: &str) -> f32 {
    for param in params.split(';') {
        let param = param.trim();
        if let Some(q) = param.strip_prefix("q=") {
            if let Ok(quality) = q.parse::<f32>() {
                return quality.clamp(0.0, 1.0);
            }
        }
    }
    1.0
}

/// Parse image media type to OutputFormat
fn parse_image_media_type(media_type: &str) -> Option<OutputFormat> {
    match media_type.to_lowercase().as_str() {
        "image/avif" => Some(OutputFormat::Avif),
        "image/webp" => Some(OutputFormat::WebP),
        "image/jpeg" | "image/jpg" => Some(OutputFormat::Jpeg),
        "image/png" => Some(OutputFormat::Png),
        "image/*" | "*/*" => Some(OutputFormat::Auto), // Wildcard
        _ => None,
    }
}

/// Check if a format is acceptable based on parsed preferences
fn is_format_acceptable(preferences: &[FormatPreference], format: OutputFormat) -> bool {
    for pref in preferences {
        // Exact match with non-zero quality
        if pref.format == format && pref.quality > 0.0 {
            return true;
        }

        // Wildcard match
        if pref.format == OutputFormat::Auto && pref.quality > 0.0 {
            return true;
        }
    }

    false
}

/// Content type derived from a source path's extension
pub fn source_content_type(source: &str) -> &'static str {
    let ext = std::path::Path::new(source)
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match ext.to_ascii_lowercase().as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "avif" => "image/avif",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        "ico" => "image/x-icon",
        _ => FALLBACK_CONTENT_TYPE,
    }
}

/// Get the Vary header value for negotiated responses
pub fn vary_header() -> &'static str {
    "Accept"
}
