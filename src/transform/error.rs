//! Request-level error types
//!
//! Covers everything wrong with a client request before any provider
//! work starts: malformed locators, bad parameters, and unsupported
//! methods or providers. Each variant maps to an HTTP status.

use std::fmt;

/// Errors raised while decoding and validating an optimization request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    /// Request path under the image prefix could not be decoded
    MalformedLocator { message: String },
    /// A transform parameter failed validation
    InvalidParameter { param: String, message: String },
    /// Request named a provider the registry does not know
    UnknownProvider { name: String },
    /// Provider exists but cannot serve transform requests
    ProviderNotServable { name: String },
    /// Requested output format is not available for this request
    FormatNotAccepted { format: String },
    /// Only GET and HEAD are served on the image route
    MethodNotAllowed { method: String },
}

impl fmt::Display for RequestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestError::MalformedLocator { message } => {
                write!(f, "Malformed image locator: {}", message)
            }
            RequestError::InvalidParameter { param, message } => {
                write!(f, "Invalid parameter '{}': {}", param, message)
            }
            RequestError::UnknownProvider { name } => {
                write!(f, "Unknown provider: {}", name)
            }
            RequestError::ProviderNotServable { name } => {
                write!(f, "Provider '{}' does not serve transform requests", name)
            }
            RequestError::FormatNotAccepted { format } => {
                write!(f, "Requested format '{}' is not available", format)
            }
            RequestError::MethodNotAllowed { method } => {
                write!(f, "Method {} not allowed on image route", method)
            }
        }
    }
}

impl std::error::Error for RequestError {}

impl RequestError {
    /// Maps request errors to HTTP status codes
    ///
    /// Status mapping:
    /// - MethodNotAllowed → 405
    /// - everything else → 400 (Bad Request)
    pub fn to_http_status(&self) -> u16 {
        match self {
            RequestError::MethodNotAllowed { .. } => 405,
            _ => 400,
        }
    }

    /// Helper constructors for common error patterns
    pub fn malformed(message: impl Into<String>) -> Self {
        RequestError::MalformedLocator {
            message: message.into(),
        }
    }

    pub fn invalid_param(param: impl Into<String>, message: impl Into<String>) -> Self {
        RequestError::InvalidParameter {
            param: param.into(),
            message: message.into(),
        }
    }

    pub fn unknown_provider(name: impl Into<String>) -> Self {
        RequestError::UnknownProvider { name: name.into() }
    }

    pub fn not_servable(name: impl Into<String>) -> Self {
        RequestError::ProviderNotServable { name: name.into() }
    }

    pub fn format_not_accepted(format: impl Into<String>) -> Self {
        RequestError::FormatNotAccepted {
            format: format.into(),
        }
    }
}
