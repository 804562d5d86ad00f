//! Structured logging setup
//!
//! One global tracing subscriber, installed by the host at startup.
//! Library code only uses the `tracing` macros and never installs a
//! subscriber itself, so embedding hosts keep control of their own
//! logging.

use std::error::Error;

/// Install the global tracing subscriber.
///
/// The filter honors `RUST_LOG`; without it, `info` and above are
/// emitted. With `json` set, events are written as one JSON object per
/// line for log shippers.
///
/// Fails when a global subscriber is already installed.
pub fn init_subscriber(json: bool) -> Result<(), Box<dyn Error>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    if json {
        builder.json().try_init().map_err(|e| -> Box<dyn Error> { e })?;
    } else {
        builder.try_init().map_err(|e| -> Box<dyn Error> { e })?;
    }

    Ok(())
}
