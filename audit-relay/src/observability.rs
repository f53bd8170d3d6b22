//! Tracing subscriber setup
//!
//! Envelopes written by [`TracingStream`](crate::sink::TracingStream) use the
//! `audit_relay::stream` target, so they can be filtered separately from the
//! pipeline's own diagnostics, e.g. `info,audit_relay::stream=debug`.

use tracing_subscriber::EnvFilter;

use crate::{
    config::Config,
    error::{Error, Result},
};

/// Install the global subscriber
///
/// `service.log_level` is an `EnvFilter` directive; an invalid directive
/// falls back to `info`. `service.log_format = "text"` selects the human
/// readable formatter, anything else JSON.
pub fn init_tracing(config: &Config) -> Result<()> {
    let log_level = config.service.log_level.clone();
    let filter = EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    let installed = if config.service.log_format.eq_ignore_ascii_case("text") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
    } else {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .try_init()
    };

    installed.map_err(|e| Error::Configuration(format!("Failed to install tracing subscriber: {}", e)))?;

    tracing::info!("Tracing initialized for service: {}", config.service.name);

    Ok(())
}
