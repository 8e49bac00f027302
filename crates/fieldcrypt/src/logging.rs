//! Process-wide log setup: `tracing` subscriber plus a bridge for `log` records.

use thiserror::Error;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, LogSettings};

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Logging already initialized: {0}")]
    AlreadyInitialized(String),
}

/// Installs the global subscriber. `RUST_LOG` wins over `settings.level`.
///
/// Fails if a logger or subscriber is already installed; callers that may
/// run this twice can ignore the error.
pub fn init_logging(settings: &LogSettings) -> Result<(), LoggingError> {
    let env = std::env::var(EnvFilter::DEFAULT_ENV).ok();
    let filter = build_filter(&settings.level, env.as_deref())?;

    let (text, json) = match settings.format {
        LogFormat::Text => (Some(fmt::layer().with_target(true)), None),
        LogFormat::Json => (None, Some(fmt::layer().json().with_current_span(true))),
    };

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(text)
        .with(json);

    tracing_log::LogTracer::init().map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;
    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))?;

    tracing::debug!(format = ?settings.format, "Logging initialized");
    Ok(())
}

/// Prefers a non-empty environment filter over the configured level.
fn build_filter(level: &str, env: Option<&str>) -> Result<EnvFilter, LoggingError> {
    let directive = env
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(level);

    EnvFilter::try_new(directive).map_err(|e| LoggingError::InvalidFilter {
        filter: directive.to_string(),
        reason: e.to_string(),
    })
}
