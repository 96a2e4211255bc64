//! Observability bootstrap.
//!
//! Installs the tracing subscriber stack (env-filter + fmt + error layer)
//! and miette's fancy report/panic hooks. Call once from the host binary;
//! libraries embedding pulseline can skip this and install their own.

use miette::Diagnostic;
use thiserror::Error;
use tracing_error::ErrorLayer;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize tracing and miette for a host process.
///
/// The filter honors `RUST_LOG`, defaulting to `info`.
pub fn init() -> Result<(), TelemetryError> {
    init_with_filter(
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    )
}

/// Initialize with an explicit filter (useful in tests).
pub fn init_with_filter(filter: EnvFilter) -> Result<(), TelemetryError> {
    miette::set_panic_hook();
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(ErrorLayer::default())
        .try_init()
        .map_err(|source| TelemetryError::AlreadyInitialized {
            message: source.to_string(),
        })
}

#[derive(Debug, Error, Diagnostic)]
pub enum TelemetryError {
    /// A global subscriber was already installed.
    #[error("telemetry already initialized: {message}")]
    #[diagnostic(
        code(pulseline::telemetry::already_initialized),
        help("Call telemetry::init once, from the host binary only.")
    )]
    AlreadyInitialized { message: String },
}
