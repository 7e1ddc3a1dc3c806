//! Errors raised while swapping delegates and building provider sets.
use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for reconfiguration operations.
pub type ReconfigureResult<T> = Result<T, ReconfigureError>;

/// Errors returned when a reconfiguration cannot be applied.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ReconfigureError {
    /// The replacement delegate does not offer a capability the handle was
    /// created with.
    #[error("delegate `{delegate}` does not provide the `{capability}` capability of the delegate it replaces")]
    CapabilityMismatch {
        /// Type name of the rejected delegate.
        delegate: &'static str,
        /// Name of the missing capability.
        capability: &'static str,
    },

    /// An exporter for the given signal could not be created.
    #[error("failed to build {signal} exporter: {reason}")]
    ExporterBuild {
        /// `traces`, `metrics` or `logs`.
        signal: &'static str,
        /// Error reported by the exporter builder.
        reason: String,
    },

    /// A configuration property holds a value this crate does not support.
    #[error("unsupported value `{value}` for `{key}`")]
    UnsupportedValue {
        /// Normalized property name.
        key: String,
        /// Offending value.
        value: String,
    },

    /// A configuration property could not be parsed.
    #[error("invalid value `{value}` for `{key}`: {reason}")]
    InvalidValue {
        /// Normalized property name.
        key: String,
        /// Offending value.
        value: String,
        /// Why parsing failed.
        reason: String,
    },

    /// The process signal handler could not be installed.
    #[error("failed to install the shutdown hook: {0}")]
    ShutdownHook(String),
}

/// Errors raised while shutting down a retired provider set.
///
/// These are never returned from [`TelemetryFacade::configure`]; the facade
/// only logs them.
///
/// [`TelemetryFacade::configure`]: crate::TelemetryFacade::configure
#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ShutdownError {
    /// Shutdown did not complete within the allotted time.
    #[error("shutdown timed out after {0:?}")]
    Timeout(Duration),

    /// One or more providers reported a failure.
    #[error("shutdown failed: {0}")]
    Failed(String),

    /// The shutdown routine panicked.
    #[error("shutdown panicked")]
    Panicked,
}
