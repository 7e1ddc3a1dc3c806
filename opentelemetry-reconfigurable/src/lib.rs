//! Hot-reconfigurable OpenTelemetry providers.
//!
//! Applications obtain tracers, meters, loggers and event loggers once, from
//! the providers of a [`TelemetryFacade`], and keep them for as long as they
//! like. Every call to [`TelemetryFacade::configure`] builds a new SDK and
//! installs it behind all of those handles at once; the previous SDK is then
//! shut down. Until an SDK is configured, and after
//! [`TelemetryFacade::close`], every handle is a no-op.
//!
//! # Getting started
//!
//! ```no_run
//! use opentelemetry::trace::{Tracer, TracerProvider};
//! use opentelemetry_reconfigurable::TelemetryFacade;
//! use opentelemetry_sdk::Resource;
//! use std::collections::HashMap;
//!
//! let facade = TelemetryFacade::default();
//! let tracer = facade.tracer_provider().tracer("checkout");
//!
//! // no-op until configured
//! tracer.in_span("warmup", |_| {});
//!
//! let properties = HashMap::from([(
//!     "otel.exporter.otlp.endpoint".to_string(),
//!     "http://localhost:4318".to_string(),
//! )]);
//! facade
//!     .configure(&properties, Resource::builder().build(), false)
//!     .expect("valid configuration");
//!
//! // the same tracer now exports through OTLP
//! tracer.in_span("order", |_| {});
//!
//! facade.close();
//! ```
//!
//! # Crate Feature Flags
//!
//! * `internal-logs`: routes the crate's own diagnostics through the
//!   `opentelemetry` internal logging macros. Enabled by default.
//! * `grpc-tonic`: allows `otel.exporter.otlp.protocol=grpc` in
//!   [`sdk::AutoConfigure`].
#![warn(
    future_incompatible,
    missing_debug_implementations,
    missing_docs,
    nonstandard_style,
    rust_2018_idioms,
    unreachable_pub,
    unused
)]
#![cfg_attr(docsrs, feature(doc_cfg), deny(rustdoc::broken_intra_doc_links))]
#![doc(
    html_logo_url = "https://raw.githubusercontent.com/open-telemetry/opentelemetry-rust/main/assets/logo.svg"
)]

pub mod config;
mod error;
mod facade;
pub mod global;
pub mod handle;
pub mod logs;
pub mod metrics;
pub mod provider;
pub mod scope;
pub mod sdk;
pub mod shutdown;
pub mod trace;

pub use error::{ReconfigureError, ReconfigureResult, ShutdownError};
pub use facade::{LifecycleListener, TelemetryFacade, TelemetryFacadeBuilder};
pub use logs::{ReconfigurableEventLoggerProvider, ReconfigurableLoggerProvider};
pub use metrics::ReconfigurableMeterProvider;
pub use scope::ScopeKey;
pub use trace::ReconfigurableTracerProvider;
