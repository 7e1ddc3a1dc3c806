//! Building SDK provider sets from configuration.
//!
//! [`TelemetryFacade`](crate::TelemetryFacade) only talks to the
//! [`SdkFactory`] and [`ProviderSet`] traits; [`AutoConfigure`] is the
//! default factory, wiring the `opentelemetry_sdk` providers to OTLP and
//! stdout exporters from the usual `otel.*` properties.
use crate::config::ConfigProperties;
use crate::error::{ReconfigureError, ReconfigureResult, ShutdownError};
use crate::logs::LoggerDelegate;
use crate::metrics::MeterDelegate;
use crate::provider::{NoopSource, Source};
use crate::trace::TracerDelegate;
use opentelemetry::propagation::{TextMapCompositePropagator, TextMapPropagator};
use opentelemetry::{otel_debug, KeyValue};
use opentelemetry_otlp::{WithExportConfig, WithHttpConfig};
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::propagation::{BaggagePropagator, TraceContextPropagator};
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_HTTP_ENDPOINT: &str = "http://localhost:4318";
#[cfg(feature = "grpc-tonic")]
const DEFAULT_GRPC_ENDPOINT: &str = "http://localhost:4317";
const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_METRIC_INTERVAL: Duration = Duration::from_secs(60);

/// The real providers of one configuration, installed together and shut
/// down together.
pub trait ProviderSet: Send + Sync {
    /// Real provider for tracers.
    fn tracer_source(&self) -> Arc<dyn Source<TracerDelegate>>;

    /// Real provider for meters.
    fn meter_source(&self) -> Arc<dyn Source<MeterDelegate>>;

    /// Real provider for loggers and event loggers.
    fn logger_source(&self) -> Arc<dyn Source<LoggerDelegate>>;

    /// Flushes and stops every provider of the set.
    fn shutdown(&self) -> Result<(), ShutdownError>;

    /// Whether the set discards all telemetry.
    fn is_noop(&self) -> bool {
        false
    }
}

/// Provider set handing out disabled delegates.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopProviderSet;

impl ProviderSet for NoopProviderSet {
    fn tracer_source(&self) -> Arc<dyn Source<TracerDelegate>> {
        Arc::new(NoopSource)
    }

    fn meter_source(&self) -> Arc<dyn Source<MeterDelegate>> {
        Arc::new(NoopSource)
    }

    fn logger_source(&self) -> Arc<dyn Source<LoggerDelegate>> {
        Arc::new(NoopSource)
    }

    fn shutdown(&self) -> Result<(), ShutdownError> {
        Ok(())
    }

    fn is_noop(&self) -> bool {
        true
    }
}

/// Provider set backed by the `opentelemetry_sdk` providers.
#[derive(Clone, Debug)]
pub struct SdkProviderSet {
    tracer_provider: SdkTracerProvider,
    meter_provider: SdkMeterProvider,
    logger_provider: SdkLoggerProvider,
}

impl SdkProviderSet {
    /// Groups already built SDK providers.
    pub fn new(
        tracer_provider: SdkTracerProvider,
        meter_provider: SdkMeterProvider,
        logger_provider: SdkLoggerProvider,
    ) -> Self {
        SdkProviderSet {
            tracer_provider,
            meter_provider,
            logger_provider,
        }
    }
}

impl ProviderSet for SdkProviderSet {
    fn tracer_source(&self) -> Arc<dyn Source<TracerDelegate>> {
        Arc::new(self.tracer_provider.clone())
    }

    fn meter_source(&self) -> Arc<dyn Source<MeterDelegate>> {
        Arc::new(self.meter_provider.clone())
    }

    fn logger_source(&self) -> Arc<dyn Source<LoggerDelegate>> {
        Arc::new(self.logger_provider.clone())
    }

    fn shutdown(&self) -> Result<(), ShutdownError> {
        let failures = [
            ("traces", self.tracer_provider.shutdown()),
            ("metrics", self.meter_provider.shutdown()),
            ("logs", self.logger_provider.shutdown()),
        ]
        .into_iter()
        .filter_map(|(signal, result)| result.err().map(|err| format!("{signal}: {err}")))
        .collect::<Vec<_>>();
        if failures.is_empty() {
            Ok(())
        } else {
            Err(ShutdownError::Failed(failures.join("; ")))
        }
    }
}

/// Describes an exporter chosen for a signal.
#[derive(Clone, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum ExporterDescriptor {
    /// OTLP exporter.
    Otlp {
        /// `http/protobuf` or `grpc`.
        protocol: &'static str,
        /// Resolved endpoint, signal path included for HTTP.
        endpoint: String,
    },
    /// Exporter writing to standard output.
    Console,
}

impl fmt::Display for ExporterDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExporterDescriptor::Otlp { protocol, endpoint } => {
                write!(f, "otlp({protocol}, {endpoint})")
            }
            ExporterDescriptor::Console => f.write_str("console"),
        }
    }
}

/// Context propagation formats.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub enum PropagatorKind {
    /// W3C `traceparent` / `tracestate`.
    TraceContext,
    /// W3C `baggage`.
    Baggage,
}

/// Builds a composite propagator for `kinds`; empty when `kinds` is empty.
pub fn text_map_propagator(kinds: &[PropagatorKind]) -> TextMapCompositePropagator {
    let propagators = kinds
        .iter()
        .map(|kind| -> Box<dyn TextMapPropagator + Send + Sync> {
            match kind {
                PropagatorKind::TraceContext => Box::new(TraceContextPropagator::new()),
                PropagatorKind::Baggage => Box::new(BaggagePropagator::new()),
            }
        })
        .collect();
    TextMapCompositePropagator::new(propagators)
}

/// Outcome of one [`SdkFactory::build`].
pub struct BuiltSdk {
    /// Providers to install.
    pub providers: Arc<dyn ProviderSet>,
    /// Configuration the providers were built from.
    pub config: ConfigProperties,
    /// Resource attached to every signal.
    pub resource: Resource,
    /// Exporters chosen for logs.
    pub log_exporters: Vec<ExporterDescriptor>,
    /// Configured propagation formats.
    pub propagators: Vec<PropagatorKind>,
}

impl BuiltSdk {
    /// The state before any SDK is configured: no-op providers, empty
    /// configuration and resource.
    pub fn noop() -> Self {
        BuiltSdk {
            providers: Arc::new(NoopProviderSet),
            config: ConfigProperties::default(),
            resource: Resource::builder_empty().build(),
            log_exporters: Vec::new(),
            propagators: Vec::new(),
        }
    }
}

impl fmt::Debug for BuiltSdk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltSdk")
            .field("noop", &self.providers.is_noop())
            .field("config", &self.config)
            .field("resource", &self.resource)
            .field("log_exporters", &self.log_exporters)
            .field("propagators", &self.propagators)
            .finish()
    }
}

/// Builds a provider set from resolved configuration.
///
/// Called without any provider lock held; it may block on I/O.
pub trait SdkFactory: Send + Sync {
    /// Builds the providers for `config`, merging `resource` into the
    /// resource the configuration describes.
    fn build(&self, config: &ConfigProperties, resource: &Resource) -> ReconfigureResult<BuiltSdk>;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Signal {
    Traces,
    Metrics,
    Logs,
}

impl Signal {
    fn as_str(self) -> &'static str {
        match self {
            Signal::Traces => "traces",
            Signal::Metrics => "metrics",
            Signal::Logs => "logs",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum ExporterKind {
    Otlp,
    Console,
}

#[derive(Debug)]
struct OtlpSettings {
    protocol: &'static str,
    endpoint: String,
    timeout: Duration,
    headers: HashMap<String, String>,
}

impl OtlpSettings {
    fn descriptor(&self) -> ExporterDescriptor {
        ExporterDescriptor::Otlp {
            protocol: self.protocol,
            endpoint: self.endpoint.clone(),
        }
    }
}

macro_rules! otlp_exporter {
    ($exporter:ty, $signal:expr, $settings:expr) => {{
        let settings: &OtlpSettings = $settings;
        let built = match settings.protocol {
            #[cfg(feature = "grpc-tonic")]
            "grpc" => <$exporter>::builder()
                .with_tonic()
                .with_endpoint(settings.endpoint.clone())
                .with_timeout(settings.timeout)
                .build(),
            _ => <$exporter>::builder()
                .with_http()
                .with_protocol(opentelemetry_otlp::Protocol::HttpBinary)
                .with_endpoint(settings.endpoint.clone())
                .with_timeout(settings.timeout)
                .with_headers(settings.headers.clone())
                .build(),
        };
        built.map_err(|err| ReconfigureError::ExporterBuild {
            signal: $signal.as_str(),
            reason: err.to_string(),
        })
    }};
}

/// Default [`SdkFactory`] following the OpenTelemetry environment variable
/// conventions.
///
/// Supported properties:
/// - `otel.sdk.disabled`
/// - `otel.service.name`, `otel.resource.attributes`
/// - `otel.{traces,metrics,logs}.exporter`: `otlp` (default), `console`, `none`
/// - `otel.exporter.otlp[.{signal}].{protocol,endpoint,timeout,headers}`
/// - `otel.traces.sampler`, `otel.traces.sampler.arg`
/// - `otel.metric.export.interval`
/// - `otel.propagators`: `tracecontext`, `baggage`, `none`
#[derive(Clone, Copy, Debug, Default)]
pub struct AutoConfigure;

impl AutoConfigure {
    fn resource(
        &self,
        config: &ConfigProperties,
        resource: &Resource,
    ) -> ReconfigureResult<Resource> {
        let configured = config
            .get_map("otel.resource.attributes")?
            .into_iter()
            .map(|(key, value)| KeyValue::new(key, value));
        let mut builder = Resource::builder().with_attributes(configured);
        if let Some(service_name) = config.get_string("otel.service.name") {
            builder = builder.with_service_name(service_name.to_owned());
        }
        Ok(builder
            .with_attributes(
                resource
                    .iter()
                    .map(|(key, value)| KeyValue::new(key.clone(), value.clone())),
            )
            .build())
    }

    fn exporters(
        &self,
        config: &ConfigProperties,
        signal: Signal,
    ) -> ReconfigureResult<Vec<ExporterKind>> {
        let key = format!("otel.{}.exporter", signal.as_str());
        let names = config.get_list(&key);
        if names.is_empty() {
            return Ok(vec![ExporterKind::Otlp]);
        }
        let mut kinds = Vec::new();
        for name in names {
            let kind = match name.as_str() {
                "otlp" => ExporterKind::Otlp,
                "console" | "logging" | "stdout" => ExporterKind::Console,
                "none" => continue,
                _ => {
                    return Err(ReconfigureError::UnsupportedValue { key, value: name });
                }
            };
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }

    fn otlp_settings(
        &self,
        config: &ConfigProperties,
        signal: Signal,
    ) -> ReconfigureResult<OtlpSettings> {
        let signal_key = |name: &str| format!("otel.exporter.otlp.{}.{name}", signal.as_str());
        let base_key = |name: &str| format!("otel.exporter.otlp.{name}");

        let protocol_key = signal_key("protocol");
        let protocol = match config
            .get_string(&protocol_key)
            .map(|value| (protocol_key.clone(), value))
            .or_else(|| {
                config
                    .get_string(&base_key("protocol"))
                    .map(|value| (base_key("protocol"), value))
            })
        {
            None | Some((_, "http/protobuf")) => "http/protobuf",
            #[cfg(feature = "grpc-tonic")]
            Some((_, "grpc")) => "grpc",
            Some((key, value)) => {
                return Err(ReconfigureError::UnsupportedValue {
                    key,
                    value: value.to_owned(),
                });
            }
        };

        let endpoint = match config.get_string(&signal_key("endpoint")) {
            Some(endpoint) => endpoint.to_owned(),
            None => {
                let base = config.get_string(&base_key("endpoint"));
                match protocol {
                    #[cfg(feature = "grpc-tonic")]
                    "grpc" => base.unwrap_or(DEFAULT_GRPC_ENDPOINT).to_owned(),
                    _ => format!(
                        "{}/v1/{}",
                        base.unwrap_or(DEFAULT_HTTP_ENDPOINT).trim_end_matches('/'),
                        signal.as_str()
                    ),
                }
            }
        };
        url::Url::parse(&endpoint).map_err(|err| ReconfigureError::InvalidValue {
            key: signal_key("endpoint"),
            value: endpoint.clone(),
            reason: err.to_string(),
        })?;

        let timeout = match config.get_duration(&signal_key("timeout"))? {
            Some(timeout) => timeout,
            None => config
                .get_duration(&base_key("timeout"))?
                .unwrap_or(DEFAULT_EXPORT_TIMEOUT),
        };

        let mut headers: HashMap<String, String> =
            config.get_map(&base_key("headers"))?.into_iter().collect();
        headers.extend(config.get_map(&signal_key("headers"))?);

        Ok(OtlpSettings {
            protocol,
            endpoint,
            timeout,
            headers,
        })
    }

    fn sampler(&self, config: &ConfigProperties) -> ReconfigureResult<Sampler> {
        let ratio = || -> ReconfigureResult<f64> {
            match config.get_string("otel.traces.sampler.arg") {
                None => Ok(1.0),
                Some(arg) => arg
                    .parse::<f64>()
                    .ok()
                    .filter(|ratio| (0.0..=1.0).contains(ratio))
                    .ok_or_else(|| ReconfigureError::InvalidValue {
                        key: "otel.traces.sampler.arg".to_owned(),
                        value: arg.to_owned(),
                        reason: "expected a ratio between 0 and 1".to_owned(),
                    }),
            }
        };
        let sampler = match config.get_string("otel.traces.sampler") {
            None | Some("parentbased_always_on") => {
                Sampler::ParentBased(Box::new(Sampler::AlwaysOn))
            }
            Some("always_on") => Sampler::AlwaysOn,
            Some("always_off") => Sampler::AlwaysOff,
            Some("traceidratio") => Sampler::TraceIdRatioBased(ratio()?),
            Some("parentbased_always_off") => Sampler::ParentBased(Box::new(Sampler::AlwaysOff)),
            Some("parentbased_traceidratio") => {
                Sampler::ParentBased(Box::new(Sampler::TraceIdRatioBased(ratio()?)))
            }
            Some(other) => {
                return Err(ReconfigureError::UnsupportedValue {
                    key: "otel.traces.sampler".to_owned(),
                    value: other.to_owned(),
                })
            }
        };
        Ok(sampler)
    }

    fn propagators(&self, config: &ConfigProperties) -> ReconfigureResult<Vec<PropagatorKind>> {
        let names = config.get_list("otel.propagators");
        if names.is_empty() {
            return Ok(vec![PropagatorKind::TraceContext, PropagatorKind::Baggage]);
        }
        let mut kinds = Vec::new();
        for name in names {
            let kind = match name.as_str() {
                "tracecontext" => PropagatorKind::TraceContext,
                "baggage" => PropagatorKind::Baggage,
                "none" => continue,
                _ => {
                    return Err(ReconfigureError::UnsupportedValue {
                        key: "otel.propagators".to_owned(),
                        value: name,
                    })
                }
            };
            if !kinds.contains(&kind) {
                kinds.push(kind);
            }
        }
        Ok(kinds)
    }

    fn tracer_provider(
        &self,
        config: &ConfigProperties,
        resource: &Resource,
    ) -> ReconfigureResult<SdkTracerProvider> {
        let mut builder = SdkTracerProvider::builder()
            .with_resource(resource.clone())
            .with_sampler(self.sampler(config)?);
        for kind in self.exporters(config, Signal::Traces)? {
            builder = match kind {
                ExporterKind::Otlp => {
                    let settings = self.otlp_settings(config, Signal::Traces)?;
                    builder.with_batch_exporter(otlp_exporter!(
                        opentelemetry_otlp::SpanExporter,
                        Signal::Traces,
                        &settings
                    )?)
                }
                ExporterKind::Console => {
                    builder.with_simple_exporter(opentelemetry_stdout::SpanExporter::default())
                }
            };
        }
        Ok(builder.build())
    }

    fn meter_provider(
        &self,
        config: &ConfigProperties,
        resource: &Resource,
    ) -> ReconfigureResult<SdkMeterProvider> {
        let interval = config
            .get_duration("otel.metric.export.interval")?
            .unwrap_or(DEFAULT_METRIC_INTERVAL);
        let mut builder = SdkMeterProvider::builder().with_resource(resource.clone());
        for kind in self.exporters(config, Signal::Metrics)? {
            builder = match kind {
                ExporterKind::Otlp => {
                    let settings = self.otlp_settings(config, Signal::Metrics)?;
                    let exporter = otlp_exporter!(
                        opentelemetry_otlp::MetricExporter,
                        Signal::Metrics,
                        &settings
                    )?;
                    builder.with_reader(
                        PeriodicReader::builder(exporter)
                            .with_interval(interval)
                            .build(),
                    )
                }
                ExporterKind::Console => builder.with_reader(
                    PeriodicReader::builder(opentelemetry_stdout::MetricExporter::default())
                        .with_interval(interval)
                        .build(),
                ),
            };
        }
        Ok(builder.build())
    }

    fn logger_provider(
        &self,
        config: &ConfigProperties,
        resource: &Resource,
    ) -> ReconfigureResult<(SdkLoggerProvider, Vec<ExporterDescriptor>)> {
        let mut builder = SdkLoggerProvider::builder().with_resource(resource.clone());
        let mut descriptors = Vec::new();
        for kind in self.exporters(config, Signal::Logs)? {
            builder = match kind {
                ExporterKind::Otlp => {
                    let settings = self.otlp_settings(config, Signal::Logs)?;
                    descriptors.push(settings.descriptor());
                    builder.with_batch_exporter(otlp_exporter!(
                        opentelemetry_otlp::LogExporter,
                        Signal::Logs,
                        &settings
                    )?)
                }
                ExporterKind::Console => {
                    descriptors.push(ExporterDescriptor::Console);
                    builder.with_simple_exporter(opentelemetry_stdout::LogExporter::default())
                }
            };
        }
        Ok((builder.build(), descriptors))
    }
}

impl SdkFactory for AutoConfigure {
    fn build(&self, config: &ConfigProperties, resource: &Resource) -> ReconfigureResult<BuiltSdk> {
        let resource = self.resource(config, resource)?;
        let propagators = self.propagators(config)?;
        if config.get_bool("otel.sdk.disabled") == Some(true) {
            otel_debug!(name: "AutoConfigure.SdkDisabled");
            return Ok(BuiltSdk {
                providers: Arc::new(NoopProviderSet),
                config: config.clone(),
                resource,
                log_exporters: Vec::new(),
                propagators,
            });
        }

        let tracer_provider = self.tracer_provider(config, &resource)?;
        let meter_provider = self.meter_provider(config, &resource)?;
        let (logger_provider, log_exporters) = self.logger_provider(config, &resource)?;
        Ok(BuiltSdk {
            providers: Arc::new(SdkProviderSet::new(
                tracer_provider,
                meter_provider,
                logger_provider,
            )),
            config: config.clone(),
            resource,
            log_exporters,
            propagators,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::Key;

    fn config(pairs: &[(&str, &str)]) -> ConfigProperties {
        ConfigProperties::new(pairs.iter().copied())
    }

    #[test]
    fn base_endpoint_gets_signal_path() {
        for base in ["http://localhost:4317", "http://localhost:4317/"] {
            let settings = AutoConfigure
                .otlp_settings(&config(&[("otel.exporter.otlp.endpoint", base)]), Signal::Logs)
                .unwrap();
            assert_eq!(settings.endpoint, "http://localhost:4317/v1/logs");
            assert_eq!(settings.protocol, "http/protobuf");
        }
    }

    #[test]
    fn signal_endpoint_is_used_verbatim() {
        let config = config(&[
            ("otel.exporter.otlp.endpoint", "http://collector:4318"),
            ("otel.exporter.otlp.traces.endpoint", "http://tempo:4318/custom"),
        ]);
        let traces = AutoConfigure.otlp_settings(&config, Signal::Traces).unwrap();
        let metrics = AutoConfigure.otlp_settings(&config, Signal::Metrics).unwrap();
        assert_eq!(traces.endpoint, "http://tempo:4318/custom");
        assert_eq!(metrics.endpoint, "http://collector:4318/v1/metrics");
    }

    #[test]
    fn default_endpoint_timeout_and_headers() {
        let settings = AutoConfigure
            .otlp_settings(
                &config(&[
                    ("otel.exporter.otlp.headers", "api-key=abc,tenant=a"),
                    ("otel.exporter.otlp.metrics.headers", "tenant=b"),
                    ("otel.exporter.otlp.metrics.timeout", "2s"),
                ]),
                Signal::Metrics,
            )
            .unwrap();
        assert_eq!(settings.endpoint, "http://localhost:4318/v1/metrics");
        assert_eq!(settings.timeout, Duration::from_secs(2));
        assert_eq!(settings.headers.get("api-key").map(String::as_str), Some("abc"));
        assert_eq!(settings.headers.get("tenant").map(String::as_str), Some("b"));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let err = AutoConfigure
            .otlp_settings(
                &config(&[("otel.exporter.otlp.protocol", "http/xml")]),
                Signal::Traces,
            )
            .unwrap_err();
        assert!(matches!(err, ReconfigureError::UnsupportedValue { .. }));

        let err = AutoConfigure
            .otlp_settings(
                &config(&[("otel.exporter.otlp.traces.endpoint", "not a url")]),
                Signal::Traces,
            )
            .unwrap_err();
        assert!(matches!(err, ReconfigureError::InvalidValue { .. }));

        let err = AutoConfigure
            .exporters(&config(&[("otel.logs.exporter", "jaeger")]), Signal::Logs)
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "unsupported value `jaeger` for `otel.logs.exporter`"
        );
    }

    #[test]
    fn exporter_lists() {
        assert_eq!(
            AutoConfigure.exporters(&config(&[]), Signal::Traces).unwrap(),
            vec![ExporterKind::Otlp]
        );
        assert_eq!(
            AutoConfigure
                .exporters(
                    &config(&[("otel.traces.exporter", "console,logging,otlp")]),
                    Signal::Traces,
                )
                .unwrap(),
            vec![ExporterKind::Console, ExporterKind::Otlp]
        );
        assert!(AutoConfigure
            .exporters(&config(&[("otel.metrics.exporter", "none")]), Signal::Metrics)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn samplers_and_propagators() {
        let ratio = |arg: &str| {
            config(&[
                ("otel.traces.sampler", "traceidratio"),
                ("otel.traces.sampler.arg", arg),
            ])
        };
        assert!(AutoConfigure.sampler(&ratio("0.25")).is_ok());
        assert!(AutoConfigure.sampler(&ratio("2")).is_err());
        assert!(AutoConfigure
            .sampler(&config(&[("otel.traces.sampler", "jaeger_remote")]))
            .is_err());

        assert_eq!(
            AutoConfigure.propagators(&config(&[])).unwrap(),
            vec![PropagatorKind::TraceContext, PropagatorKind::Baggage]
        );
        assert!(AutoConfigure
            .propagators(&config(&[("otel.propagators", "none")]))
            .unwrap()
            .is_empty());
        assert!(AutoConfigure
            .propagators(&config(&[("otel.propagators", "b3")]))
            .is_err());
    }

    #[test]
    fn caller_resource_wins() {
        let config = config(&[
            ("otel.service.name", "from-config"),
            ("otel.resource.attributes", "service.namespace=shop,team=payments"),
        ]);
        let caller = Resource::builder_empty()
            .with_attributes([KeyValue::new("team", "checkout")])
            .build();
        let resource = AutoConfigure.resource(&config, &caller).unwrap();

        assert_eq!(
            resource.get(&Key::from_static_str("service.name")),
            Some("from-config".into())
        );
        assert_eq!(
            resource.get(&Key::from_static_str("service.namespace")),
            Some("shop".into())
        );
        assert_eq!(
            resource.get(&Key::from_static_str("team")),
            Some("checkout".into())
        );
    }

    #[test]
    fn console_only_sdk_builds_without_network() {
        let built = AutoConfigure
            .build(
                &config(&[
                    ("otel.traces.exporter", "console"),
                    ("otel.metrics.exporter", "none"),
                    ("otel.logs.exporter", "console"),
                ]),
                &Resource::builder_empty().build(),
            )
            .unwrap();
        assert!(!built.providers.is_noop());
        assert_eq!(built.log_exporters, vec![ExporterDescriptor::Console]);
        let _ = built.providers.shutdown();
    }

    #[test]
    fn disabled_sdk_is_noop() {
        let built = AutoConfigure
            .build(
                &config(&[("otel.sdk.disabled", "true"), ("otel.traces.exporter", "otlp")]),
                &Resource::builder_empty().build(),
            )
            .unwrap();
        assert!(built.providers.is_noop());
        assert!(built.log_exporters.is_empty());
    }

    #[test]
    fn composite_propagator_fields() {
        use opentelemetry::propagation::TextMapPropagator;
        let propagator =
            text_map_propagator(&[PropagatorKind::TraceContext, PropagatorKind::Baggage]);
        let fields: Vec<_> = propagator.fields().collect();
        assert!(fields.contains(&"traceparent"));
        assert!(fields.contains(&"baggage"));
        assert_eq!(text_map_propagator(&[]).fields().count(), 0);
    }
}
