//! Reconfigurable tracer provider.
//!
//! Tracers handed out by [`ReconfigurableTracerProvider`] stay valid across
//! every reconfiguration; spans started after a swap are created by the new
//! SDK, spans already in flight finish on the one that created them.
use crate::handle::{Delegate, Extended, ReconfigurableHandle};
use crate::provider::{NoopSource, ReconfigurableBuilder, ReconfigurableProvider, Source};
use crate::ReconfigureResult;
use opentelemetry::global::{BoxedSpan, BoxedTracer, ObjectSafeTracerProvider};
use opentelemetry::trace::noop::NoopTracerProvider;
use opentelemetry::trace::{self, SpanBuilder, Tracer, TracerProvider};
use opentelemetry::{Context, InstrumentationScope};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;

/// Concrete tracer behind a [`ReconfigurableTracer`].
pub struct TracerDelegate {
    tracer: BoxedTracer,
    enabled: Option<bool>,
}

impl TracerDelegate {
    /// Wraps a tracer without the extended capability.
    pub fn new(tracer: BoxedTracer) -> Self {
        TracerDelegate {
            tracer,
            enabled: None,
        }
    }

    /// Wraps a tracer that can report whether it is enabled.
    pub fn extended(tracer: BoxedTracer, enabled: bool) -> Self {
        TracerDelegate {
            tracer,
            enabled: Some(enabled),
        }
    }
}

impl Extended for TracerDelegate {
    fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

impl Delegate for TracerDelegate {
    fn as_extended(&self) -> Option<&dyn Extended> {
        self.enabled.map(|_| self as &dyn Extended)
    }
}

impl fmt::Debug for TracerDelegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TracerDelegate")
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl<P, T, S> Source<TracerDelegate> for P
where
    S: trace::Span + Send + Sync + 'static,
    T: Tracer<Span = S> + Send + Sync + 'static,
    P: TracerProvider<Tracer = T> + Send + Sync,
{
    fn create(&self, scope: &InstrumentationScope) -> TracerDelegate {
        TracerDelegate::extended(BoxedTracer::new(self.boxed_tracer(scope.clone())), true)
    }
}

impl Source<TracerDelegate> for NoopSource {
    fn create(&self, scope: &InstrumentationScope) -> TracerDelegate {
        let tracer = NoopTracerProvider::new().boxed_tracer(scope.clone());
        TracerDelegate::extended(BoxedTracer::new(tracer), false)
    }
}

/// Handle registered per tracer scope.
pub type TracerSlot = ReconfigurableHandle<TracerDelegate>;

/// A tracer whose implementation follows the provider's current SDK.
#[derive(Clone, Debug)]
pub struct ReconfigurableTracer {
    handle: Arc<TracerSlot>,
}

impl ReconfigurableTracer {
    /// Returns `false` while spans started by this tracer are discarded.
    pub fn is_enabled(&self) -> bool {
        self.handle.is_enabled()
    }

    /// Whether two tracers share the same underlying handle.
    pub fn same_handle(&self, other: &ReconfigurableTracer) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }
}

impl From<Arc<TracerSlot>> for ReconfigurableTracer {
    fn from(handle: Arc<TracerSlot>) -> Self {
        ReconfigurableTracer { handle }
    }
}

impl Tracer for ReconfigurableTracer {
    type Span = BoxedSpan;

    fn build_with_context(&self, builder: SpanBuilder, parent_cx: &Context) -> Self::Span {
        self.handle
            .invoke(|delegate| delegate.tracer.build_with_context(builder, parent_cx))
    }
}

/// Tracer provider whose SDK can be replaced at any time.
///
/// Clones share the same registry.
#[derive(Clone, Debug)]
pub struct ReconfigurableTracerProvider {
    inner: Arc<ReconfigurableProvider<TracerSlot>>,
}

impl Default for ReconfigurableTracerProvider {
    fn default() -> Self {
        ReconfigurableTracerProvider::new(Arc::new(NoopSource))
    }
}

impl ReconfigurableTracerProvider {
    /// Creates a provider backed by `source`.
    pub fn new(source: Arc<dyn Source<TracerDelegate>>) -> Self {
        ReconfigurableTracerProvider {
            inner: Arc::new(ReconfigurableProvider::new(source)),
        }
    }

    /// Returns the tracer for `name` with neither version nor schema URL.
    pub fn get(&self, name: impl Into<Cow<'static, str>>) -> ReconfigurableTracer {
        self.inner.get(name).into()
    }

    /// Returns the tracer for `name` at `version`.
    pub fn get_versioned(
        &self,
        name: impl Into<Cow<'static, str>>,
        version: impl Into<Cow<'static, str>>,
    ) -> ReconfigurableTracer {
        self.inner.get_versioned(name, version).into()
    }

    /// Starts building a tracer scope named `name`.
    pub fn builder(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ReconfigurableBuilder<'_, TracerSlot, ReconfigurableTracer> {
        self.inner.builder(name).output()
    }

    /// Swaps in a new real tracer provider.
    pub fn set_delegate(&self, source: Arc<dyn Source<TracerDelegate>>) -> ReconfigureResult<()> {
        self.inner.set_delegate(source)
    }

    /// The real tracer provider currently in use.
    pub fn source(&self) -> Arc<dyn Source<TracerDelegate>> {
        self.inner.source()
    }
}

impl TracerProvider for ReconfigurableTracerProvider {
    type Tracer = ReconfigurableTracer;

    fn tracer_with_scope(&self, scope: InstrumentationScope) -> Self::Tracer {
        self.inner.with_scope(scope).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opentelemetry::trace::{Span, TraceContextExt};
    use opentelemetry_sdk::trace::{InMemorySpanExporter, SdkTracerProvider};

    fn sdk_provider(exporter: &InMemorySpanExporter) -> Arc<SdkTracerProvider> {
        Arc::new(
            SdkTracerProvider::builder()
                .with_simple_exporter(exporter.clone())
                .build(),
        )
    }

    #[test]
    fn starts_disabled_and_discards_spans() {
        let provider = ReconfigurableTracerProvider::default();
        let tracer = provider.get("auth");
        assert!(!tracer.is_enabled());

        let mut span = tracer.start("noop");
        assert!(!span.span_context().is_sampled());
        span.end();
    }

    #[test]
    fn tracer_identity_survives_swaps() {
        let provider = ReconfigurableTracerProvider::default();
        let first = provider.get_versioned("auth", "1.0.0");
        let scope = InstrumentationScope::builder("auth")
            .with_version("1.0.0")
            .build();
        let second = provider.tracer_with_scope(scope);
        let third = provider.builder("auth").with_version("1.0.0").build();
        assert!(first.same_handle(&second));
        assert!(first.same_handle(&third));
        assert!(!first.same_handle(&provider.get("auth")));

        let exporter = InMemorySpanExporter::default();
        provider.set_delegate(sdk_provider(&exporter)).unwrap();
        assert!(first.same_handle(&provider.get_versioned("auth", "1.0.0")));
        assert!(third.is_enabled());
    }

    #[test]
    fn spans_follow_the_current_sdk() {
        let provider = ReconfigurableTracerProvider::default();
        let tracer = provider
            .builder("auth")
            .with_version("1.0.0")
            .with_schema_url("https://opentelemetry.io/schemas/1.21.0")
            .build();

        let exporter = InMemorySpanExporter::default();
        let sdk = sdk_provider(&exporter);
        provider.set_delegate(sdk.clone()).unwrap();
        tracer.in_span("login", |cx| {
            assert!(cx.span().span_context().is_sampled());
        });

        let spans = exporter.get_finished_spans().unwrap();
        assert_eq!(spans.len(), 1);
        assert_eq!(spans[0].name, "login");
        assert_eq!(spans[0].instrumentation_scope.name(), "auth");
        assert_eq!(spans[0].instrumentation_scope.version(), Some("1.0.0"));
        assert_eq!(
            spans[0].instrumentation_scope.schema_url(),
            Some("https://opentelemetry.io/schemas/1.21.0")
        );

        provider.set_delegate(Arc::new(NoopSource)).unwrap();
        assert!(!tracer.is_enabled());
        tracer.in_span("dropped", |_| {});
        assert_eq!(exporter.get_finished_spans().unwrap().len(), 1);
    }

    #[test]
    fn span_started_before_a_swap_ends_on_its_own_sdk() {
        let provider = ReconfigurableTracerProvider::default();
        let tracer = provider.get("auth");

        let before = InMemorySpanExporter::default();
        provider.set_delegate(sdk_provider(&before)).unwrap();
        let mut span = tracer.start("in-flight");

        let after = InMemorySpanExporter::default();
        provider.set_delegate(sdk_provider(&after)).unwrap();
        span.end();

        assert_eq!(before.get_finished_spans().unwrap().len(), 1);
        assert!(after.get_finished_spans().unwrap().is_empty());
    }
}
