//! Reconfigurable logger and event logger providers.
use crate::handle::{Delegate, Extended, ReconfigurableHandle};
use crate::provider::{NoopSource, ReconfigurableBuilder, ReconfigurableProvider, Source};
use crate::ReconfigureResult;
use opentelemetry::logs::{AnyValue, LogRecord, Logger, LoggerProvider, Severity};
use opentelemetry::trace::{SpanId, TraceFlags, TraceId};
use opentelemetry::{InstrumentationScope, Key};
use std::borrow::Cow;
use std::fmt;
use std::sync::Arc;
use std::time::SystemTime;

mod events;

pub use events::{EventBuilder, EventLogger, ReconfigurableEventLoggerProvider};

/// Log record buffered by a [`ReconfigurableLogger`] and replayed into a
/// record of whichever logger is current when it is emitted.
#[derive(Clone, Debug, Default)]
pub struct ReconfigurableLogRecord {
    event_name: Option<&'static str>,
    target: Option<Cow<'static, str>>,
    timestamp: Option<SystemTime>,
    observed_timestamp: Option<SystemTime>,
    severity_text: Option<&'static str>,
    severity_number: Option<Severity>,
    body: Option<AnyValue>,
    attributes: Vec<(Key, AnyValue)>,
    trace_context: Option<(TraceId, SpanId, Option<TraceFlags>)>,
}

impl ReconfigurableLogRecord {
    /// Event name, if set.
    pub fn event_name(&self) -> Option<&'static str> {
        self.event_name
    }

    /// Severity number, if set.
    pub fn severity_number(&self) -> Option<Severity> {
        self.severity_number
    }

    /// Body, if set.
    pub fn body(&self) -> Option<&AnyValue> {
        self.body.as_ref()
    }

    /// Attributes in insertion order.
    pub fn attributes(&self) -> &[(Key, AnyValue)] {
        &self.attributes
    }

    fn replay<R: LogRecord>(self, record: &mut R) {
        if let Some(name) = self.event_name {
            record.set_event_name(name);
        }
        if let Some(target) = self.target {
            record.set_target(target);
        }
        if let Some(timestamp) = self.timestamp {
            record.set_timestamp(timestamp);
        }
        if let Some(timestamp) = self.observed_timestamp {
            record.set_observed_timestamp(timestamp);
        }
        if let Some(text) = self.severity_text {
            record.set_severity_text(text);
        }
        if let Some(number) = self.severity_number {
            record.set_severity_number(number);
        }
        if let Some(body) = self.body {
            record.set_body(body);
        }
        if !self.attributes.is_empty() {
            record.add_attributes(self.attributes);
        }
        if let Some((trace_id, span_id, trace_flags)) = self.trace_context {
            record.set_trace_context(trace_id, span_id, trace_flags);
        }
    }
}

impl LogRecord for ReconfigurableLogRecord {
    fn set_event_name(&mut self, name: &'static str) {
        self.event_name = Some(name);
    }

    fn set_target<T>(&mut self, target: T)
    where
        T: Into<Cow<'static, str>>,
    {
        self.target = Some(target.into());
    }

    fn set_timestamp(&mut self, timestamp: SystemTime) {
        self.timestamp = Some(timestamp);
    }

    fn set_observed_timestamp(&mut self, timestamp: SystemTime) {
        self.observed_timestamp = Some(timestamp);
    }

    fn set_severity_text(&mut self, text: &'static str) {
        self.severity_text = Some(text);
    }

    fn set_severity_number(&mut self, number: Severity) {
        self.severity_number = Some(number);
    }

    fn set_body(&mut self, body: AnyValue) {
        self.body = Some(body);
    }

    fn add_attributes<I, K, V>(&mut self, attributes: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<AnyValue>,
    {
        self.attributes.extend(
            attributes
                .into_iter()
                .map(|(key, value)| (key.into(), value.into())),
        );
    }

    fn add_attribute<K, V>(&mut self, key: K, value: V)
    where
        K: Into<Key>,
        V: Into<AnyValue>,
    {
        self.attributes.push((key.into(), value.into()));
    }

    fn set_trace_context(
        &mut self,
        trace_id: TraceId,
        span_id: SpanId,
        trace_flags: Option<TraceFlags>,
    ) {
        self.trace_context = Some((trace_id, span_id, trace_flags));
    }
}

/// Object-safe view of a [`Logger`].
trait DynLogger: Send + Sync {
    fn emit_buffered(&self, record: ReconfigurableLogRecord);

    fn event_enabled(&self, level: Severity, target: &str, name: Option<&str>) -> bool;
}

impl<L> DynLogger for L
where
    L: Logger + Send + Sync,
{
    fn emit_buffered(&self, buffered: ReconfigurableLogRecord) {
        let mut record = self.create_log_record();
        buffered.replay(&mut record);
        self.emit(record);
    }

    fn event_enabled(&self, level: Severity, target: &str, name: Option<&str>) -> bool {
        Logger::event_enabled(self, level, target, name)
    }
}

struct DiscardLogger;

impl DynLogger for DiscardLogger {
    fn emit_buffered(&self, _record: ReconfigurableLogRecord) {}

    fn event_enabled(&self, _level: Severity, _target: &str, _name: Option<&str>) -> bool {
        false
    }
}

/// Concrete logger behind a [`ReconfigurableLogger`].
pub struct LoggerDelegate {
    logger: Box<dyn DynLogger>,
    enabled: Option<bool>,
}

impl LoggerDelegate {
    /// Wraps a logger without the extended capability.
    pub fn new<L>(logger: L) -> Self
    where
        L: Logger + Send + Sync + 'static,
    {
        LoggerDelegate {
            logger: Box::new(logger),
            enabled: None,
        }
    }

    /// Wraps a logger that can report whether it is enabled.
    pub fn extended<L>(logger: L, enabled: bool) -> Self
    where
        L: Logger + Send + Sync + 'static,
    {
        LoggerDelegate {
            logger: Box::new(logger),
            enabled: Some(enabled),
        }
    }

    fn discard() -> Self {
        LoggerDelegate {
            logger: Box::new(DiscardLogger),
            enabled: Some(false),
        }
    }
}

impl Extended for LoggerDelegate {
    fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

impl Delegate for LoggerDelegate {
    fn as_extended(&self) -> Option<&dyn Extended> {
        self.enabled.map(|_| self as &dyn Extended)
    }
}

impl fmt::Debug for LoggerDelegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoggerDelegate")
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl<P> Source<LoggerDelegate> for P
where
    P: LoggerProvider + Send + Sync,
    P::Logger: Send + Sync + 'static,
{
    fn create(&self, scope: &InstrumentationScope) -> LoggerDelegate {
        LoggerDelegate::extended(self.logger_with_scope(scope.clone()), true)
    }
}

impl Source<LoggerDelegate> for NoopSource {
    fn create(&self, _scope: &InstrumentationScope) -> LoggerDelegate {
        LoggerDelegate::discard()
    }
}

/// Handle registered per logger scope.
pub type LoggerSlot = ReconfigurableHandle<LoggerDelegate>;

/// A logger whose implementation follows the provider's current SDK.
#[derive(Clone, Debug)]
pub struct ReconfigurableLogger {
    handle: Arc<LoggerSlot>,
}

impl ReconfigurableLogger {
    /// Returns `false` while records emitted by this logger are discarded.
    pub fn is_enabled(&self) -> bool {
        self.handle.is_enabled()
    }

    /// Whether two loggers share the same underlying handle.
    pub fn same_handle(&self, other: &ReconfigurableLogger) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }
}

impl From<Arc<LoggerSlot>> for ReconfigurableLogger {
    fn from(handle: Arc<LoggerSlot>) -> Self {
        ReconfigurableLogger { handle }
    }
}

impl Logger for ReconfigurableLogger {
    type LogRecord = ReconfigurableLogRecord;

    fn create_log_record(&self) -> Self::LogRecord {
        ReconfigurableLogRecord::default()
    }

    fn emit(&self, record: Self::LogRecord) {
        self.handle
            .invoke(|delegate| delegate.logger.emit_buffered(record));
    }

    #[inline]
    fn event_enabled(&self, level: Severity, target: &str, name: Option<&str>) -> bool {
        self.handle
            .invoke(|delegate| delegate.logger.event_enabled(level, target, name))
    }
}

/// Logger provider whose SDK can be replaced at any time.
///
/// Clones share the same registry.
#[derive(Clone, Debug)]
pub struct ReconfigurableLoggerProvider {
    inner: Arc<ReconfigurableProvider<LoggerSlot>>,
}

impl Default for ReconfigurableLoggerProvider {
    fn default() -> Self {
        ReconfigurableLoggerProvider::new(Arc::new(NoopSource))
    }
}

impl ReconfigurableLoggerProvider {
    /// Creates a provider backed by `source`.
    pub fn new(source: Arc<dyn Source<LoggerDelegate>>) -> Self {
        ReconfigurableLoggerProvider {
            inner: Arc::new(ReconfigurableProvider::new(source)),
        }
    }

    /// Returns the logger for `name` with neither version nor schema URL.
    pub fn get(&self, name: impl Into<Cow<'static, str>>) -> ReconfigurableLogger {
        self.inner.get(name).into()
    }

    /// Returns the logger for `name` at `version`.
    pub fn get_versioned(
        &self,
        name: impl Into<Cow<'static, str>>,
        version: impl Into<Cow<'static, str>>,
    ) -> ReconfigurableLogger {
        self.inner.get_versioned(name, version).into()
    }

    /// Starts building a logger scope named `name`.
    pub fn builder(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ReconfigurableBuilder<'_, LoggerSlot, ReconfigurableLogger> {
        self.inner.builder(name).output()
    }

    /// Swaps in a new real logger provider.
    pub fn set_delegate(&self, source: Arc<dyn Source<LoggerDelegate>>) -> ReconfigureResult<()> {
        self.inner.set_delegate(source)
    }

    /// The real logger provider currently in use.
    pub fn source(&self) -> Arc<dyn Source<LoggerDelegate>> {
        self.inner.source()
    }
}

impl LoggerProvider for ReconfigurableLoggerProvider {
    type Logger = ReconfigurableLogger;

    fn logger_with_scope(&self, scope: InstrumentationScope) -> Self::Logger {
        self.inner.with_scope(scope).into()
    }
}
