//! Event logging on top of the reconfigurable logger.
//!
//! An [`EventLogger`] stamps every record with an event name, so events stay
//! distinguishable from plain log records in whichever SDK is installed.
use super::{LoggerDelegate, LoggerSlot, ReconfigurableLogRecord};
use crate::provider::{NoopSource, ReconfigurableBuilder, ReconfigurableProvider, Source};
use crate::ReconfigureResult;
use opentelemetry::logs::{AnyValue, LogRecord, Severity};
use opentelemetry::trace::TraceContextExt;
use opentelemetry::{Context, Key};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::SystemTime;

/// Emits named events as log records through a swappable logger.
#[derive(Clone, Debug)]
pub struct EventLogger {
    handle: Arc<LoggerSlot>,
}

impl EventLogger {
    /// Starts an event named `event_name`.
    ///
    /// Events default to [`Severity::Info`], the current time and the trace
    /// context of the active span.
    pub fn event(&self, event_name: &'static str) -> EventBuilder<'_> {
        let mut record = ReconfigurableLogRecord::default();
        record.set_event_name(event_name);
        record.set_severity_number(Severity::Info);
        EventBuilder {
            logger: self,
            record,
            context: None,
        }
    }

    /// Emits an event with the given body and attributes.
    pub fn emit<I, K, V>(&self, event_name: &'static str, body: impl Into<AnyValue>, attributes: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<AnyValue>,
    {
        self.event(event_name)
            .with_body(body)
            .with_attributes(attributes)
            .emit()
    }

    /// Returns `false` while events emitted by this logger are discarded.
    pub fn is_enabled(&self) -> bool {
        self.handle.is_enabled()
    }

    /// Whether two event loggers share the same underlying handle.
    pub fn same_handle(&self, other: &EventLogger) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }
}

impl From<Arc<LoggerSlot>> for EventLogger {
    fn from(handle: Arc<LoggerSlot>) -> Self {
        EventLogger { handle }
    }
}

/// One event under construction.
#[derive(Debug)]
pub struct EventBuilder<'a> {
    logger: &'a EventLogger,
    record: ReconfigurableLogRecord,
    context: Option<Context>,
}

impl EventBuilder<'_> {
    /// Sets the event payload.
    pub fn with_body(mut self, body: impl Into<AnyValue>) -> Self {
        self.record.set_body(body.into());
        self
    }

    /// Adds attributes.
    pub fn with_attributes<I, K, V>(mut self, attributes: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<AnyValue>,
    {
        self.record.add_attributes(attributes);
        self
    }

    /// Overrides the default severity.
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.record.set_severity_number(severity);
        self
    }

    /// Overrides the emission time.
    pub fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.record.set_timestamp(timestamp);
        self
    }

    /// Takes the trace context from `cx` instead of the current context.
    pub fn with_context(mut self, cx: Context) -> Self {
        self.context = Some(cx);
        self
    }

    /// Emits the event.
    pub fn emit(self) {
        let EventBuilder {
            logger,
            mut record,
            context,
        } = self;
        if record.timestamp.is_none() {
            record.set_timestamp(SystemTime::now());
        }
        let cx = context.unwrap_or_else(Context::current);
        let span = cx.span();
        let span_context = span.span_context();
        if span_context.is_valid() {
            record.set_trace_context(
                span_context.trace_id(),
                span_context.span_id(),
                Some(span_context.trace_flags()),
            );
        }
        logger
            .handle
            .invoke(|delegate| delegate.logger.emit_buffered(record));
    }
}

/// Event logger provider whose SDK can be replaced at any time.
///
/// Keeps its own registry, separate from the logger provider's, and is
/// swapped from the same SDK logger provider.
#[derive(Clone, Debug)]
pub struct ReconfigurableEventLoggerProvider {
    inner: Arc<ReconfigurableProvider<LoggerSlot>>,
}

impl Default for ReconfigurableEventLoggerProvider {
    fn default() -> Self {
        ReconfigurableEventLoggerProvider::new(Arc::new(NoopSource))
    }
}

impl ReconfigurableEventLoggerProvider {
    /// Creates a provider backed by `source`.
    pub fn new(source: Arc<dyn Source<LoggerDelegate>>) -> Self {
        ReconfigurableEventLoggerProvider {
            inner: Arc::new(ReconfigurableProvider::new(source)),
        }
    }

    /// Returns the event logger for `name` with neither version nor schema URL.
    pub fn get(&self, name: impl Into<Cow<'static, str>>) -> EventLogger {
        self.inner.get(name).into()
    }

    /// Returns the event logger for `name` at `version`.
    pub fn get_versioned(
        &self,
        name: impl Into<Cow<'static, str>>,
        version: impl Into<Cow<'static, str>>,
    ) -> EventLogger {
        self.inner.get_versioned(name, version).into()
    }

    /// Starts building an event logger scope named `name`.
    pub fn builder(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ReconfigurableBuilder<'_, LoggerSlot, EventLogger> {
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
