//! Reconfigurable meter provider.
//!
//! Meters are registered per scope like tracers and loggers. Each meter also
//! keeps an [`instruments`] registry: synchronous instruments are swappable
//! handles rebuilt on every new meter, observable instruments keep their
//! callbacks and register them again once the new meter is in place.
use crate::handle::{Delegate, Extended, ReconfigurableHandle};
use crate::provider::{NoopSource, ReconfigurableBuilder, ReconfigurableProvider, Slot, Source};
use crate::ReconfigureResult;
use opentelemetry::metrics::{
    AsyncInstrumentBuilder, Counter, Gauge, Histogram, HistogramBuilder, InstrumentBuilder,
    InstrumentProvider, Meter, MeterProvider, ObservableCounter, ObservableGauge,
    ObservableUpDownCounter, UpDownCounter,
};
use opentelemetry::InstrumentationScope;
use std::borrow::Cow;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

pub mod instruments;

use instruments::{InstrumentDescriptor, InstrumentRegistry, ObservableKind, SharedCallback};

static METER_IDS: AtomicU64 = AtomicU64::new(0);

/// Concrete meter behind a [`ReconfigurableMeter`].
pub struct MeterDelegate {
    meter: Meter,
    enabled: Option<bool>,
    id: u64,
}

impl MeterDelegate {
    /// Wraps a meter without the extended capability.
    pub fn new(meter: Meter) -> Self {
        MeterDelegate {
            meter,
            enabled: None,
            id: METER_IDS.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Wraps a meter that can report whether it is enabled.
    pub fn extended(meter: Meter, enabled: bool) -> Self {
        MeterDelegate {
            enabled: Some(enabled),
            ..MeterDelegate::new(meter)
        }
    }
}

impl Extended for MeterDelegate {
    fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }
}

impl Delegate for MeterDelegate {
    fn as_extended(&self) -> Option<&dyn Extended> {
        self.enabled.map(|_| self as &dyn Extended)
    }
}

impl fmt::Debug for MeterDelegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterDelegate")
            .field("id", &self.id)
            .field("enabled", &self.enabled)
            .finish()
    }
}

impl<P> Source<MeterDelegate> for P
where
    P: MeterProvider + Send + Sync,
{
    fn create(&self, scope: &InstrumentationScope) -> MeterDelegate {
        MeterDelegate::extended(self.meter_with_scope(scope.clone()), true)
    }
}

/// Instrument provider whose instruments record nothing.
struct NoopInstruments;

impl InstrumentProvider for NoopInstruments {}

impl Source<MeterDelegate> for NoopSource {
    fn create(&self, _scope: &InstrumentationScope) -> MeterDelegate {
        MeterDelegate::extended(Meter::new(Arc::new(NoopInstruments)), false)
    }
}

/// Registry entry for one meter scope: the meter handle and its instruments.
pub struct MeterSlot {
    handle: ReconfigurableHandle<MeterDelegate>,
    instruments: InstrumentRegistry,
}

impl Slot for MeterSlot {
    type Delegate = MeterDelegate;

    fn new(delegate: MeterDelegate) -> Self {
        MeterSlot {
            handle: ReconfigurableHandle::new(delegate),
            instruments: InstrumentRegistry::default(),
        }
    }

    fn handle(&self) -> &ReconfigurableHandle<MeterDelegate> {
        &self.handle
    }

    fn after_swap(&self) {
        self.instruments.rebuild(&self.handle);
    }
}

impl fmt::Debug for MeterSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MeterSlot")
            .field("handle", &self.handle)
            .field("instruments", &self.instruments)
            .finish()
    }
}

/// A meter whose instruments follow the provider's current SDK.
///
/// Use [`meter`](ReconfigurableMeter::meter) to get an API [`Meter`] for it.
#[derive(Clone, Debug)]
pub struct ReconfigurableMeter {
    slot: Arc<MeterSlot>,
}

impl ReconfigurableMeter {
    /// An API meter creating its instruments through this handle.
    pub fn meter(&self) -> Meter {
        Meter::new(Arc::new(self.clone()))
    }

    /// Returns `false` while measurements recorded through this meter are
    /// discarded.
    pub fn is_enabled(&self) -> bool {
        self.slot.handle.is_enabled()
    }

    /// Whether two meters share the same underlying handle.
    pub fn same_handle(&self, other: &ReconfigurableMeter) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }

    /// Number of distinct synchronous instruments created so far.
    pub fn instrument_count(&self) -> usize {
        self.slot.instruments.sync_count()
    }

    /// Number of observable instrument registrations.
    pub fn observable_count(&self) -> usize {
        self.slot.instruments.observable_count()
    }

    fn sync<I: instruments::SyncKind>(&self, descriptor: InstrumentDescriptor) -> I {
        self.slot.instruments.sync(&self.slot.handle, descriptor)
    }

    fn observable<I: ObservableKind>(
        &self,
        builder: AsyncInstrumentBuilder<'_, I, I::Value>,
    ) -> I {
        let descriptor = InstrumentDescriptor {
            name: builder.name,
            description: builder.description,
            unit: builder.unit,
            boundaries: None,
        };
        let callbacks: Vec<SharedCallback<I::Value>> =
            builder.callbacks.into_iter().map(Arc::from).collect();
        self.slot
            .instruments
            .observable(&self.slot.handle, descriptor, callbacks)
    }
}

impl From<Arc<MeterSlot>> for ReconfigurableMeter {
    fn from(slot: Arc<MeterSlot>) -> Self {
        ReconfigurableMeter { slot }
    }
}

fn describe<T>(builder: InstrumentBuilder<'_, T>) -> InstrumentDescriptor {
    InstrumentDescriptor {
        name: builder.name,
        description: builder.description,
        unit: builder.unit,
        boundaries: None,
    }
}

fn describe_histogram<T>(builder: HistogramBuilder<'_, T>) -> InstrumentDescriptor {
    InstrumentDescriptor {
        name: builder.name,
        description: builder.description,
        unit: builder.unit,
        boundaries: builder.boundaries,
    }
}

macro_rules! sync_methods {
    ($($method:ident: $instrument:ty),* $(,)?) => {
        $(
            fn $method(&self, builder: InstrumentBuilder<'_, $instrument>) -> $instrument {
                self.sync(describe(builder))
            }
        )*
    };
}

macro_rules! histogram_methods {
    ($($method:ident: $instrument:ty),* $(,)?) => {
        $(
            fn $method(&self, builder: HistogramBuilder<'_, $instrument>) -> $instrument {
                self.sync(describe_histogram(builder))
            }
        )*
    };
}

macro_rules! observable_methods {
    ($($method:ident: $instrument:ty, $value:ty),* $(,)?) => {
        $(
            fn $method(
                &self,
                builder: AsyncInstrumentBuilder<'_, $instrument, $value>,
            ) -> $instrument {
                self.observable(builder)
            }
        )*
    };
}

impl InstrumentProvider for ReconfigurableMeter {
    sync_methods! {
        u64_counter: Counter<u64>,
        f64_counter: Counter<f64>,
        i64_up_down_counter: UpDownCounter<i64>,
        f64_up_down_counter: UpDownCounter<f64>,
        u64_gauge: Gauge<u64>,
        f64_gauge: Gauge<f64>,
        i64_gauge: Gauge<i64>,
    }

    histogram_methods! {
        f64_histogram: Histogram<f64>,
        u64_histogram: Histogram<u64>,
    }

    observable_methods! {
        u64_observable_counter: ObservableCounter<u64>, u64,
        f64_observable_counter: ObservableCounter<f64>, f64,
        i64_observable_up_down_counter: ObservableUpDownCounter<i64>, i64,
        f64_observable_up_down_counter: ObservableUpDownCounter<f64>, f64,
        u64_observable_gauge: ObservableGauge<u64>, u64,
        i64_observable_gauge: ObservableGauge<i64>, i64,
        f64_observable_gauge: ObservableGauge<f64>, f64,
    }
}

/// Meter provider whose SDK can be replaced at any time.
///
/// Clones share the same registry.
#[derive(Clone, Debug)]
pub struct ReconfigurableMeterProvider {
    inner: Arc<ReconfigurableProvider<MeterSlot>>,
}

impl Default for ReconfigurableMeterProvider {
    fn default() -> Self {
        ReconfigurableMeterProvider::new(Arc::new(NoopSource))
    }
}

impl ReconfigurableMeterProvider {
    /// Creates a provider backed by `source`.
    pub fn new(source: Arc<dyn Source<MeterDelegate>>) -> Self {
        ReconfigurableMeterProvider {
            inner: Arc::new(ReconfigurableProvider::new(source)),
        }
    }

    /// Returns the meter for `name` with neither version nor schema URL.
    pub fn get(&self, name: impl Into<Cow<'static, str>>) -> ReconfigurableMeter {
        self.inner.get(name).into()
    }

    /// Returns the meter for `name` at `version`.
    pub fn get_versioned(
        &self,
        name: impl Into<Cow<'static, str>>,
        version: impl Into<Cow<'static, str>>,
    ) -> ReconfigurableMeter {
        self.inner.get_versioned(name, version).into()
    }

    /// Starts building a meter scope named `name`.
    pub fn builder(
        &self,
        name: impl Into<Cow<'static, str>>,
    ) -> ReconfigurableBuilder<'_, MeterSlot, ReconfigurableMeter> {
        self.inner.builder(name).output()
    }

    /// Swaps in a new real meter provider and rebuilds every instrument on
    /// the new meters.
    pub fn set_delegate(&self, source: Arc<dyn Source<MeterDelegate>>) -> ReconfigureResult<()> {
        self.inner.set_delegate(source)
    }

    /// The real meter provider currently in use.
    pub fn source(&self) -> Arc<dyn Source<MeterDelegate>> {
        self.inner.source()
    }
}

impl MeterProvider for ReconfigurableMeterProvider {
    fn meter_with_scope(&self, scope: InstrumentationScope) -> Meter {
        ReconfigurableMeter::from(self.inner.with_scope(scope)).meter()
    }
}
