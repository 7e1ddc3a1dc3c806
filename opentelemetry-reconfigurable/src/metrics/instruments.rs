//! Instruments created through a [`ReconfigurableMeter`], retained so they
//! can be rebuilt against every new meter.
//!
//! [`ReconfigurableMeter`]: super::ReconfigurableMeter
use super::MeterDelegate;
use crate::handle::{Delegate, ReconfigurableHandle};
use opentelemetry::metrics::{
    AsyncInstrument, Counter, Gauge, Histogram, Meter, ObservableCounter, ObservableGauge,
    ObservableUpDownCounter, SyncInstrument, UpDownCounter,
};
use opentelemetry::{otel_debug, otel_warn, KeyValue};
use std::any::Any;
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError};

/// Everything needed to create an instrument again on another meter.
#[derive(Clone, Debug, PartialEq)]
pub struct InstrumentDescriptor {
    /// Instrument name.
    pub name: Cow<'static, str>,
    /// Optional description.
    pub description: Option<Cow<'static, str>>,
    /// Optional unit.
    pub unit: Option<Cow<'static, str>>,
    /// Explicit bucket boundaries, histograms only.
    pub boundaries: Option<Vec<f64>>,
}

pub(crate) type SharedCallback<T> = Arc<dyn Fn(&dyn AsyncInstrument<T>) + Send + Sync>;

/// A synchronous API instrument type that can be rebuilt from a descriptor.
pub(crate) trait SyncKind: Send + Sync + 'static {
    type Value: Send + Sync + 'static;

    /// Registry key, unique per instrument type.
    const KIND: &'static str;

    fn build(meter: &Meter, descriptor: &InstrumentDescriptor) -> Self;

    fn record(&self, value: Self::Value, attributes: &[KeyValue]);

    fn wrap(instrument: Arc<dyn SyncInstrument<Self::Value> + Send + Sync>) -> Self;
}

macro_rules! sync_kind {
    ($instrument:ty, $value:ty, $method:ident, $record:ident $(, $boundaries:ident)?) => {
        impl SyncKind for $instrument {
            type Value = $value;
            const KIND: &'static str = stringify!($method);

            fn build(meter: &Meter, descriptor: &InstrumentDescriptor) -> Self {
                let mut builder = meter.$method(descriptor.name.clone());
                if let Some(description) = &descriptor.description {
                    builder = builder.with_description(description.clone());
                }
                if let Some(unit) = &descriptor.unit {
                    builder = builder.with_unit(unit.clone());
                }
                $(
                    if let Some(boundaries) = &descriptor.$boundaries {
                        builder = builder.with_boundaries(boundaries.clone());
                    }
                )?
                builder.build()
            }

            fn record(&self, value: $value, attributes: &[KeyValue]) {
                self.$record(value, attributes)
            }

            fn wrap(instrument: Arc<dyn SyncInstrument<$value> + Send + Sync>) -> Self {
                <$instrument>::new(instrument)
            }
        }
    };
}

sync_kind!(Counter<u64>, u64, u64_counter, add);
sync_kind!(Counter<f64>, f64, f64_counter, add);
sync_kind!(UpDownCounter<i64>, i64, i64_up_down_counter, add);
sync_kind!(UpDownCounter<f64>, f64, f64_up_down_counter, add);
sync_kind!(Gauge<u64>, u64, u64_gauge, record);
sync_kind!(Gauge<f64>, f64, f64_gauge, record);
sync_kind!(Gauge<i64>, i64, i64_gauge, record);
sync_kind!(Histogram<u64>, u64, u64_histogram, record, boundaries);
sync_kind!(Histogram<f64>, f64, f64_histogram, record, boundaries);

/// An observable API instrument type whose callbacks can be registered on
/// any meter.
pub(crate) trait ObservableKind: Send + Sync + 'static {
    type Value: 'static;

    fn register(
        meter: &Meter,
        descriptor: &InstrumentDescriptor,
        callbacks: &[SharedCallback<Self::Value>],
    );

    fn marker() -> Self;
}

macro_rules! observable_kind {
    ($instrument:ty, $value:ty, $method:ident) => {
        impl ObservableKind for $instrument {
            type Value = $value;

            fn register(
                meter: &Meter,
                descriptor: &InstrumentDescriptor,
                callbacks: &[SharedCallback<$value>],
            ) {
                let mut builder = meter.$method(descriptor.name.clone());
                if let Some(description) = &descriptor.description {
                    builder = builder.with_description(description.clone());
                }
                if let Some(unit) = &descriptor.unit {
                    builder = builder.with_unit(unit.clone());
                }
                for callback in callbacks {
                    let callback = callback.clone();
                    builder = builder
                        .with_callback(move |observer: &dyn AsyncInstrument<$value>| {
                            callback(observer)
                        });
                }
                let _ = builder.build();
            }

            fn marker() -> Self {
                <$instrument>::new()
            }
        }
    };
}

observable_kind!(ObservableCounter<u64>, u64, u64_observable_counter);
observable_kind!(ObservableCounter<f64>, f64, f64_observable_counter);
observable_kind!(ObservableUpDownCounter<i64>, i64, i64_observable_up_down_counter);
observable_kind!(ObservableUpDownCounter<f64>, f64, f64_observable_up_down_counter);
observable_kind!(ObservableGauge<u64>, u64, u64_observable_gauge);
observable_kind!(ObservableGauge<i64>, i64, i64_observable_gauge);
observable_kind!(ObservableGauge<f64>, f64, f64_observable_gauge);

/// An instrument together with the meter it was built on.
struct Built<I> {
    meter_id: u64,
    instrument: I,
}

impl<I: Send + Sync + 'static> Delegate for Built<I> {}

/// Swappable synchronous instrument handed to callers inside the API type.
struct SyncInstrumentHandle<I> {
    descriptor: InstrumentDescriptor,
    handle: ReconfigurableHandle<Built<I>>,
}

impl<I: SyncKind> SyncInstrumentHandle<I> {
    fn new(descriptor: InstrumentDescriptor, meter: &MeterDelegate) -> Self {
        let instrument = I::build(&meter.meter, &descriptor);
        SyncInstrumentHandle {
            descriptor,
            handle: ReconfigurableHandle::new(Built {
                meter_id: meter.id,
                instrument,
            }),
        }
    }
}

impl<I: SyncKind> SyncInstrument<I::Value> for SyncInstrumentHandle<I> {
    fn measure(&self, value: I::Value, attributes: &[KeyValue]) {
        self.handle
            .invoke(|built| built.instrument.record(value, attributes))
    }
}

trait Rebuild: Send + Sync {
    fn rebuild(&self, meter: &MeterDelegate);

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<I: SyncKind> Rebuild for SyncInstrumentHandle<I> {
    fn rebuild(&self, meter: &MeterDelegate) {
        if self.handle.invoke(|built| built.meter_id) == meter.id {
            return;
        }
        let instrument = I::build(&meter.meter, &self.descriptor);
        if let Err(err) = self.handle.set_delegate(Built {
            meter_id: meter.id,
            instrument,
        }) {
            otel_warn!(
                name: "InstrumentRegistry.RebuildFailed",
                instrument = format!("{}", self.descriptor.name),
                error = format!("{err}")
            );
        }
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// One observable registration; every call creates its own so that each
/// callback keeps firing after a swap.
struct ObservableRegistration<I: ObservableKind> {
    descriptor: InstrumentDescriptor,
    callbacks: Vec<SharedCallback<I::Value>>,
    meter_id: Option<u64>,
    _kind: PhantomData<fn() -> I>,
}

trait Reregister: Send + Sync {
    fn register(&mut self, meter: &MeterDelegate);
}

impl<I: ObservableKind> Reregister for ObservableRegistration<I> {
    fn register(&mut self, meter: &MeterDelegate) {
        if self.meter_id == Some(meter.id) {
            return;
        }
        I::register(&meter.meter, &self.descriptor, &self.callbacks);
        self.meter_id = Some(meter.id);
    }
}

#[derive(Default)]
struct Instruments {
    sync: HashMap<(Cow<'static, str>, &'static str), Arc<dyn Rebuild>>,
    observable: Vec<Box<dyn Reregister>>,
}

/// Per-meter registry of every instrument handed out.
///
/// The registry mutex is held while an instrument is created and while the
/// registry is rebuilt, so an instrument is never half-registered on either
/// meter.
#[derive(Default)]
pub(crate) struct InstrumentRegistry {
    instruments: Mutex<Instruments>,
}

impl InstrumentRegistry {
    /// Returns the synchronous instrument for `descriptor`, creating it on the
    /// current meter if this name and kind were not requested before.
    pub(crate) fn sync<I: SyncKind>(
        &self,
        meter: &ReconfigurableHandle<MeterDelegate>,
        descriptor: InstrumentDescriptor,
    ) -> I {
        let mut instruments = self
            .instruments
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let key = (descriptor.name.clone(), I::KIND);
        if let Some(existing) = instruments.sync.get(&key) {
            if let Ok(handle) = existing.clone().into_any().downcast::<SyncInstrumentHandle<I>>() {
                return I::wrap(handle);
            }
        }
        let handle =
            meter.invoke(|delegate| Arc::new(SyncInstrumentHandle::<I>::new(descriptor, delegate)));
        instruments.sync.insert(key, handle.clone());
        I::wrap(handle)
    }

    /// Registers an observable instrument on the current meter and retains it
    /// for later meters.
    pub(crate) fn observable<I: ObservableKind>(
        &self,
        meter: &ReconfigurableHandle<MeterDelegate>,
        descriptor: InstrumentDescriptor,
        callbacks: Vec<SharedCallback<I::Value>>,
    ) -> I {
        let mut registration = ObservableRegistration::<I> {
            descriptor,
            callbacks,
            meter_id: None,
            _kind: PhantomData,
        };
        let mut instruments = self
            .instruments
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        meter.invoke(|delegate| registration.register(delegate));
        instruments.observable.push(Box::new(registration));
        I::marker()
    }

    /// Rebuilds every instrument not yet built on the meter `meter` holds.
    pub(crate) fn rebuild(&self, meter: &ReconfigurableHandle<MeterDelegate>) {
        let mut instruments = self
            .instruments
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Instruments { sync, observable } = &mut *instruments;
        meter.invoke(|delegate| {
            for instrument in sync.values() {
                instrument.rebuild(delegate);
            }
            for registration in observable.iter_mut() {
                registration.register(delegate);
            }
        });
        otel_debug!(
            name: "InstrumentRegistry.Rebuilt",
            sync = sync.len(),
            observable = observable.len()
        );
    }

    /// Number of distinct synchronous instruments.
    pub(crate) fn sync_count(&self) -> usize {
        self.instruments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .sync
            .len()
    }

    /// Number of observable registrations.
    pub(crate) fn observable_count(&self) -> usize {
        self.instruments
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observable
            .len()
    }
}

impl fmt::Debug for InstrumentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstrumentRegistry")
            .field("sync", &self.sync_count())
            .field("observable", &self.observable_count())
            .finish()
    }
}
