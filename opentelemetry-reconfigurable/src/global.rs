//! Process-wide [`TelemetryFacade`] registration.
//!
//! At most one facade is registered at a time. Registering also installs its
//! tracer provider, meter provider and propagator as the
//! [`opentelemetry::global`] ones, so instrumentation using the global API
//! follows every reconfiguration.
use crate::facade::TelemetryFacade;
use crate::metrics::ReconfigurableMeterProvider;
use crate::trace::ReconfigurableTracerProvider;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::{otel_debug, otel_warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};

static CLAIMED: AtomicBool = AtomicBool::new(false);
static FACADE: RwLock<Option<Arc<TelemetryFacade>>> = RwLock::new(None);
// Wakes `get_or_init` callers waiting on another thread's initializer.
static SETTLED: (Mutex<()>, Condvar) = (Mutex::new(()), Condvar::new());

fn claim() -> bool {
    CLAIMED
        .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
        .is_ok()
}

fn wake_waiters() {
    let _settled = SETTLED.0.lock().unwrap_or_else(PoisonError::into_inner);
    SETTLED.1.notify_all();
}

fn install(facade: Arc<TelemetryFacade>) {
    let mut slot = FACADE.write().unwrap_or_else(PoisonError::into_inner);
    opentelemetry::global::set_tracer_provider(facade.tracer_provider().clone());
    opentelemetry::global::set_meter_provider(facade.meter_provider().clone());
    opentelemetry::global::set_text_map_propagator(facade.propagator());
    *slot = Some(facade);
    drop(slot);
    wake_waiters();
    otel_debug!(name: "Global.Registered");
}

fn reset(slot: &mut Option<Arc<TelemetryFacade>>) -> Option<Arc<TelemetryFacade>> {
    let facade = slot.take()?;
    opentelemetry::global::set_tracer_provider(ReconfigurableTracerProvider::default());
    opentelemetry::global::set_meter_provider(ReconfigurableMeterProvider::default());
    opentelemetry::global::set_text_map_propagator(TextMapCompositePropagator::new(Vec::new()));
    CLAIMED.store(false, Ordering::Release);
    otel_debug!(name: "Global.Deregistered");
    Some(facade)
}

/// Registers `facade` as the process-wide one.
///
/// Returns `false` and leaves the existing registration in place if another
/// facade is already registered.
pub fn register(facade: Arc<TelemetryFacade>) -> bool {
    if !claim() {
        otel_warn!(
            name: "Global.AlreadyRegistered",
            message = "A telemetry facade is already registered; keeping the existing one."
        );
        return false;
    }
    install(facade);
    true
}

/// Returns the registered facade, if any.
pub fn get() -> Option<Arc<TelemetryFacade>> {
    FACADE
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}

/// Returns the registered facade, building and registering one with `init`
/// if there is none.
///
/// `init` runs at most once across concurrent callers; the others block
/// until its facade is installed. If `init` panics, a waiting caller runs
/// its own initializer instead.
pub fn get_or_init(init: impl FnOnce() -> TelemetryFacade) -> Arc<TelemetryFacade> {
    loop {
        if let Some(facade) = get() {
            return facade;
        }
        if claim() {
            break;
        }
        let settled = SETTLED.0.lock().unwrap_or_else(PoisonError::into_inner);
        // another thread holds the claim but has not installed its facade yet
        if get().is_none() && CLAIMED.load(Ordering::Acquire) {
            drop(
                SETTLED
                    .1
                    .wait(settled)
                    .unwrap_or_else(PoisonError::into_inner),
            );
        }
    }

    let release = ReleaseOnPanic;
    let facade = Arc::new(init());
    std::mem::forget(release);
    install(facade.clone());
    facade
}

/// Gives the claim back if `init` panics and wakes the callers waiting on it.
struct ReleaseOnPanic;

impl Drop for ReleaseOnPanic {
    fn drop(&mut self) {
        CLAIMED.store(false, Ordering::Release);
        wake_waiters();
    }
}

/// Removes the registered facade and restores no-op global providers.
///
/// The facade itself keeps working; call [`TelemetryFacade::close`] to shut
/// its SDK down.
pub fn deregister() -> Option<Arc<TelemetryFacade>> {
    reset(&mut FACADE.write().unwrap_or_else(PoisonError::into_inner))
}

/// Deregisters `facade` if it is the registered one.
pub(crate) fn deregister_if(facade: &TelemetryFacade) {
    let mut slot = FACADE.write().unwrap_or_else(PoisonError::into_inner);
    if is_registered(&slot, facade) {
        reset(&mut slot);
    }
}

/// Re-installs the global propagator after `facade` was reconfigured.
pub(crate) fn refresh(facade: &TelemetryFacade) {
    let slot = FACADE.read().unwrap_or_else(PoisonError::into_inner);
    if is_registered(&slot, facade) {
        opentelemetry::global::set_text_map_propagator(facade.propagator());
    }
}

fn is_registered(slot: &Option<Arc<TelemetryFacade>>, facade: &TelemetryFacade) -> bool {
    slot.as_ref()
        .is_some_and(|registered| std::ptr::eq(Arc::as_ptr(registered), facade))
}
