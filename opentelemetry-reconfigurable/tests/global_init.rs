use opentelemetry_reconfigurable::{global, TelemetryFacade};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

// Runs in its own test binary so the process-wide registration starts empty.
#[test]
fn concurrent_callers_wait_for_a_single_initialization() {
    let initializations = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(8));

    let callers: Vec<_> = (0..8)
        .map(|_| {
            let initializations = initializations.clone();
            let barrier = barrier.clone();
            thread::spawn(move || {
                barrier.wait();
                global::get_or_init(|| {
                    initializations.fetch_add(1, Ordering::SeqCst);
                    // keep the others blocked while the facade is built
                    thread::sleep(Duration::from_millis(50));
                    TelemetryFacade::default()
                })
            })
        })
        .collect();

    let facades: Vec<_> = callers
        .into_iter()
        .map(|caller| caller.join().unwrap())
        .collect();

    assert_eq!(initializations.load(Ordering::SeqCst), 1);
    let registered = global::get().unwrap();
    assert!(facades
        .iter()
        .all(|facade| Arc::ptr_eq(facade, &registered)));
    assert!(!global::register(Arc::new(TelemetryFacade::default())));

    global::deregister();
    assert!(global::get().is_none());
}
