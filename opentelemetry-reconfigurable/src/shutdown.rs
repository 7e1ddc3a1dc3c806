//! Bounded shutdown of retired provider sets and the process shutdown hook.
use crate::error::{ReconfigureError, ReconfigureResult, ShutdownError};
use crate::sdk::ProviderSet;
use opentelemetry::{otel_debug, otel_warn};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, RecvTimeoutError};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::thread;
use std::time::Duration;

/// How long a retired provider set is given to flush and stop.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Exit status used after the shutdown hook ran on an interrupt.
const INTERRUPTED_EXIT_CODE: i32 = 130;

/// Shuts `providers` down on a helper thread and waits at most `timeout`.
///
/// On timeout the helper thread is left running; the caller moves on.
pub fn shutdown_with_timeout(
    providers: Arc<dyn ProviderSet>,
    timeout: Duration,
) -> Result<(), ShutdownError> {
    let (sender, receiver) = sync_channel(1);
    thread::Builder::new()
        .name("otel-reconfigurable-shutdown".to_string())
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| providers.shutdown()))
                .unwrap_or(Err(ShutdownError::Panicked));
            let _ = sender.send(result);
        })
        .map_err(|err| ShutdownError::Failed(err.to_string()))?;

    match receiver.recv_timeout(timeout) {
        Ok(result) => result,
        Err(RecvTimeoutError::Timeout) => Err(ShutdownError::Timeout(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(ShutdownError::Panicked),
    }
}

type Callback = Box<dyn Fn() + Send + Sync>;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static CALLBACK: Mutex<Option<(u64, Callback)>> = Mutex::new(None);
static HANDLER: OnceLock<Result<(), String>> = OnceLock::new();

fn install_handler() -> ReconfigureResult<()> {
    HANDLER
        .get_or_init(|| {
            ctrlc::set_handler(|| {
                otel_debug!(name: "ShutdownHook.Triggered");
                if let Some((_, callback)) =
                    &*CALLBACK.lock().unwrap_or_else(PoisonError::into_inner)
                {
                    callback();
                }
                std::process::exit(INTERRUPTED_EXIT_CODE);
            })
            .map_err(|err| err.to_string())
        })
        .clone()
        .map_err(ReconfigureError::ShutdownHook)
}

/// Registration of the process-wide shutdown hook.
///
/// A single interrupt handler is installed per process. On interrupt it runs
/// the most recently registered callback and exits the process. Dropping
/// the registration does not remove it; call
/// [`deregister`](ShutdownHook::deregister).
#[derive(Debug)]
pub struct ShutdownHook {
    id: u64,
}

impl ShutdownHook {
    /// Installs the interrupt handler if needed and makes `callback` the one
    /// it runs, replacing any earlier registration.
    pub fn register(callback: impl Fn() + Send + Sync + 'static) -> ReconfigureResult<Self> {
        install_handler()?;
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        let previous = CALLBACK
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((id, Box::new(callback)));
        if previous.is_some() {
            otel_warn!(
                name: "ShutdownHook.Replaced",
                message = "An earlier shutdown hook registration was replaced."
            );
        }
        Ok(ShutdownHook { id })
    }

    /// Removes the callback if it is still the registered one.
    pub fn deregister(self) {
        let mut slot = CALLBACK.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(&*slot, Some((id, _)) if *id == self.id) {
            *slot = None;
        }
    }

    /// Whether this registration is the one the handler would run.
    pub fn is_active(&self) -> bool {
        matches!(
            &*CALLBACK.lock().unwrap_or_else(PoisonError::into_inner),
            Some((id, _)) if *id == self.id
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logs::LoggerDelegate;
    use crate::metrics::MeterDelegate;
    use crate::provider::{NoopSource, Source};
    use crate::trace::TracerDelegate;
    use std::time::Instant;

    enum Behaviour {
        Succeed,
        Fail,
        Hang(Duration),
        Panic,
    }

    struct TestSet(Behaviour);

    impl ProviderSet for TestSet {
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
            match self.0 {
                Behaviour::Succeed => Ok(()),
                Behaviour::Fail => Err(ShutdownError::Failed("exporter unreachable".into())),
                Behaviour::Hang(duration) => {
                    thread::sleep(duration);
                    Ok(())
                }
                Behaviour::Panic => panic!("shutdown blew up"),
            }
        }
    }

    #[test]
    fn shutdown_results_are_reported() {
        let timeout = Duration::from_millis(500);
        assert_eq!(
            shutdown_with_timeout(Arc::new(TestSet(Behaviour::Succeed)), timeout),
            Ok(())
        );
        assert_eq!(
            shutdown_with_timeout(Arc::new(TestSet(Behaviour::Fail)), timeout),
            Err(ShutdownError::Failed("exporter unreachable".into()))
        );
        assert_eq!(
            shutdown_with_timeout(Arc::new(TestSet(Behaviour::Panic)), timeout),
            Err(ShutdownError::Panicked)
        );
    }

    #[test]
    fn shutdown_wait_is_bounded() {
        let start = Instant::now();
        let result = shutdown_with_timeout(
            Arc::new(TestSet(Behaviour::Hang(Duration::from_secs(5)))),
            Duration::from_millis(100),
        );
        assert_eq!(result, Err(ShutdownError::Timeout(Duration::from_millis(100))));
        assert!(start.elapsed() < Duration::from_secs(2));
    }

    #[test]
    fn latest_hook_registration_wins() {
        let first = ShutdownHook::register(|| {}).unwrap();
        assert!(first.is_active());

        let second = ShutdownHook::register(|| {}).unwrap();
        assert!(!first.is_active());
        assert!(second.is_active());

        // a stale registration cannot remove the current one
        first.deregister();
        assert!(second.is_active());

        second.deregister();
        assert!(CALLBACK.lock().unwrap().is_none());
    }
}
