//! The swappable single-slot container every reconfigurable object is built on.
use crate::error::{ReconfigureError, ReconfigureResult};
use std::fmt;
use std::sync::{PoisonError, RwLock};

/// Optional feature set a delegate may expose on top of its signal API.
pub trait Extended {
    /// Returns `false` when telemetry emitted through the delegate is
    /// guaranteed to be discarded.
    fn is_enabled(&self) -> bool;
}

/// A concrete telemetry object that can sit behind a [`ReconfigurableHandle`].
pub trait Delegate: Send + Sync + 'static {
    /// Typed view on the [`Extended`] capability, when the delegate has it.
    fn as_extended(&self) -> Option<&dyn Extended> {
        None
    }
}

/// Stable, shareable wrapper forwarding every call to a swappable delegate.
///
/// Emission goes through [`invoke`](ReconfigurableHandle::invoke), which
/// holds the read side of the handle's own lock for the duration of the call,
/// so many emitters proceed in parallel while a
/// [`set_delegate`](ReconfigurableHandle::set_delegate) waits for them to
/// drain before replacing the delegate.
pub struct ReconfigurableHandle<T> {
    delegate: RwLock<T>,
    extended: bool,
}

impl<T: Delegate> ReconfigurableHandle<T> {
    /// Wraps the first delegate. Its capabilities become the contract every
    /// later delegate must honour.
    pub fn new(delegate: T) -> Self {
        let extended = delegate.as_extended().is_some();
        ReconfigurableHandle {
            delegate: RwLock::new(delegate),
            extended,
        }
    }

    /// Runs `f` against the current delegate under the read lock.
    pub fn invoke<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        let delegate = self.delegate.read().unwrap_or_else(PoisonError::into_inner);
        f(&delegate)
    }

    /// Checks that `delegate` honours this handle's capability contract.
    pub fn check(&self, delegate: &T) -> ReconfigureResult<()> {
        if self.extended && delegate.as_extended().is_none() {
            return Err(ReconfigureError::CapabilityMismatch {
                delegate: std::any::type_name::<T>(),
                capability: "extended",
            });
        }
        Ok(())
    }

    /// Replaces the delegate once every in-flight invocation has finished.
    pub fn set_delegate(&self, delegate: T) -> ReconfigureResult<()> {
        self.check(&delegate)?;
        let mut current = self.delegate.write().unwrap_or_else(PoisonError::into_inner);
        *current = delegate;
        Ok(())
    }

    /// Whether telemetry emitted through this handle can reach an exporter.
    ///
    /// Delegates without the [`Extended`] capability are assumed enabled.
    pub fn is_enabled(&self) -> bool {
        self.invoke(|delegate| {
            delegate
                .as_extended()
                .map_or(true, |extended| extended.is_enabled())
        })
    }

    /// Whether this handle requires the [`Extended`] capability.
    pub fn requires_extended(&self) -> bool {
        self.extended
    }
}

impl<T> fmt::Debug for ReconfigurableHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconfigurableHandle")
            .field("delegate", &std::any::type_name::<T>())
            .field("extended", &self.extended)
            .finish()
    }
}
