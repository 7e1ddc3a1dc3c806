//! The top-level facade tying the four reconfigurable providers to one
//! configurable SDK.
use crate::config::{ConfigProperties, SdkSummary};
use crate::error::{ReconfigureError, ReconfigureResult, ShutdownError};
use crate::logs::{ReconfigurableEventLoggerProvider, ReconfigurableLoggerProvider};
use crate::metrics::ReconfigurableMeterProvider;
use crate::sdk::{
    text_map_propagator, AutoConfigure, BuiltSdk, ExporterDescriptor, ProviderSet,
    PropagatorKind, SdkFactory,
};
use crate::shutdown::{shutdown_with_timeout, ShutdownHook, DEFAULT_SHUTDOWN_TIMEOUT};
use crate::trace::ReconfigurableTracerProvider;
use opentelemetry::propagation::TextMapCompositePropagator;
use opentelemetry::{otel_debug, otel_info, otel_warn};
use opentelemetry_sdk::Resource;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

/// Component notified after every [`TelemetryFacade::configure`].
pub trait LifecycleListener: Send + Sync {
    /// Listeners run in ascending ordinal order; ties keep registration order.
    fn ordinal(&self) -> i32 {
        0
    }

    /// Name used in diagnostics.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Called with the configuration that was just installed.
    ///
    /// Errors and panics are logged and do not stop other listeners.
    fn after_configuration(
        &self,
        config: &ConfigProperties,
    ) -> Result<(), Box<dyn Error + Send + Sync>>;
}

struct State {
    providers: Arc<dyn ProviderSet>,
    config: ConfigProperties,
    resource: Resource,
    log_exporters: Vec<ExporterDescriptor>,
    propagators: Vec<PropagatorKind>,
}

impl From<BuiltSdk> for State {
    fn from(built: BuiltSdk) -> Self {
        State {
            providers: built.providers,
            config: built.config,
            resource: built.resource,
            log_exporters: built.log_exporters,
            propagators: built.propagators,
        }
    }
}

fn shutdown_logged(
    providers: Arc<dyn ProviderSet>,
    timeout: Duration,
) -> Result<(), ShutdownError> {
    let result = shutdown_with_timeout(providers, timeout);
    if let Err(err) = &result {
        otel_warn!(
            name: "Facade.ShutdownFailed",
            error = format!("{err}")
        );
    }
    result
}

/// Shuts down the set active at process exit, if the facade is still alive.
fn shutdown_on_exit(
    state: &Weak<RwLock<State>>,
    timeout: Duration,
) -> Option<Result<(), ShutdownError>> {
    let providers = state
        .upgrade()?
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .providers
        .clone();
    Some(shutdown_logged(providers, timeout))
}

/// Hot-reconfigurable entry point for tracers, meters, loggers and event
/// loggers.
///
/// Providers, and every tracer, meter, instrument and logger obtained from
/// them, stay valid for the lifetime of the facade. [`configure`] builds a
/// new SDK, installs it behind all of them and shuts the previous one down.
///
/// [`configure`]: TelemetryFacade::configure
pub struct TelemetryFacade {
    tracer_provider: ReconfigurableTracerProvider,
    meter_provider: ReconfigurableMeterProvider,
    logger_provider: ReconfigurableLoggerProvider,
    event_logger_provider: ReconfigurableEventLoggerProvider,
    factory: Box<dyn SdkFactory>,
    listeners: Mutex<Vec<Arc<dyn LifecycleListener>>>,
    state: Arc<RwLock<State>>,
    configure_lock: Mutex<()>,
    shutdown_hook: Mutex<Option<ShutdownHook>>,
    shutdown_timeout: Duration,
}

impl Default for TelemetryFacade {
    fn default() -> Self {
        TelemetryFacade::builder().build()
    }
}

impl fmt::Debug for TelemetryFacade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryFacade")
            .field("sdk_active", &self.is_sdk_active())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

impl TelemetryFacade {
    /// Creates a builder.
    pub fn builder() -> TelemetryFacadeBuilder {
        TelemetryFacadeBuilder::default()
    }

    /// Whether `properties` ask for a real SDK: any of the exporter or OTLP
    /// endpoint keys is set.
    pub fn wants_sdk(properties: &HashMap<String, String>) -> bool {
        ConfigProperties::new(properties.iter()).wants_sdk()
    }

    /// Builds a new SDK from `properties` and `resource` and installs it
    /// behind every provider, or reverts to no-op providers when
    /// `properties` do not ask for an SDK.
    ///
    /// The previous SDK is shut down once the new one is installed in every
    /// provider; a slow or failing shutdown is logged, not returned. Calls
    /// are serialized.
    pub fn configure(
        &self,
        properties: &HashMap<String, String>,
        resource: Resource,
        disable_shutdown_hook: bool,
    ) -> ReconfigureResult<()> {
        let _configuring = self
            .configure_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        let built = if Self::wants_sdk(properties) {
            let config = ConfigProperties::resolve(properties);
            self.factory.build(&config, &resource).map_err(|err| {
                otel_warn!(
                    name: "Facade.BuildFailed",
                    error = format!("{err}")
                );
                err
            })?
        } else {
            BuiltSdk::noop()
        };
        let sdk_active = !built.providers.is_noop();

        self.install(built)?;
        self.update_shutdown_hook(disable_shutdown_hook);
        crate::global::refresh(self);

        let config = self.config();
        if sdk_active {
            otel_info!(
                name: "Facade.Configured",
                summary = format!("{}", SdkSummary::new(&config, &self.resource()))
            );
        } else {
            otel_info!(name: "Facade.ConfiguredNoop");
        }
        self.notify_listeners(&config);
        Ok(())
    }

    /// Shuts the active SDK down, reverts every provider to no-op, removes
    /// the shutdown hook and the global registration. Calling it again has no
    /// effect.
    pub fn close(&self) {
        let _configuring = self
            .configure_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Err(err) = self.install(BuiltSdk::noop()) {
            otel_warn!(name: "Facade.CloseFailed", error = format!("{err}"));
        }
        if let Some(hook) = self
            .shutdown_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            hook.deregister();
        }
        crate::global::deregister_if(self);
        otel_debug!(name: "Facade.Closed");
    }

    /// Installs `built` in every provider, then shuts the replaced set down.
    ///
    /// Each signal is committed on its own. If any of them rejects the new
    /// set, the first error is returned and the replaced set is kept running
    /// because the rejecting providers still use it.
    fn install(&self, built: BuiltSdk) -> ReconfigureResult<()> {
        let failure = self.swap_all(built.providers.as_ref());

        let retired = std::mem::replace(
            &mut *self.state.write().unwrap_or_else(PoisonError::into_inner),
            State::from(built),
        );
        match failure {
            None => {
                if !retired.providers.is_noop() {
                    self.shutdown(retired.providers);
                }
                Ok(())
            }
            Some(err) => {
                otel_warn!(
                    name: "Facade.PreviousSdkRetained",
                    error = format!("{err}")
                );
                Err(err)
            }
        }
    }

    fn swap_all(&self, providers: &dyn ProviderSet) -> Option<ReconfigureError> {
        let logger_source = providers.logger_source();
        [
            self.tracer_provider.set_delegate(providers.tracer_source()),
            self.meter_provider.set_delegate(providers.meter_source()),
            self.logger_provider.set_delegate(logger_source.clone()),
            self.event_logger_provider.set_delegate(logger_source),
        ]
        .into_iter()
        .find_map(Result::err)
    }

    fn shutdown(&self, providers: Arc<dyn ProviderSet>) {
        if shutdown_logged(providers, self.shutdown_timeout).is_ok() {
            otel_debug!(name: "Facade.PreviousSdkShutdown");
        }
    }

    fn update_shutdown_hook(&self, disable_shutdown_hook: bool) {
        let mut hook = self
            .shutdown_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if disable_shutdown_hook {
            if let Some(registered) = hook.take() {
                registered.deregister();
                otel_debug!(name: "Facade.ShutdownHookRemoved");
            }
            return;
        }
        if hook.as_ref().is_some_and(ShutdownHook::is_active) {
            return;
        }

        let state = Arc::downgrade(&self.state);
        let timeout = self.shutdown_timeout;
        match ShutdownHook::register(move || {
            shutdown_on_exit(&state, timeout);
        }) {
            Ok(registered) => {
                *hook = Some(registered);
                otel_debug!(name: "Facade.ShutdownHookRegistered");
            }
            Err(err) => {
                otel_warn!(
                    name: "Facade.ShutdownHookFailed",
                    error = format!("{err}")
                );
            }
        }
    }

    fn notify_listeners(&self, config: &ConfigProperties) {
        let mut listeners = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        listeners.sort_by_key(|listener| listener.ordinal());

        for listener in listeners {
            otel_debug!(
                name: "Facade.NotifyListener",
                listener = listener.name().to_owned()
            );
            match panic::catch_unwind(AssertUnwindSafe(|| listener.after_configuration(config))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    otel_warn!(
                        name: "Facade.ListenerFailed",
                        listener = listener.name().to_owned(),
                        error = format!("{err}")
                    );
                }
                Err(_) => {
                    otel_warn!(
                        name: "Facade.ListenerPanicked",
                        listener = listener.name().to_owned()
                    );
                }
            }
        }
    }

    /// Adds a listener notified after every configuration.
    pub fn add_listener(&self, listener: Arc<dyn LifecycleListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Reconfigurable tracer provider.
    pub fn tracer_provider(&self) -> &ReconfigurableTracerProvider {
        &self.tracer_provider
    }

    /// Reconfigurable meter provider.
    pub fn meter_provider(&self) -> &ReconfigurableMeterProvider {
        &self.meter_provider
    }

    /// Reconfigurable logger provider.
    pub fn logger_provider(&self) -> &ReconfigurableLoggerProvider {
        &self.logger_provider
    }

    /// Reconfigurable event logger provider.
    pub fn event_logger_provider(&self) -> &ReconfigurableEventLoggerProvider {
        &self.event_logger_provider
    }

    /// Configuration of the active SDK; empty while no SDK is configured.
    pub fn config(&self) -> ConfigProperties {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .config
            .clone()
    }

    /// Resource of the active SDK; empty while no SDK is configured.
    pub fn resource(&self) -> Resource {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .resource
            .clone()
    }

    /// Exporters the active SDK sends logs to.
    pub fn log_exporters(&self) -> Vec<ExporterDescriptor> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .log_exporters
            .clone()
    }

    /// Propagator for the configured formats.
    pub fn propagator(&self) -> TextMapCompositePropagator {
        text_map_propagator(
            &self
                .state
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .propagators,
        )
    }

    /// Whether this facade's shutdown hook is the one the process runs on
    /// interrupt.
    pub fn has_shutdown_hook(&self) -> bool {
        self.shutdown_hook
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(ShutdownHook::is_active)
    }

    /// Whether a real SDK is installed.
    pub fn is_sdk_active(&self) -> bool {
        !self
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .providers
            .is_noop()
    }
}

/// Builder for [`TelemetryFacade`].
pub struct TelemetryFacadeBuilder {
    factory: Box<dyn SdkFactory>,
    listeners: Vec<Arc<dyn LifecycleListener>>,
    shutdown_timeout: Duration,
}

impl Default for TelemetryFacadeBuilder {
    fn default() -> Self {
        TelemetryFacadeBuilder {
            factory: Box::new(AutoConfigure),
            listeners: Vec::new(),
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

impl fmt::Debug for TelemetryFacadeBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TelemetryFacadeBuilder")
            .field("listeners", &self.listeners.len())
            .field("shutdown_timeout", &self.shutdown_timeout)
            .finish()
    }
}

impl TelemetryFacadeBuilder {
    /// Uses `factory` instead of [`AutoConfigure`] to build SDKs.
    pub fn with_factory<F: SdkFactory + 'static>(mut self, factory: F) -> Self {
        self.factory = Box::new(factory);
        self
    }

    /// Adds a lifecycle listener.
    pub fn with_listener(mut self, listener: Arc<dyn LifecycleListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Overrides how long a retired SDK is given to shut down.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Creates the facade with no-op providers.
    pub fn build(self) -> TelemetryFacade {
        TelemetryFacade {
            tracer_provider: ReconfigurableTracerProvider::default(),
            meter_provider: ReconfigurableMeterProvider::default(),
            logger_provider: ReconfigurableLoggerProvider::default(),
            event_logger_provider: ReconfigurableEventLoggerProvider::default(),
            factory: self.factory,
            listeners: Mutex::new(self.listeners),
            state: Arc::new(RwLock::new(State::from(BuiltSdk::noop()))),
            configure_lock: Mutex::new(()),
            shutdown_hook: Mutex::new(None),
            shutdown_timeout: self.shutdown_timeout,
        }
    }
}
