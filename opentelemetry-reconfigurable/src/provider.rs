//! Generic scope registry shared by the trace, metrics, logs and events providers.
use crate::error::ReconfigureResult;
use crate::handle::{Delegate, ReconfigurableHandle};
use crate::scope::ScopeKey;
use opentelemetry::{otel_debug, otel_warn, InstrumentationScope, KeyValue};
use std::borrow::Cow;
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, PoisonError, RwLock};

/// The real provider behind a reconfigurable provider: derives the concrete
/// delegate for one instrumentation scope.
pub trait Source<D>: Send + Sync {
    /// Creates the delegate for `scope`.
    fn create(&self, scope: &InstrumentationScope) -> D;
}

/// Real provider installed before the first configuration; every delegate it
/// creates discards its input and reports itself disabled.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopSource;

/// An object registered per scope in a [`ReconfigurableProvider`].
///
/// Plain handles are slots on their own. Meters wrap their handle together
/// with an instrument registry that must follow every swap, which is what
/// [`after_swap`](Slot::after_swap) is for.
pub trait Slot: Send + Sync + 'static {
    /// Concrete object held by the slot's handle.
    type Delegate: Delegate;

    /// Creates a slot around its first delegate.
    fn new(delegate: Self::Delegate) -> Self;

    /// The handle holding the current delegate.
    fn handle(&self) -> &ReconfigurableHandle<Self::Delegate>;

    /// Called once the handle holds the new delegate.
    fn after_swap(&self) {}
}

impl<D: Delegate> Slot for ReconfigurableHandle<D> {
    type Delegate = D;

    fn new(delegate: D) -> Self {
        ReconfigurableHandle::new(delegate)
    }

    fn handle(&self) -> &ReconfigurableHandle<D> {
        self
    }
}

struct Registered<S> {
    scope: InstrumentationScope,
    slot: Arc<S>,
}

/// Registry mapping [`ScopeKey`]s to long-lived slots whose delegates are
/// re-derived from a new [`Source`] on every
/// [`set_delegate`](ReconfigurableProvider::set_delegate).
pub struct ReconfigurableProvider<S: Slot> {
    source: RwLock<Arc<dyn Source<S::Delegate>>>,
    slots: Mutex<HashMap<ScopeKey, Registered<S>>>,
}

impl<S: Slot> ReconfigurableProvider<S> {
    /// Creates a provider backed by `source`.
    pub fn new(source: Arc<dyn Source<S::Delegate>>) -> Self {
        ReconfigurableProvider {
            source: RwLock::new(source),
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Returns the slot for `name` with neither version nor schema URL.
    pub fn get(&self, name: impl Into<Cow<'static, str>>) -> Arc<S> {
        self.resolve(ScopeKey::new(name), Vec::new())
    }

    /// Returns the slot for `name` at `version`.
    pub fn get_versioned(
        &self,
        name: impl Into<Cow<'static, str>>,
        version: impl Into<Cow<'static, str>>,
    ) -> Arc<S> {
        self.resolve(ScopeKey::new(name).with_version(version), Vec::new())
    }

    /// Starts building a scope named `name`.
    pub fn builder(&self, name: impl Into<Cow<'static, str>>) -> ReconfigurableBuilder<'_, S> {
        ReconfigurableBuilder {
            provider: self,
            key: ScopeKey::new(name),
            attributes: Vec::new(),
            _output: PhantomData,
        }
    }

    /// Returns the slot for a fully specified scope.
    pub fn with_scope(&self, scope: InstrumentationScope) -> Arc<S> {
        let key = ScopeKey::from(&scope);
        let attributes = scope.attributes().cloned().collect();
        self.resolve(key, attributes)
    }

    fn resolve(&self, key: ScopeKey, attributes: Vec<KeyValue>) -> Arc<S> {
        if key.name().is_empty() {
            otel_warn!(
                name: "ReconfigurableProvider.EmptyScopeName",
                message = "Scope name is empty; a default name may be substituted by the SDK."
            );
        }
        let source = self.source.read().unwrap_or_else(PoisonError::into_inner);
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        match slots.entry(key) {
            Entry::Occupied(registered) => registered.get().slot.clone(),
            Entry::Vacant(vacant) => {
                let scope = vacant.key().to_scope(attributes);
                let slot = Arc::new(S::new(source.create(&scope)));
                vacant.insert(Registered {
                    scope,
                    slot: slot.clone(),
                });
                slot
            }
        }
    }

    /// Swaps in a new real provider and rebuilds the delegate of every
    /// registered slot from it.
    ///
    /// Delegates for all slots are derived and checked before anything is
    /// replaced: a capability mismatch on any of them leaves the provider and
    /// every handle untouched. Setting the source already in use is a no-op.
    pub fn set_delegate(&self, source: Arc<dyn Source<S::Delegate>>) -> ReconfigureResult<()> {
        let mut current = self.source.write().unwrap_or_else(PoisonError::into_inner);
        if Arc::ptr_eq(&*current, &source) {
            return Ok(());
        }
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);

        let rebuilt = slots
            .values()
            .map(|registered| (registered, source.create(&registered.scope)))
            .collect::<Vec<_>>();
        for (registered, delegate) in &rebuilt {
            registered.slot.handle().check(delegate)?;
        }

        *current = source;
        for (registered, delegate) in rebuilt {
            registered.slot.handle().set_delegate(delegate)?;
            registered.slot.after_swap();
        }

        otel_debug!(
            name: "ReconfigurableProvider.DelegateSet",
            slot = std::any::type_name::<S>(),
            rebuilt = slots.len()
        );
        Ok(())
    }

    /// The real provider currently in use.
    pub fn source(&self) -> Arc<dyn Source<S::Delegate>> {
        self.source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of distinct scopes handed out so far.
    pub fn scope_count(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<S: Slot> fmt::Debug for ReconfigurableProvider<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconfigurableProvider")
            .field("slot", &std::any::type_name::<S>())
            .field("scopes", &self.scope_count())
            .finish()
    }
}

/// Accumulates scope metadata and resolves it to a registered slot.
///
/// Setters are last-write-wins and only take effect on
/// [`build`](ReconfigurableBuilder::build); builders with equal name, version
/// and schema URL resolve to the same slot. `W` is what
/// [`build`](ReconfigurableBuilder::build) hands back, so the signal providers
/// can return their own wrapper types.
pub struct ReconfigurableBuilder<'a, S: Slot, W = Arc<S>> {
    provider: &'a ReconfigurableProvider<S>,
    key: ScopeKey,
    attributes: Vec<KeyValue>,
    _output: PhantomData<fn() -> W>,
}

impl<'a, S: Slot, W: From<Arc<S>>> ReconfigurableBuilder<'a, S, W> {
    /// Changes the type returned by [`build`](ReconfigurableBuilder::build).
    pub fn output<O: From<Arc<S>>>(self) -> ReconfigurableBuilder<'a, S, O> {
        ReconfigurableBuilder {
            provider: self.provider,
            key: self.key,
            attributes: self.attributes,
            _output: PhantomData,
        }
    }

    /// Sets the instrumentation version.
    pub fn with_version(mut self, version: impl Into<Cow<'static, str>>) -> Self {
        self.key = self.key.with_version(version);
        self
    }

    /// Sets the schema URL.
    pub fn with_schema_url(mut self, schema_url: impl Into<Cow<'static, str>>) -> Self {
        let schema_url = schema_url.into();
        if let Err(err) = url::Url::parse(&schema_url) {
            otel_warn!(
                name: "ReconfigurableBuilder.InvalidSchemaUrl",
                schema_url = format!("{schema_url}"),
                error = format!("{err}")
            );
        }
        self.key = self.key.with_schema_url(schema_url);
        self
    }

    /// Sets the scope attributes used when the slot is first created.
    pub fn with_attributes(mut self, attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        self.attributes = attributes.into_iter().collect();
        self
    }

    /// Returns the registered slot for the accumulated scope, creating it if
    /// needed.
    pub fn build(self) -> W {
        W::from(self.provider.resolve(self.key, self.attributes))
    }
}

impl<S: Slot, W> fmt::Debug for ReconfigurableBuilder<'_, S, W> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconfigurableBuilder")
            .field("key", &self.key)
            .finish()
    }
}
