//! Explicit aggregate factories, keyed by kind.
//!
//! Every aggregate kind needs a way to produce its default state before
//! replay starts. An [`AggregateFactory`] is that capability, and an
//! [`AggregateRegistry`] is the table a host application fills once at
//! startup. Each factory is invoked when it is registered so a broken one
//! fails configuration instead of the first command that needs it.

use crate::aggregate::AggregateKind;
use crate::errors::InstantiationError;
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type FactoryFn<S> = dyn Fn() -> Result<S, String> + Send + Sync;

/// Produces the default state for aggregate kind `K`.
pub struct AggregateFactory<K: AggregateKind> {
    make: Arc<FactoryFn<K::State>>,
}

impl<K: AggregateKind> AggregateFactory<K> {
    /// Creates a factory from an infallible constructor.
    pub fn new<F>(make: F) -> Self
    where
        F: Fn() -> K::State + Send + Sync + 'static,
    {
        Self {
            make: Arc::new(move || Ok(make())),
        }
    }

    /// Creates a factory whose constructor may fail with a reason.
    pub fn fallible<F>(make: F) -> Self
    where
        F: Fn() -> Result<K::State, String> + Send + Sync + 'static,
    {
        Self {
            make: Arc::new(make),
        }
    }

    /// Creates a factory that uses the state's `Default` implementation.
    pub fn from_default() -> Self
    where
        K::State: Default,
    {
        Self::new(<K::State as Default>::default)
    }

    /// Produces a fresh default state.
    pub fn instantiate(&self) -> Result<K::State, InstantiationError> {
        (self.make)().map_err(|reason| InstantiationError::FactoryFailed {
            kind: K::KIND,
            reason,
        })
    }
}

impl<K: AggregateKind> Clone for AggregateFactory<K> {
    fn clone(&self) -> Self {
        Self {
            make: Arc::clone(&self.make),
        }
    }
}

impl<K: AggregateKind> fmt::Debug for AggregateFactory<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateFactory")
            .field("kind", &K::KIND)
            .finish_non_exhaustive()
    }
}

/// Kind-keyed table of aggregate factories.
///
/// # Example
///
/// ```rust,ignore
/// let registry = AggregateRegistry::new()
///     .with(AggregateFactory::<Order>::from_default())?
///     .with(AggregateFactory::<Invoice>::new(InvoiceState::draft))?;
///
/// let orders = AggregateRepository::<Order, _>::from_registry(store, &registry)?;
/// ```
#[derive(Default)]
pub struct AggregateRegistry {
    factories: HashMap<&'static str, Box<dyn Any + Send + Sync>>,
}

impl AggregateRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the factory for `K`.
    ///
    /// The factory is invoked once here; if it fails, nothing is registered.
    pub fn register<K: AggregateKind>(
        &mut self,
        factory: AggregateFactory<K>,
    ) -> Result<(), InstantiationError> {
        if self.factories.contains_key(K::KIND) {
            return Err(InstantiationError::DuplicateKind { kind: K::KIND });
        }
        factory.instantiate()?;
        self.factories.insert(K::KIND, Box::new(factory));
        debug!(kind = K::KIND, "registered aggregate factory");
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with<K: AggregateKind>(
        mut self,
        factory: AggregateFactory<K>,
    ) -> Result<Self, InstantiationError> {
        self.register(factory)?;
        Ok(self)
    }

    /// Returns the factory registered for `K`.
    pub fn factory<K: AggregateKind>(&self) -> Result<AggregateFactory<K>, InstantiationError> {
        self.factories
            .get(K::KIND)
            .and_then(|boxed| boxed.downcast_ref::<AggregateFactory<K>>())
            .cloned()
            .ok_or(InstantiationError::NotRegistered { kind: K::KIND })
    }

    /// True if a factory is registered under `kind`.
    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    /// Registered kind tags, sorted.
    pub fn kinds(&self) -> Vec<&'static str> {
        let mut kinds: Vec<_> = self.factories.keys().copied().collect();
        kinds.sort_unstable();
        kinds
    }
}

impl fmt::Debug for AggregateRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}
