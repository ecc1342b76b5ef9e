//! The `get`/`has` contract shared by the live and compiled containers
//!
//! Factories, proxy closures and lazy tag collections only ever see a
//! `ServiceLocator`, so they work the same way against either container.

use crate::value::{AnyValue, Injectable, downcast_value};
use crate::{DiError, Result};
use std::sync::{Arc, Weak};

/// Resolve-by-identifier contract.
pub trait ServiceLocator {
    /// Resolve the value registered under `id`
    fn get(&self, id: &str) -> Result<AnyValue>;

    /// Check whether `id` can be resolved
    fn has(&self, id: &str) -> bool;
}

impl dyn ServiceLocator + '_ {
    /// Resolve `id` and downcast it to `T`
    pub fn get_as<T: Injectable>(&self, id: &str) -> Result<Arc<T>> {
        downcast_value(self.get(id)?, id)
    }
}

/// Shared handle to a container that does not keep it alive
pub(crate) type WeakLocator = Weak<dyn ServiceLocator + Send + Sync>;

/// A service that produces another value when invoked with the container.
///
/// Register the implementing type through `ClassDescriptor::factory`; the
/// factory itself is autowired, then `create` is called and its result is
/// the service.
pub trait DiFactory: Send + Sync + 'static {
    /// Produce the service value
    fn create(&self, container: &dyn ServiceLocator) -> Result<AnyValue>;
}

/// Type-erased factory instance as produced by a factory class constructor
#[derive(Clone)]
pub struct FactoryObject(pub(crate) Arc<dyn DiFactory>);

impl FactoryObject {
    /// Invoke the factory
    #[inline]
    pub fn create(&self, container: &dyn ServiceLocator) -> Result<AnyValue> {
        self.0.create(container)
    }
}

impl std::fmt::Debug for FactoryObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FactoryObject(..)")
    }
}

/// A deferred lookup: resolves its target every time it is called.
///
/// Holds only a weak handle to its container, so storing a proxy inside a
/// singleton does not keep the container alive.
#[derive(Clone)]
pub struct ProxyClosure {
    locator: WeakLocator,
    id: String,
}

impl ProxyClosure {
    pub(crate) fn new(locator: WeakLocator, id: impl Into<String>) -> Self {
        Self {
            locator,
            id: id.into(),
        }
    }

    /// Identifier the proxy resolves
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Resolve the target now
    pub fn call(&self) -> Result<AnyValue> {
        let locator = self.locator.upgrade().ok_or(DiError::ContainerDropped)?;
        locator.get(&self.id)
    }

    /// Resolve the target now and downcast it
    pub fn call_as<T: Injectable>(&self) -> Result<Arc<T>> {
        downcast_value(self.call()?, &self.id)
    }
}

impl std::fmt::Debug for ProxyClosure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyClosure").field("id", &self.id).finish()
    }
}
