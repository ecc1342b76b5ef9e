//! Live dependency injection container
//!
//! The `Container` owns the definition store, the class registry and the
//! singleton cache. Every `get` runs with its own [`ResolutionContext`], so
//! concurrent callers never see each other's in-flight identifiers.

use crate::cache::SingletonCache;
use crate::compiler::{CompiledContainer, CompiledGraph, Compiler};
use crate::config::ContainerConfig;
use crate::context::ResolutionContext;
use crate::definition::Definition;
use crate::descriptor::{ClassDescriptor, ClassRegistry};
use crate::instance;
use crate::locator::{ServiceLocator, WeakLocator};
use crate::reference;
use crate::storage::DefinitionStore;
use crate::value::{AnyValue, Injectable, downcast_value};
use crate::{DiError, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Shared state behind a [`Container`] handle
pub(crate) struct ContainerInner {
    pub(crate) store: DefinitionStore,
    pub(crate) classes: ClassRegistry,
    pub(crate) singletons: SingletonCache,
    pub(crate) config: ContainerConfig,
    locked: AtomicBool,
    this: Weak<ContainerInner>,
}

impl ContainerInner {
    /// Weak handle for proxies and lazy collections
    #[inline]
    pub(crate) fn weak_locator(&self) -> WeakLocator {
        self.this.clone()
    }

    pub(crate) fn has(&self, id: &str) -> bool {
        self.store.contains(id) || (self.config.zero_config && self.classes.contains(id))
    }

    /// Definition for `id`: registered, or synthesized from a known class
    pub(crate) fn definition_for(&self, id: &str) -> Option<Arc<Definition>> {
        if let Some(definition) = self.store.get(id) {
            return Some(definition);
        }
        if !self.config.zero_config {
            return None;
        }
        let class = self.classes.get(id)?;

        #[cfg(feature = "logging")]
        debug!(
            target: "definition_injector",
            service = id,
            "Autowiring unregistered class (zero-config)"
        );

        let definition = if class.is_factory() {
            Definition::factory(class)
        } else {
            Definition::autowire(class)
        };
        Some(Arc::new(definition))
    }

    /// Top-level resolution with a fresh context
    pub(crate) fn resolve(&self, id: &str) -> Result<AnyValue> {
        let ctx = ResolutionContext::new();
        self.resolve_in(id, &ctx)
    }

    /// Resolve `id` as part of an ongoing call
    pub(crate) fn resolve_in(&self, id: &str, ctx: &ResolutionContext) -> Result<AnyValue> {
        let id = reference::deref(&self.store, id)?;

        if let Some(cached) = self.singletons.get(&id) {
            #[cfg(feature = "logging")]
            trace!(
                target: "definition_injector",
                service = id.as_str(),
                location = "singleton_cache",
                "Service resolved from singleton cache"
            );
            return Ok(cached);
        }

        let Some(definition) = self.definition_for(&id) else {
            #[cfg(feature = "logging")]
            debug!(
                target: "definition_injector",
                service = id.as_str(),
                "Service not found in container"
            );
            return Err(DiError::not_found(id));
        };

        // Entered before the singleton cell so a cycle fails fast instead of
        // re-entering the cell's initializer.
        let _guard = ctx.enter(&id)?;

        if definition.singleton_or(self.config.singleton_default) {
            self.singletons.get_or_try_init(&id, || {
                instance::build(self, &id, Some(&id), &definition, ctx)
            })
        } else {
            instance::build(self, &id, Some(&id), &definition, ctx)
        }
    }
}

impl ServiceLocator for ContainerInner {
    fn get(&self, id: &str) -> Result<AnyValue> {
        self.resolve(id)
    }

    fn has(&self, id: &str) -> bool {
        ContainerInner::has(self, id)
    }
}

/// Definition-driven dependency injection container.
///
/// Cloning is cheap: clones share definitions and singletons.
///
/// # Examples
///
/// ```rust
/// use definition_injector::{ArgumentSpec, ClassDescriptor, Container, Definition, ParamDescriptor};
/// use std::sync::Arc;
///
/// struct Database { dsn: String }
/// struct Repository { db: Arc<Database> }
///
/// let container = Container::new();
/// container
///     .register(
///         "db",
///         Definition::autowire(ClassDescriptor::of::<Database, _>(
///             [ParamDescriptor::new("dsn").builtin("String")],
///             |args| Ok(Database { dsn: args.cloned::<String>(0)? }),
///         ))
///         .singleton()
///         .bind("dsn", ArgumentSpec::value("sqlite::memory:".to_string())),
///     )
///     .unwrap();
/// container
///     .register(
///         "repo",
///         Definition::autowire(ClassDescriptor::of::<Repository, _>(
///             [ParamDescriptor::new("db").typed("db")],
///             |args| Ok(Repository { db: args.get::<Database>(0)? }),
///         )),
///     )
///     .unwrap();
///
/// let repo = container.get_as::<Repository>("repo").unwrap();
/// assert_eq!(repo.db.dsn, "sqlite::memory:");
/// ```
#[derive(Clone)]
pub struct Container {
    inner: Arc<ContainerInner>,
}

impl Container {
    /// Create an empty container with default settings
    #[inline]
    pub fn new() -> Self {
        Self::with_config(ContainerConfig::default())
    }

    /// Create an empty container
    pub fn with_config(config: ContainerConfig) -> Self {
        #[cfg(feature = "logging")]
        debug!(
            target: "definition_injector",
            singleton_default = config.singleton_default,
            zero_config = config.zero_config,
            use_attributes = config.use_attributes,
            "Creating definition container"
        );

        Self::from_parts(DefinitionStore::new(), config)
    }

    /// Create a container sized for about `capacity` definitions
    pub fn with_capacity(capacity: usize, config: ContainerConfig) -> Self {
        Self::from_parts(DefinitionStore::with_capacity(capacity), config)
    }

    fn from_parts(store: DefinitionStore, config: ContainerConfig) -> Self {
        let inner = Arc::new_cyclic(|this| ContainerInner {
            store,
            classes: ClassRegistry::new(),
            singletons: SingletonCache::new(),
            config,
            locked: AtomicBool::new(false),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Start a [`ContainerBuilder`]
    #[inline]
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    // =========================================================================
    // Registration Methods
    // =========================================================================

    /// Register `definition` under `id`.
    ///
    /// Identifiers are unique: registering one twice fails with
    /// `AlreadyRegistered`, and nothing can be registered once the
    /// container is locked.
    pub fn register(&self, id: impl AsRef<str>, definition: Definition) -> Result<()> {
        self.check_not_locked()?;
        let id = id.as_ref();

        #[cfg(feature = "logging")]
        debug!(
            target: "definition_injector",
            service = id,
            kind = definition.kind().label(),
            singleton = ?definition.is_singleton(),
            tags = definition.tags().len(),
            service_count = self.inner.store.len() + 1,
            "Registering definition"
        );

        self.inner.store.insert(id, definition)
    }

    /// Register many definitions, stopping at the first failure
    pub fn register_many<I, S>(&self, definitions: I) -> Result<()>
    where
        I: IntoIterator<Item = (S, Definition)>,
        S: AsRef<str>,
    {
        self.check_not_locked()?;

        #[cfg(feature = "logging")]
        let start_count = self.inner.store.len();

        for (id, definition) in definitions {
            self.register(id, definition)?;
        }

        #[cfg(feature = "logging")]
        debug!(
            target: "definition_injector",
            services_registered = self.inner.store.len() - start_count,
            "Batch registration completed"
        );

        Ok(())
    }

    /// Make a class known for zero-config autowiring (and lookups by name)
    pub fn register_class(&self, class: ClassDescriptor) -> Result<Arc<ClassDescriptor>> {
        self.check_not_locked()?;
        Ok(self.inner.classes.insert(class))
    }

    // =========================================================================
    // Resolution Methods
    // =========================================================================

    /// Resolve the value for `id`
    #[inline]
    pub fn get(&self, id: &str) -> Result<AnyValue> {
        self.inner.resolve(id)
    }

    /// Resolve and downcast the value for `id`
    #[inline]
    pub fn get_as<T: Injectable>(&self, id: &str) -> Result<Arc<T>> {
        downcast_value(self.get(id)?, id)
    }

    /// Resolve, returning `None` on any failure
    #[inline]
    pub fn try_get_as<T: Injectable>(&self, id: &str) -> Option<Arc<T>> {
        self.get_as::<T>(id).ok()
    }

    /// Check whether `id` can be resolved
    #[inline]
    pub fn has(&self, id: &str) -> bool {
        self.inner.has(id)
    }

    // =========================================================================
    // Query Methods
    // =========================================================================

    /// Registered definition for `id`
    #[inline]
    pub fn definition(&self, id: &str) -> Option<Arc<Definition>> {
        self.inner.store.get(id)
    }

    /// Registered identifiers, in registration order
    pub fn ids(&self) -> Vec<String> {
        self.inner.store.ids()
    }

    /// Number of registered definitions
    #[inline]
    pub fn len(&self) -> usize {
        self.inner.store.len()
    }

    /// Check if nothing is registered
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.inner.store.is_empty()
    }

    /// Number of singletons built so far
    #[inline]
    pub fn built_singletons(&self) -> usize {
        self.inner.singletons.len()
    }

    /// Container settings
    #[inline]
    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    // =========================================================================
    // Lifecycle Methods
    // =========================================================================

    /// Lock the container to prevent further registrations.
    #[inline]
    pub fn lock(&self) {
        self.inner.locked.store(true, Ordering::Release);

        #[cfg(feature = "logging")]
        debug!(
            target: "definition_injector",
            service_count = self.inner.store.len(),
            "Container locked - no further registrations allowed"
        );
    }

    /// Check if the container is locked.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.inner.locked.load(Ordering::Acquire)
    }

    #[inline]
    fn check_not_locked(&self) -> Result<()> {
        if self.inner.locked.load(Ordering::Relaxed) {
            return Err(DiError::Locked);
        }
        Ok(())
    }

    // =========================================================================
    // Compilation
    // =========================================================================

    /// Compile every registered definition into a [`CompiledGraph`].
    ///
    /// Any failure aborts the whole pass.
    pub fn compile(&self) -> Result<CompiledGraph> {
        Compiler::new(&self.inner).compile()
    }

    /// Compile and wrap the result in a ready-to-use [`CompiledContainer`]
    pub fn compile_container(&self) -> Result<CompiledContainer> {
        self.compile().map(CompiledContainer::new)
    }
}

impl ServiceLocator for Container {
    fn get(&self, id: &str) -> Result<AnyValue> {
        self.inner.resolve(id)
    }

    fn has(&self, id: &str) -> bool {
        self.inner.has(id)
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Container")
            .field("service_count", &self.len())
            .field("class_count", &self.inner.classes.len())
            .field("built_singletons", &self.built_singletons())
            .field("locked", &self.is_locked())
            .finish()
    }
}

/// Collects configuration, classes and definitions, then builds a container.
///
/// Registration errors (duplicates, empty identifiers) surface from
/// [`build`](ContainerBuilder::build).
///
/// # Examples
///
/// ```rust
/// use definition_injector::{Container, ContainerConfig, Definition};
///
/// let container = Container::builder()
///     .config(ContainerConfig::default().with_singleton_default(true))
///     .add("greeting", Definition::value("hello".to_string()))
///     .add("alias", Definition::reference("greeting"))
///     .build()
///     .unwrap();
///
/// assert_eq!(*container.get_as::<String>("alias").unwrap(), "hello");
/// ```
#[derive(Default)]
pub struct ContainerBuilder {
    config: ContainerConfig,
    classes: Vec<ClassDescriptor>,
    definitions: Vec<(String, Definition)>,
}

impl ContainerBuilder {
    /// Empty builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the settings
    pub fn config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// Add a class for zero-config autowiring
    pub fn class(mut self, class: ClassDescriptor) -> Self {
        self.classes.push(class);
        self
    }

    /// Add a definition
    pub fn add(mut self, id: impl Into<String>, definition: Definition) -> Self {
        self.definitions.push((id.into(), definition));
        self
    }

    /// Add several definitions
    pub fn add_many<I, S>(mut self, definitions: I) -> Self
    where
        I: IntoIterator<Item = (S, Definition)>,
        S: Into<String>,
    {
        self.definitions
            .extend(definitions.into_iter().map(|(id, definition)| (id.into(), definition)));
        self
    }

    /// Build the container
    pub fn build(self) -> Result<Container> {
        let container =
            Container::with_capacity(self.definitions.len(), self.config);
        for class in self.classes {
            container.register_class(class)?;
        }
        container.register_many(self.definitions)?;
        Ok(container)
    }
}

impl std::fmt::Debug for ContainerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContainerBuilder")
            .field("config", &self.config)
            .field("classes", &self.classes.len())
            .field("definitions", &self.definitions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ArgumentSpec, TagQuery, TagSpec};
    use crate::descriptor::ParamDescriptor;
    use crate::locator::{DiFactory, ProxyClosure};
    use crate::tags::{LazyTagged, TaggedValues};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[derive(Debug)]
    struct TestService {
        value: String,
    }

    fn service_class() -> ClassDescriptor {
        ClassDescriptor::of::<TestService, _>(
            [ParamDescriptor::new("value").builtin("String")],
            |args| {
                Ok(TestService {
                    value: args.cloned::<String>(0)?,
                })
            },
        )
    }

    #[test]
    fn test_singleton() {
        let container = Container::new();
        container
            .register(
                "svc",
                Definition::autowire(service_class())
                    .singleton()
                    .bind("value", ArgumentSpec::value("test".to_string())),
            )
            .unwrap();

        let a = container.get_as::<TestService>("svc").unwrap();
        let b = container.get_as::<TestService>("svc").unwrap();
        assert_eq!(a.value, "test");
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(container.built_singletons(), 1);
    }

    #[test]
    fn test_transient() {
        static COUNTER: AtomicU32 = AtomicU32::new(0);

        struct Counter(u32);

        let class = ClassDescriptor::of::<Counter, _>([], |_| {
            Ok(Counter(COUNTER.fetch_add(1, Ordering::SeqCst)))
        });
        let container = Container::new();
        container.register("counter", Definition::autowire(class)).unwrap();

        let a = container.get_as::<Counter>("counter").unwrap();
        let b = container.get_as::<Counter>("counter").unwrap();
        assert_ne!(a.0, b.0);
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_singleton_default_from_config() {
        let container = Container::with_config(ContainerConfig::default().with_singleton_default(true));
        container
            .register(
                "svc",
                Definition::autowire(service_class()).bind("value", ArgumentSpec::value("x".to_string())),
            )
            .unwrap();

        let a = container.get_as::<TestService>("svc").unwrap();
        let b = container.get_as::<TestService>("svc").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn test_not_found() {
        let container = Container::new();
        let result = container.get("missing");
        assert!(matches!(result, Err(DiError::NotFound { id }) if id == "missing"));
        assert!(!container.has("missing"));
    }

    #[test]
    fn test_register_twice() {
        let container = Container::new();
        container.register("a", Definition::value(1u8)).unwrap();
        assert!(matches!(
            container.register("a", Definition::value(2u8)),
            Err(DiError::AlreadyRegistered { .. })
        ));
        assert_eq!(*container.get_as::<u8>("a").unwrap(), 1);
    }

    #[test]
    fn test_lock() {
        let container = Container::new();
        assert!(!container.is_locked());

        container.lock();
        assert!(container.is_locked());
    }

    #[test]
    fn test_register_after_lock() {
        let container = Container::new();
        container.lock();
        assert!(matches!(
            container.register("a", Definition::value(1u8)),
            Err(DiError::Locked)
        ));
    }

    #[test]
    fn test_zero_config_autowire() {
        struct Clock;
        struct Scheduler {
            _clock: Arc<Clock>,
        }

        let container = Container::new();
        container
            .register_class(ClassDescriptor::of::<Clock, _>([], |_| Ok(Clock)))
            .unwrap();
        container
            .register_class(ClassDescriptor::of::<Scheduler, _>(
                [ParamDescriptor::new("clock").typed_as::<Clock>()],
                |args| {
                    Ok(Scheduler {
                        _clock: args.get::<Clock>(0)?,
                    })
                },
            ))
            .unwrap();

        let id = std::any::type_name::<Scheduler>();
        assert!(container.has(id));
        assert!(container.get_as::<Scheduler>(id).is_ok());

        let strict = Container::with_config(ContainerConfig::default().with_zero_config(false));
        strict
            .register_class(ClassDescriptor::of::<Clock, _>([], |_| Ok(Clock)))
            .unwrap();
        assert!(!strict.has(std::any::type_name::<Clock>()));
    }

    #[test]
    fn test_construction_cycle() {
        struct Node;

        let node = |dep: &str| {
            Definition::autowire(ClassDescriptor::named::<Node, _>(
                "Node",
                [ParamDescriptor::new("next").typed(dep)],
                |_| Ok(Node),
            ))
        };

        let container = Container::new();
        container.register("a", node("b")).unwrap();
        container.register("b", node("a")).unwrap();

        let err = container.get("a").unwrap_err();
        match err {
            DiError::CircularConstruction { chain } => assert_eq!(chain, vec!["a", "b", "a"]),
            other => panic!("unexpected error: {other}"),
        }

        // The guard is released: an unrelated lookup still works.
        container.register("c", Definition::value(1u8)).unwrap();
        assert!(container.get("c").is_ok());
    }

    #[test]
    fn test_singleton_self_cycle_does_not_deadlock() {
        struct Loop;

        let container = Container::new();
        container
            .register(
                "loop",
                Definition::autowire(ClassDescriptor::named::<Loop, _>(
                    "Loop",
                    [ParamDescriptor::new("me").typed("loop")],
                    |_| Ok(Loop),
                ))
                .singleton(),
            )
            .unwrap();

        let err = container.get("loop").unwrap_err();
        assert_eq!(err.cycle().unwrap(), ["loop".to_string(), "loop".to_string()]);
    }

    #[test]
    fn test_factory_receives_container() {
        struct Greeter;
        impl DiFactory for Greeter {
            fn create(&self, container: &dyn ServiceLocator) -> Result<AnyValue> {
                let name = container.get_as::<String>("name")?;
                Ok(Arc::new(format!("hello {name}")))
            }
        }

        let container = Container::new();
        container.register("name", Definition::value("world".to_string())).unwrap();
        container
            .register(
                "greeting",
                Definition::factory(ClassDescriptor::factory::<Greeter, _>("Greeter", [], |_| Ok(Greeter))),
            )
            .unwrap();

        assert_eq!(*container.get_as::<String>("greeting").unwrap(), "hello world");
    }

    #[test]
    fn test_factory_cycle_is_detected() {
        struct Recursive;
        impl DiFactory for Recursive {
            fn create(&self, container: &dyn ServiceLocator) -> Result<AnyValue> {
                container.get("made")
            }
        }

        let container = Container::new();
        container
            .register(
                "made",
                Definition::factory(ClassDescriptor::factory::<Recursive, _>("Recursive", [], |_| Ok(Recursive))),
            )
            .unwrap();

        let err = container.get("made").unwrap_err();
        assert!(matches!(err, DiError::CircularConstruction { .. }));
    }

    #[test]
    fn test_proxy_and_tags() {
        let container = Container::new();
        container
            .register("a", Definition::value(1u32).tag_with("nums", TagSpec::priority(1)))
            .unwrap();
        container
            .register("b", Definition::value(2u32).tag_with("nums", TagSpec::priority(2)))
            .unwrap();
        container.register("proxy.a", Definition::proxy("a")).unwrap();
        container
            .register("eager", Definition::tagged(TagQuery::new("nums").eager()))
            .unwrap();
        container
            .register("lazy", Definition::tagged(TagQuery::new("nums")))
            .unwrap();

        let proxy = container.get_as::<ProxyClosure>("proxy.a").unwrap();
        assert_eq!(*proxy.call_as::<u32>().unwrap(), 1);

        let eager = container.get_as::<TaggedValues>("eager").unwrap();
        assert_eq!(eager.keys().collect::<Vec<_>>(), vec!["b", "a"]);

        let lazy = container.get_as::<LazyTagged>("lazy").unwrap();
        let values: Vec<u32> = lazy
            .iter()
            .map(|item| *item.unwrap().1.downcast_ref::<u32>().unwrap())
            .collect();
        assert_eq!(values, vec![2, 1]);
    }

    #[test]
    fn test_proxy_does_not_keep_container_alive() {
        let container = Container::new();
        container.register("a", Definition::value(1u32)).unwrap();
        container.register("p", Definition::proxy("a")).unwrap();

        let proxy = container.get_as::<ProxyClosure>("p").unwrap();
        drop(container);
        assert!(matches!(proxy.call(), Err(DiError::ContainerDropped)));
    }

    #[test]
    fn test_builder() {
        let container = Container::builder()
            .class(service_class())
            .add("x", Definition::value(1u8))
            .add_many([("y", Definition::value(2u8)), ("z", Definition::reference("y"))])
            .build()
            .unwrap();

        assert_eq!(container.ids(), vec!["x", "y", "z"]);
        assert_eq!(*container.get_as::<u8>("z").unwrap(), 2);

        let duplicate = Container::builder()
            .add("x", Definition::value(1u8))
            .add("x", Definition::value(2u8))
            .build();
        assert!(duplicate.is_err());
    }

    #[test]
    fn test_concurrent_singleton_builds_once() {
        static BUILDS: AtomicU32 = AtomicU32::new(0);

        struct Shared;

        let container = Container::new();
        container
            .register(
                "shared",
                Definition::autowire(ClassDescriptor::of::<Shared, _>([], |_| {
                    BUILDS.fetch_add(1, Ordering::SeqCst);
                    std::thread::sleep(std::time::Duration::from_millis(5));
                    Ok(Shared)
                }))
                .singleton(),
            )
            .unwrap();

        std::thread::scope(|scope| {
            for _ in 0..8 {
                let container = container.clone();
                scope.spawn(move || {
                    container.get("shared").unwrap();
                });
            }
        });

        assert_eq!(BUILDS.load(Ordering::SeqCst), 1);
    }
}
