//! The generated lookup
//!
//! `CompiledContainer` serves values straight from a [`CompiledGraph`]: no
//! definition store, no descriptors, no parameter resolution. Singleton
//! entries are built once per container, transient entries on every access.
//! Construction cycles are still caught by a per-call guard, and by the
//! waits-for check when two threads build the two ends of a cycle.

use super::ir::{CompiledEntry, CompiledGraph, Expr, Stmt};
use crate::cache::BuildTracker;
use crate::context::ResolutionContext;
use crate::descriptor::MethodBody;
use crate::instance::apply_setup;
use crate::locator::{FactoryObject, ProxyClosure, ServiceLocator, WeakLocator};
use crate::tags::{LazyTagged, TaggedValues};
use crate::value::{AnyValue, Arguments, Injectable, Instance, downcast_value};
use crate::{DiError, Result};
use once_cell::sync::OnceCell;
use std::sync::{Arc, Weak};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

struct CompiledInner {
    graph: CompiledGraph,
    cells: Vec<OnceCell<AnyValue>>,
    builds: BuildTracker,
    this: Weak<CompiledInner>,
}

/// Locator handed to factories from compiled entries
struct CompiledScope<'c> {
    inner: &'c CompiledInner,
    ctx: &'c ResolutionContext,
}

impl ServiceLocator for CompiledScope<'_> {
    fn get(&self, id: &str) -> Result<AnyValue> {
        self.inner.resolve_in(id, self.ctx)
    }

    fn has(&self, id: &str) -> bool {
        self.inner.graph.contains(id)
    }
}

impl CompiledInner {
    fn weak_locator(&self) -> WeakLocator {
        self.this.clone()
    }

    fn resolve_in(&self, id: &str, ctx: &ResolutionContext) -> Result<AnyValue> {
        let position = self
            .graph
            .position(id)
            .ok_or_else(|| DiError::not_found(id))?;
        let entry = &self.graph.entries()[position];
        let cell = &self.cells[position];

        if let Some(value) = cell.get() {
            #[cfg(feature = "logging")]
            trace!(
                target: "definition_injector",
                service = id,
                accessor = entry.accessor(),
                "Compiled singleton already built"
            );
            return Ok(Arc::clone(value));
        }

        let _guard = ctx.enter(id)?;

        if entry.is_singleton() {
            self.builds.init(cell, id, || self.run(entry, ctx))
        } else {
            self.run(entry, ctx)
        }
    }

    /// Execute an entry's statements, then its expression
    fn run(&self, entry: &CompiledEntry, ctx: &ResolutionContext) -> Result<AnyValue> {
        #[cfg(feature = "logging")]
        trace!(
            target: "definition_injector",
            service = entry.id(),
            accessor = entry.accessor(),
            "Running compiled accessor"
        );

        let mut slots: Vec<Option<Instance>> = Vec::with_capacity(entry.slots);
        slots.resize_with(entry.slots, || None);

        for stmt in entry.stmts() {
            self.exec(stmt, &mut slots, ctx)?;
        }
        self.eval(entry.expr(), &mut slots, ctx)
    }

    fn exec(&self, stmt: &Stmt, slots: &mut [Option<Instance>], ctx: &ResolutionContext) -> Result<()> {
        match stmt {
            Stmt::Construct {
                slot,
                class,
                constructor,
                args,
            } => {
                let args = self.eval_args(class, args, slots, ctx)?;
                let instance = constructor.invoke(args)?;
                *slot_mut(slots, *slot, class)? = Some(instance);
            }
            Stmt::Setup {
                slot,
                target,
                immutable,
                body,
                args,
            } => {
                let args = self.eval_args(target, args, slots, ctx)?;
                let instance = take_slot(slots, *slot, target)?;
                let instance = apply_setup(instance, *immutable, body, target, args)?;
                *slot_mut(slots, *slot, target)? = Some(instance);
            }
        }
        Ok(())
    }

    fn eval_args(
        &self,
        target: &str,
        args: &[Expr],
        slots: &mut [Option<Instance>],
        ctx: &ResolutionContext,
    ) -> Result<Arguments> {
        let values = args
            .iter()
            .map(|arg| self.eval(arg, slots, ctx))
            .collect::<Result<Vec<_>>>()?;
        Ok(Arguments::new(target, values))
    }

    fn eval(
        &self,
        expr: &Expr,
        slots: &mut [Option<Instance>],
        ctx: &ResolutionContext,
    ) -> Result<AnyValue> {
        match expr {
            Expr::Literal { value, .. } => Ok(Arc::clone(value)),
            Expr::Service(id) => self.resolve_in(id, ctx),
            Expr::Local(slot) => take_slot(slots, *slot, "local").map(Arc::from),
            Expr::CallFunction { name, body, args } => {
                let args = self.eval_args(name, args, slots, ctx)?;
                body.invoke(args)
            }
            Expr::CallMethod {
                name,
                receiver,
                body,
                args,
            } => {
                let receiver = self.eval(receiver, slots, ctx)?;
                let args = self.eval_args(name, args, slots, ctx)?;
                match body {
                    MethodBody::Wither(f) => f(receiver.as_ref(), args).map(Arc::from),
                    MethodBody::Mutator(_) => Err(DiError::invalid(
                        name.as_str(),
                        "a callable method must return a value",
                    )),
                }
            }
            Expr::InvokeFactory(object) => {
                let object = self.eval(object, slots, ctx)?;
                let factory = object
                    .downcast_ref::<FactoryObject>()
                    .ok_or_else(|| DiError::type_mismatch::<FactoryObject>("compiled factory"))?;
                factory.create(&CompiledScope { inner: self, ctx })
            }
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item, slots, ctx))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(values))
            }
            Expr::Tagged { tag, lazy, members } => {
                if *lazy {
                    return Ok(Arc::new(LazyTagged::new(
                        self.weak_locator(),
                        tag.as_str(),
                        members.clone(),
                    )));
                }
                let entries = members
                    .iter()
                    .map(|(key, id)| self.resolve_in(id, ctx).map(|value| (key.clone(), value)))
                    .collect::<Result<Vec<_>>>()?;
                Ok(Arc::new(TaggedValues::new(entries)))
            }
            Expr::Proxy(id) => Ok(Arc::new(ProxyClosure::new(self.weak_locator(), id.as_str()))),
            Expr::Block { stmts, value } => {
                for stmt in stmts {
                    self.exec(stmt, slots, ctx)?;
                }
                self.eval(value, slots, ctx)
            }
            Expr::Argument {
                value,
                target,
                parameter,
                position,
                default,
            } => match self.eval(value, slots, ctx) {
                Ok(value) => Ok(value),
                Err(err) => match default {
                    Some(default) if err.is_recoverable() => {
                        #[cfg(feature = "logging")]
                        debug!(
                            target: "definition_injector",
                            owner = target.as_str(),
                            parameter = parameter.as_str(),
                            error = %err,
                            "Dependency failed, using parameter default"
                        );
                        Ok(Arc::clone(default))
                    }
                    _ => Err(err.in_parameter(target, parameter, *position)),
                },
            },
        }
    }
}

fn slot_mut<'s>(
    slots: &'s mut [Option<Instance>],
    slot: usize,
    target: &str,
) -> Result<&'s mut Option<Instance>> {
    slots
        .get_mut(slot)
        .ok_or_else(|| DiError::creation_failed(target, format!("local slot {slot} does not exist")))
}

fn take_slot(slots: &mut [Option<Instance>], slot: usize, target: &str) -> Result<Instance> {
    slots
        .get_mut(slot)
        .and_then(Option::take)
        .ok_or_else(|| DiError::creation_failed(target, format!("local slot {slot} is empty")))
}

impl ServiceLocator for CompiledInner {
    fn get(&self, id: &str) -> Result<AnyValue> {
        self.resolve_in(id, &ResolutionContext::new())
    }

    fn has(&self, id: &str) -> bool {
        self.graph.contains(id)
    }
}

/// Reflection-free container serving a [`CompiledGraph`].
///
/// # Examples
///
/// ```rust
/// use definition_injector::{Container, Definition};
///
/// let container = Container::new();
/// container.register("port", Definition::value(8080u16)).unwrap();
/// container.register("http.port", Definition::reference("port")).unwrap();
///
/// let compiled = container.compile_container().unwrap();
/// assert_eq!(*compiled.get_as::<u16>("http.port").unwrap(), 8080);
/// ```
#[derive(Clone)]
pub struct CompiledContainer {
    inner: Arc<CompiledInner>,
}

impl CompiledContainer {
    /// Serve `graph`
    pub fn new(graph: CompiledGraph) -> Self {
        #[cfg(feature = "logging")]
        debug!(
            target: "definition_injector",
            entries = graph.len(),
            singletons = graph.entries().iter().filter(|entry| entry.is_singleton()).count(),
            "Creating compiled container"
        );

        let cells = (0..graph.len()).map(|_| OnceCell::new()).collect();
        let inner = Arc::new_cyclic(|this| CompiledInner {
            graph,
            cells,
            builds: BuildTracker::default(),
            this: this.clone(),
        });
        Self { inner }
    }

    /// Resolve the value for `id`
    #[inline]
    pub fn get(&self, id: &str) -> Result<AnyValue> {
        self.inner.resolve_in(id, &ResolutionContext::new())
    }

    /// Resolve and downcast the value for `id`
    #[inline]
    pub fn get_as<T: Injectable>(&self, id: &str) -> Result<Arc<T>> {
        downcast_value(self.get(id)?, id)
    }

    /// Check whether `id` was compiled
    #[inline]
    pub fn has(&self, id: &str) -> bool {
        self.inner.graph.contains(id)
    }

    /// The graph being served
    #[inline]
    pub fn graph(&self) -> &CompiledGraph {
        &self.inner.graph
    }
}

impl ServiceLocator for CompiledContainer {
    fn get(&self, id: &str) -> Result<AnyValue> {
        CompiledContainer::get(self, id)
    }

    fn has(&self, id: &str) -> bool {
        CompiledContainer::has(self, id)
    }
}

impl std::fmt::Debug for CompiledContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledContainer")
            .field("entries", &self.inner.graph.len())
            .field(
                "built_singletons",
                &self.inner.cells.iter().filter(|cell| cell.get().is_some()).count(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::definition::{ArgumentSpec, Definition};
    use crate::descriptor::{ClassDescriptor, ParamDescriptor};
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_singleton_and_transient_semantics() {
        static BUILDS: AtomicU32 = AtomicU32::new(0);

        struct Service;

        let class = || {
            ClassDescriptor::named::<Service, _>("Service", [], |_| {
                BUILDS.fetch_add(1, Ordering::SeqCst);
                Ok(Service)
            })
        };

        let container = Container::new();
        container.register("one", Definition::autowire(class()).singleton()).unwrap();
        container.register("many", Definition::autowire(class())).unwrap();

        let compiled = container.compile_container().unwrap();
        let a = compiled.get_as::<Service>("one").unwrap();
        let b = compiled.get_as::<Service>("one").unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        let c = compiled.get_as::<Service>("many").unwrap();
        let d = compiled.get_as::<Service>("many").unwrap();
        assert!(!Arc::ptr_eq(&c, &d));
        assert_eq!(BUILDS.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_runtime_construction_cycle() {
        struct Node;

        let node = |dep: &str| {
            Definition::autowire(ClassDescriptor::named::<Node, _>(
                "Node",
                [ParamDescriptor::new("next").typed(dep)],
                |_| Ok(Node),
            ))
            .singleton()
        };

        let container = Container::new();
        container.register("a", node("b")).unwrap();
        container.register("b", node("a")).unwrap();

        let compiled = container.compile_container().unwrap();
        let err = compiled.get("a").unwrap_err();
        match err {
            DiError::CircularConstruction { chain } => assert_eq!(chain, vec!["a", "b", "a"]),
            other => panic!("unexpected error: {other}"),
        }
        assert!(compiled.get("b").is_err());
    }

    #[test]
    fn test_inline_definitions_build_in_place() {
        struct Inner(u32);
        struct Outer(Arc<Inner>);

        let inner = ClassDescriptor::named::<Inner, _>("Inner", [ParamDescriptor::new("n")], |args| {
            Ok(Inner(*args.get::<u32>(0)?))
        });
        let outer = ClassDescriptor::named::<Outer, _>("Outer", [ParamDescriptor::new("inner")], |args| {
            Ok(Outer(args.get::<Inner>(0)?))
        });

        let container = Container::new();
        container
            .register(
                "outer",
                Definition::autowire(outer).bind(
                    "inner",
                    ArgumentSpec::inline(
                        Definition::autowire(inner).bind("n", ArgumentSpec::value(7u32)),
                    ),
                ),
            )
            .unwrap();

        let compiled = container.compile_container().unwrap();
        let entry = compiled.graph().get("outer").unwrap();
        assert_eq!(entry.stmts().len(), 1);
        let Stmt::Construct { args, .. } = &entry.stmts()[0] else {
            panic!("expected a construct statement");
        };
        assert!(matches!(args[0].unwrapped(), Expr::Block { stmts, .. } if stmts.len() == 1));
        assert_eq!(compiled.get_as::<Outer>("outer").unwrap().0.0, 7);
    }

    #[test]
    fn test_unknown_id() {
        let compiled = Container::new().compile_container().unwrap();
        assert!(matches!(compiled.get("nope"), Err(DiError::NotFound { .. })));
        assert!(!compiled.has("nope"));
    }
}
