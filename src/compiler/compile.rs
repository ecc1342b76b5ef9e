//! The compile pass
//!
//! Walks every registered definition once, reusing the parameter resolver
//! with a sink that emits expressions instead of values. Dependencies are
//! compiled on demand and memoized; reference chains are followed with one
//! resolver for the whole pass.

use super::ir::{CompiledEntry, CompiledGraph, Expr, Stmt};
use crate::container::ContainerInner;
use crate::definition::{BoundArguments, CallableTarget, Definition, DefinitionKind, TagQuery};
use crate::descriptor::{ClassDescriptor, MethodBody, ParamDescriptor};
use crate::instance::receiver_id;
use crate::locator::ProxyClosure;
use crate::reference::ReferenceResolver;
use crate::resolver::{ArgumentSink, resolve_arguments};
use crate::tags::{LazyTagged, TaggedValues, collect_members};
use crate::value::AnyValue;
use crate::{DiError, Result};
use ahash::{AHashMap, AHashSet};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// State of one compile pass
pub(crate) struct Compiler<'c> {
    container: &'c ContainerInner,
    references: ReferenceResolver,
    compiled: AHashMap<String, CompiledEntry>,
    order: Vec<String>,
    in_progress: AHashSet<String>,
    accessors: AHashSet<String>,
}

impl<'c> Compiler<'c> {
    pub(crate) fn new(container: &'c ContainerInner) -> Self {
        Self {
            container,
            references: ReferenceResolver::new(),
            compiled: AHashMap::new(),
            order: Vec::new(),
            in_progress: AHashSet::new(),
            accessors: AHashSet::new(),
        }
    }

    /// Compile every registered definition
    pub(crate) fn compile(mut self) -> Result<CompiledGraph> {
        let ids = self.container.store.ids();

        #[cfg(feature = "logging")]
        debug!(
            target: "definition_injector",
            definitions = ids.len(),
            "Compiling container"
        );

        for id in &ids {
            self.compile_id(id)?;
        }

        let mut compiled = self.compiled;
        let entries: Vec<CompiledEntry> = self
            .order
            .iter()
            .filter_map(|id| compiled.remove(id))
            .collect();

        #[cfg(feature = "logging")]
        debug!(
            target: "definition_injector",
            entries = entries.len(),
            "Compilation finished"
        );

        Ok(CompiledGraph::new(entries))
    }

    /// Compile `id` unless it is done or already on the way
    fn compile_id(&mut self, id: &str) -> Result<()> {
        if self.compiled.contains_key(id) || self.in_progress.contains(id) {
            return Ok(());
        }
        self.compile_entry(id).map_err(|e| e.in_compile(id))
    }

    fn compile_entry(&mut self, id: &str) -> Result<()> {
        let definition = self
            .container
            .definition_for(id)
            .ok_or_else(|| DiError::not_found(id))?;

        #[cfg(feature = "logging")]
        trace!(
            target: "definition_injector",
            service = id,
            kind = definition.kind().label(),
            "Compiling definition"
        );

        self.in_progress.insert(id.to_owned());

        let (slots, stmts, expr, return_type, singleton) = match definition.kind() {
            DefinitionKind::Reference(_) => {
                let target = self.references.deref(&self.container.store, id)?;
                self.compile_id(&target)?;
                // The target may still be compiling, so read its definition.
                let return_type = self
                    .container
                    .definition_for(&target)
                    .map(|target| return_type_of(&target))
                    .unwrap_or_default();
                (0, Vec::new(), Expr::Service(target), return_type, false)
            }
            _ => {
                let mut sink = DescribeSink {
                    compiler: self,
                    owner: Some(id),
                    stmts: Vec::new(),
                    slots: 0,
                };
                let expr = sink.describe(&definition)?;
                let (slots, stmts) = (sink.slots, sink.stmts);
                let singleton = definition.singleton_or(self.container.config.singleton_default);
                (slots, stmts, expr, return_type_of(&definition), singleton)
            }
        };

        self.in_progress.remove(id);
        let accessor = self.accessor_for(id);
        self.order.push(id.to_owned());
        self.compiled.insert(
            id.to_owned(),
            CompiledEntry {
                id: id.to_owned(),
                accessor,
                slots,
                stmts,
                expr,
                return_type,
                singleton,
            },
        );
        Ok(())
    }

    /// Unique `get_*` accessor name for `id`
    fn accessor_for(&mut self, id: &str) -> String {
        let mut base = String::with_capacity(id.len() + 4);
        base.push_str("get_");
        for ch in id.chars() {
            if ch.is_ascii_alphanumeric() {
                base.push(ch.to_ascii_lowercase());
            } else if !base.ends_with('_') {
                base.push('_');
            }
        }
        let base = base.trim_end_matches('_').to_owned();

        let mut accessor = base.clone();
        let mut suffix = 1;
        while !self.accessors.insert(accessor.clone()) {
            suffix += 1;
            accessor = format!("{base}_{suffix}");
        }
        accessor
    }
}

fn return_type_of(definition: &Definition) -> String {
    match definition.kind() {
        DefinitionKind::Value { type_name, .. } => type_name.clone(),
        DefinitionKind::Autowire(class) => class.name().to_owned(),
        DefinitionKind::Callable(CallableTarget::Function(function)) => {
            function.return_type().to_owned()
        }
        DefinitionKind::Callable(CallableTarget::Method { class, method, .. }) => class
            .method(method)
            .map(|m| m.return_type().to_owned())
            .unwrap_or_default(),
        DefinitionKind::Factory(_) => "dyn Any".to_owned(),
        DefinitionKind::Reference(_) => String::new(),
        DefinitionKind::Proxy(_) => std::any::type_name::<ProxyClosure>().to_owned(),
        DefinitionKind::Tagged(query) if query.lazy => {
            std::any::type_name::<LazyTagged>().to_owned()
        }
        DefinitionKind::Tagged(_) => std::any::type_name::<TaggedValues>().to_owned(),
    }
}

/// Resolves arguments into expressions for one entry.
///
/// Objects are constructed into local slots. The entry's own construction
/// becomes its statement list; inline definitions keep their statements in
/// a block at the argument that uses them.
struct DescribeSink<'s, 'c> {
    compiler: &'s mut Compiler<'c>,
    owner: Option<&'s str>,
    stmts: Vec<Stmt>,
    slots: usize,
}

impl DescribeSink<'_, '_> {
    fn describe(&mut self, definition: &Definition) -> Result<Expr> {
        match definition.kind() {
            DefinitionKind::Value { value, type_name } => Ok(Expr::Literal {
                value: value.clone(),
                type_name: type_name.clone(),
            }),
            DefinitionKind::Autowire(class) => self.construct(class, definition).map(Expr::Local),
            DefinitionKind::Factory(class) => {
                let slot = self.construct(class, definition)?;
                Ok(Expr::InvokeFactory(Box::new(Expr::Local(slot))))
            }
            DefinitionKind::Callable(target) => self.call(target, definition.arguments()),
            DefinitionKind::Reference(target) => self.service(target),
            DefinitionKind::Proxy(target) => self.proxy(target),
            DefinitionKind::Tagged(query) => self.tagged(query),
        }
    }

    fn arguments(
        &mut self,
        target: &str,
        params: &[ParamDescriptor],
        bound: &BoundArguments,
    ) -> Result<Vec<Expr>> {
        let use_attributes = self.compiler.container.config.use_attributes;
        resolve_arguments(self, target, params, bound, use_attributes)
    }

    /// Emit construction plus setup calls; returns the slot
    fn construct(&mut self, class: &ClassDescriptor, definition: &Definition) -> Result<usize> {
        let args = self.arguments(class.name(), class.params(), definition.arguments())?;
        let slot = self.slots;
        self.slots += 1;
        self.stmts.push(Stmt::Construct {
            slot,
            class: class.name().to_owned(),
            constructor: class.constructor().clone(),
            args,
        });

        for call in definition.setup_calls() {
            let method = class.require_method(&call.method)?;
            let target = format!("{}::{}", class.name(), method.name());
            if call.immutable && !method.body().returns_value() {
                return Err(DiError::invalid(
                    target,
                    "immutable setup call needs a method that returns the replacement instance",
                ));
            }
            let args = self.arguments(&target, method.params(), &call.arguments)?;
            self.stmts.push(Stmt::Setup {
                slot,
                target,
                immutable: call.immutable,
                body: method.body().clone(),
                args,
            });
        }
        Ok(slot)
    }

    fn call(&mut self, target: &CallableTarget, bound: &BoundArguments) -> Result<Expr> {
        match target {
            CallableTarget::Function(function) => {
                let args = self.arguments(function.name(), function.params(), bound)?;
                Ok(Expr::CallFunction {
                    name: function.name().to_owned(),
                    body: function.body().clone(),
                    args,
                })
            }
            CallableTarget::Method { class, method, .. } => {
                let descriptor = class.require_method(method)?;
                if !matches!(descriptor.body(), MethodBody::Wither(_)) {
                    return Err(DiError::invalid(
                        target.display_name(),
                        "a callable method must return a value",
                    ));
                }
                let receiver = self.service(receiver_id(target).unwrap_or(class.name()))?;
                let name = target.display_name();
                let args = self.arguments(&name, descriptor.params(), bound)?;
                Ok(Expr::CallMethod {
                    name,
                    receiver: Box::new(receiver),
                    body: descriptor.body().clone(),
                    args,
                })
            }
        }
    }
}

impl ArgumentSink for DescribeSink<'_, '_> {
    type Output = Expr;

    fn has(&self, id: &str) -> bool {
        self.compiler.container.has(id)
    }

    fn service(&mut self, id: &str) -> Result<Expr> {
        let target = self
            .compiler
            .references
            .deref(&self.compiler.container.store, id)?;
        self.compiler.compile_id(&target)?;
        Ok(Expr::Service(target))
    }

    fn literal(&mut self, value: &AnyValue) -> Result<Expr> {
        Ok(Expr::Literal {
            value: value.clone(),
            type_name: String::new(),
        })
    }

    fn tagged(&mut self, query: &TagQuery) -> Result<Expr> {
        let container = self.compiler.container;
        let members = collect_members(
            &container.store,
            query,
            self.owner,
            container.config.default_priority_method.as_deref(),
        )?;
        for member in &members {
            self.compiler.compile_id(&member.id)?;
        }
        Ok(Expr::Tagged {
            tag: query.tag.clone(),
            lazy: query.lazy,
            members: members
                .into_iter()
                .map(|member| (member.key, member.id))
                .collect(),
        })
    }

    fn proxy(&mut self, id: &str) -> Result<Expr> {
        if self.compiler.container.has(id) {
            self.compiler.compile_id(id)?;
        }
        Ok(Expr::Proxy(id.to_owned()))
    }

    fn callable(&mut self, target: &CallableTarget) -> Result<Expr> {
        // A callable argument is not the definition being compiled.
        let owner = self.owner.take();
        let expr = self.call(target, &BoundArguments::new());
        self.owner = owner;
        expr
    }

    fn inline(&mut self, definition: &Definition) -> Result<Expr> {
        let owner = self.owner.take();
        let start = self.stmts.len();
        let expr = self.describe(definition);
        self.owner = owner;

        let stmts = self.stmts.split_off(start);
        if stmts.is_empty() {
            return expr;
        }
        Ok(Expr::Block {
            stmts,
            value: Box::new(expr?),
        })
    }

    fn list(&mut self, items: Vec<Expr>) -> Result<Expr> {
        Ok(Expr::List(items))
    }

    fn parameter(
        &mut self,
        output: Expr,
        target: &str,
        parameter: &str,
        position: usize,
        fallback: Option<&AnyValue>,
    ) -> Expr {
        Expr::Argument {
            value: Box::new(output),
            target: target.to_owned(),
            parameter: parameter.to_owned(),
            position,
            default: fallback.cloned(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::Container;
    use crate::definition::{ArgumentSpec, TagSpec};

    struct Leaf;
    struct Branch;

    fn leaf() -> ClassDescriptor {
        ClassDescriptor::named::<Leaf, _>("Leaf", [], |_| Ok(Leaf))
    }

    fn branch(dep: &str) -> ClassDescriptor {
        ClassDescriptor::named::<Branch, _>("Branch", [ParamDescriptor::new("leaf").typed(dep)], |_| {
            Ok(Branch)
        })
    }

    #[test]
    fn test_dependencies_compiled_first_and_once() {
        let container = Container::new();
        container.register("branch.a", Definition::autowire(branch("leaf"))).unwrap();
        container.register("branch.b", Definition::autowire(branch("leaf"))).unwrap();
        container.register("leaf", Definition::autowire(leaf()).singleton()).unwrap();

        let graph = container.compile().unwrap();
        let ids: Vec<&str> = graph.entries().iter().map(CompiledEntry::id).collect();
        assert_eq!(ids, vec!["leaf", "branch.a", "branch.b"]);
        assert!(graph.get("leaf").unwrap().is_singleton());
        assert!(!graph.get("branch.a").unwrap().is_singleton());
    }

    #[test]
    fn test_reference_entry_points_at_final_target() {
        let container = Container::new();
        container.register("alias", Definition::reference("middle")).unwrap();
        container.register("middle", Definition::reference("real")).unwrap();
        container.register("real", Definition::value(1u8)).unwrap();

        let graph = container.compile().unwrap();
        let entry = graph.get("alias").unwrap();
        assert!(matches!(entry.expr(), Expr::Service(target) if target == "real"));
        assert_eq!(entry.return_type(), "u8");
    }

    #[test]
    fn test_reference_to_entry_still_compiling_keeps_type() {
        // `leaf` depends on `alias`, which points back at `leaf` while it compiles
        let leaf = ClassDescriptor::named::<Leaf, _>(
            "Leaf",
            [ParamDescriptor::new("me").attribute(crate::descriptor::ParamAttribute::ProxyClosure {
                id: Some("alias".into()),
            })],
            |_| Ok(Leaf),
        );

        let container = Container::new();
        container.register("leaf", Definition::autowire(leaf)).unwrap();
        container.register("alias", Definition::reference("leaf")).unwrap();
        container.register("holder", Definition::autowire(branch("alias"))).unwrap();

        let graph = container.compile().unwrap();
        assert_eq!(graph.get("alias").unwrap().return_type(), "Leaf");
    }

    #[test]
    fn test_default_kept_for_inferred_dependency() {
        let class = ClassDescriptor::named::<Branch, _>(
            "Branch",
            [
                ParamDescriptor::new("leaf").typed("leaf").default_value(0u8),
                ParamDescriptor::new("bound").default_value(1u8),
            ],
            |_| Ok(Branch),
        );

        let container = Container::new();
        container.register("leaf", Definition::autowire(leaf())).unwrap();
        container
            .register("branch", Definition::autowire(class).bind("bound", ArgumentSpec::reference("leaf")))
            .unwrap();

        let graph = container.compile().unwrap();
        let Stmt::Construct { args, .. } = &graph.get("branch").unwrap().stmts()[0] else {
            panic!("expected a construct statement");
        };
        match &args[0] {
            Expr::Argument {
                parameter,
                position,
                default,
                ..
            } => {
                assert_eq!(parameter, "leaf");
                assert_eq!(*position, 0);
                assert!(default.is_some());
            }
            _ => panic!("expected an argument wrapper"),
        }
        assert!(matches!(&args[1], Expr::Argument { default: None, .. }));
        assert!(matches!(args[1].unwrapped(), Expr::Service(id) if id == "leaf"));
    }

    #[test]
    fn test_reference_cycle_fails_compile() {
        let container = Container::new();
        container.register("a", Definition::reference("b")).unwrap();
        container.register("b", Definition::reference("c")).unwrap();
        container.register("c", Definition::reference("a")).unwrap();

        let err = container.compile().unwrap_err();
        assert!(matches!(err, DiError::Compile { ref id, .. } if id == "a"));
        assert_eq!(
            err.cycle().unwrap(),
            ["a".to_string(), "b".to_string(), "c".to_string(), "a".to_string()]
        );
    }

    #[test]
    fn test_cycle_reached_through_dependency() {
        let container = Container::new();
        container.register("root", Definition::autowire(branch("x"))).unwrap();
        container.register("x", Definition::reference("y")).unwrap();
        container.register("y", Definition::reference("x")).unwrap();

        let err = container.compile().unwrap_err();
        assert!(err.cycle().is_some());
    }

    #[test]
    fn test_missing_dependency_names_entry() {
        let container = Container::new();
        container.register("root", Definition::autowire(branch("missing"))).unwrap();

        let err = container.compile().unwrap_err();
        match err {
            DiError::Compile { id, source } => {
                assert_eq!(id, "root");
                assert!(matches!(*source, DiError::UnresolvableDependency { .. }));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_setup_statements_in_order() {
        #[derive(Clone)]
        struct Bag(Vec<String>);

        let class = ClassDescriptor::named::<Bag, _>("Bag", [], |_| Ok(Bag(Vec::new())))
            .mutator::<Bag, _>("add", [ParamDescriptor::new("item")], |bag, args| {
                bag.0.push(args.cloned::<String>(0)?);
                Ok(())
            })
            .wither::<Bag, Bag, _>("frozen", [], |bag, _| Ok(bag.clone()));

        let container = Container::new();
        container
            .register(
                "bag",
                Definition::autowire(class)
                    .setup("add", crate::args!["item" => ArgumentSpec::value("x".to_string())])
                    .setup_immutable("frozen", BoundArguments::new()),
            )
            .unwrap();

        let graph = container.compile().unwrap();
        let stmts = graph.get("bag").unwrap().stmts();
        assert_eq!(stmts.len(), 3);
        assert!(matches!(stmts[0], Stmt::Construct { slot: 0, .. }));
        assert!(matches!(&stmts[1], Stmt::Setup { target, immutable: false, .. } if target == "Bag::add"));
        assert!(matches!(&stmts[2], Stmt::Setup { immutable: true, .. }));
    }

    #[test]
    fn test_immutable_setup_on_mutator_is_invalid() {
        let class = ClassDescriptor::named::<Leaf, _>("Leaf", [], |_| Ok(Leaf))
            .mutator::<Leaf, _>("touch", [], |_, _| Ok(()));

        let container = Container::new();
        container
            .register(
                "leaf",
                Definition::autowire(class).setup_immutable("touch", BoundArguments::new()),
            )
            .unwrap();

        let err = container.compile().unwrap_err();
        assert!(matches!(err.root_cause(), DiError::InvalidDefinition { .. }));
    }

    #[test]
    fn test_tag_members_precompiled_in_order() {
        let container = Container::new();
        container
            .register("first", Definition::value(1u8).tag_with("t", TagSpec::priority(1)))
            .unwrap();
        container
            .register("second", Definition::value(2u8).tag_with("t", TagSpec::priority(9)))
            .unwrap();
        container
            .register("all", Definition::tagged(TagQuery::new("t").eager()))
            .unwrap();

        let graph = container.compile().unwrap();
        match graph.get("all").unwrap().expr() {
            Expr::Tagged { members, lazy, .. } => {
                assert!(!lazy);
                let ids: Vec<&str> = members.iter().map(|(_, id)| id.as_str()).collect();
                assert_eq!(ids, vec!["second", "first"]);
            }
            _ => panic!("expected a tag expression"),
        }
    }

    #[test]
    fn test_accessor_names_are_unique() {
        let container = Container::new();
        container.register("app.db", Definition::value(1u8)).unwrap();
        container.register("app_db", Definition::value(2u8)).unwrap();
        container.register("App::Db", Definition::value(3u8)).unwrap();

        let graph = container.compile().unwrap();
        let accessors: Vec<&str> = graph.entries().iter().map(CompiledEntry::accessor).collect();
        assert_eq!(accessors, vec!["get_app_db", "get_app_db_2", "get_app_db_3"]);
    }
}
