//! Instance building
//!
//! Turns one definition into a value: resolves constructor and callable
//! arguments through the live [`ArgumentSink`], runs setup calls strictly in
//! declaration order, and hands factories a locator bound to the current
//! call so cycles through factories are still caught.

use crate::container::ContainerInner;
use crate::context::ResolutionContext;
use crate::definition::{BoundArguments, CallableTarget, Definition, DefinitionKind, TagQuery};
use crate::descriptor::{ClassDescriptor, MethodBody, ParamDescriptor};
use crate::locator::{FactoryObject, ProxyClosure, ServiceLocator};
use crate::resolver::{ArgumentSink, resolve_arguments};
use crate::tags::{LazyTagged, TaggedValues, collect_members};
use crate::value::{AnyValue, Arguments, Instance};
use crate::{DiError, Result};
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::trace;

/// Resolves arguments into live values
pub(crate) struct LiveSink<'c> {
    container: &'c ContainerInner,
    ctx: &'c ResolutionContext,
    owner: Option<&'c str>,
}

impl<'c> LiveSink<'c> {
    pub(crate) fn new(
        container: &'c ContainerInner,
        ctx: &'c ResolutionContext,
        owner: Option<&'c str>,
    ) -> Self {
        Self {
            container,
            ctx,
            owner,
        }
    }

    fn resolve(
        &mut self,
        target: &str,
        params: &[ParamDescriptor],
        bound: &BoundArguments,
    ) -> Result<Arguments> {
        let use_attributes = self.container.config.use_attributes;
        let values = resolve_arguments(self, target, params, bound, use_attributes)?;
        Ok(Arguments::new(target, values))
    }
}

impl ArgumentSink for LiveSink<'_> {
    type Output = AnyValue;

    fn has(&self, id: &str) -> bool {
        self.container.has(id)
    }

    fn service(&mut self, id: &str) -> Result<AnyValue> {
        self.container.resolve_in(id, self.ctx)
    }

    fn literal(&mut self, value: &AnyValue) -> Result<AnyValue> {
        Ok(Arc::clone(value))
    }

    fn tagged(&mut self, query: &TagQuery) -> Result<AnyValue> {
        build_tagged(self.container, query, self.owner, self.ctx)
    }

    fn proxy(&mut self, id: &str) -> Result<AnyValue> {
        Ok(Arc::new(ProxyClosure::new(self.container.weak_locator(), id)))
    }

    fn callable(&mut self, target: &CallableTarget) -> Result<AnyValue> {
        // A callable argument is not the definition being built.
        invoke_callable(self.container, target, &BoundArguments::new(), None, self.ctx)
    }

    fn inline(&mut self, definition: &Definition) -> Result<AnyValue> {
        // Inline definitions are anonymous: never cached, never in the guard.
        build(self.container, "<inline>", None, definition, self.ctx)
    }

    fn list(&mut self, items: Vec<AnyValue>) -> Result<AnyValue> {
        Ok(Arc::new(items))
    }
}

/// Locator handed to factories: nested lookups share the caller's context
pub(crate) struct CallScope<'c> {
    container: &'c ContainerInner,
    ctx: &'c ResolutionContext,
}

impl ServiceLocator for CallScope<'_> {
    fn get(&self, id: &str) -> Result<AnyValue> {
        self.container.resolve_in(id, self.ctx)
    }

    fn has(&self, id: &str) -> bool {
        self.container.has(id)
    }
}

/// Build the value for `definition`.
///
/// `id` is only used for diagnostics; `owner` is the identifier excluded
/// from self-referencing tag collections.
pub(crate) fn build(
    container: &ContainerInner,
    id: &str,
    owner: Option<&str>,
    definition: &Definition,
    ctx: &ResolutionContext,
) -> Result<AnyValue> {
    #[cfg(feature = "logging")]
    trace!(
        target: "definition_injector",
        service = id,
        kind = definition.kind().label(),
        depth = ctx.depth(),
        "Building service"
    );

    match definition.kind() {
        DefinitionKind::Value { value, .. } => Ok(Arc::clone(value)),
        DefinitionKind::Autowire(class) => {
            build_object(container, class, definition, owner, ctx).map(Arc::from)
        }
        DefinitionKind::Callable(target) => {
            invoke_callable(container, target, definition.arguments(), owner, ctx)
        }
        DefinitionKind::Factory(class) => {
            let object = build_object(container, class, definition, owner, ctx)?;
            let factory = object
                .downcast_ref::<FactoryObject>()
                .ok_or_else(|| DiError::type_mismatch::<FactoryObject>(format!("factory `{id}`")))?;
            factory.create(&CallScope { container, ctx })
        }
        DefinitionKind::Reference(target) => container.resolve_in(target, ctx),
        DefinitionKind::Proxy(target) => {
            Ok(Arc::new(ProxyClosure::new(container.weak_locator(), target.as_str())))
        }
        DefinitionKind::Tagged(query) => build_tagged(container, query, owner, ctx),
    }
}

/// Construct an object and run its setup calls
fn build_object(
    container: &ContainerInner,
    class: &ClassDescriptor,
    definition: &Definition,
    owner: Option<&str>,
    ctx: &ResolutionContext,
) -> Result<Instance> {
    let mut sink = LiveSink::new(container, ctx, owner);

    let args = sink.resolve(class.name(), class.params(), definition.arguments())?;
    let mut instance = class.constructor().invoke(args)?;

    for call in definition.setup_calls() {
        let method = class.require_method(&call.method)?;
        let target = format!("{}::{}", class.name(), method.name());
        let args = sink.resolve(&target, method.params(), &call.arguments)?;
        instance = apply_setup(instance, call.immutable, method.body(), &target, args)?;
    }

    Ok(instance)
}

/// Apply one setup call to the working instance.
///
/// A mutable call runs in place (any return value is dropped); an immutable
/// call needs a value-returning method and its result becomes the new
/// working instance.
pub(crate) fn apply_setup(
    mut instance: Instance,
    immutable: bool,
    body: &MethodBody,
    target: &str,
    args: Arguments,
) -> Result<Instance> {
    match (immutable, body) {
        (false, MethodBody::Mutator(f)) => {
            f(instance.as_mut(), args)?;
            Ok(instance)
        }
        (false, MethodBody::Wither(f)) => {
            f(instance.as_ref(), args)?;
            Ok(instance)
        }
        (true, MethodBody::Wither(f)) => f(instance.as_ref(), args),
        (true, MethodBody::Mutator(_)) => Err(DiError::invalid(
            target,
            "immutable setup call needs a method that returns the replacement instance",
        )),
    }
}

/// Resolve the receiver of a method callable: the service named explicitly,
/// or the one registered under the class name.
pub(crate) fn receiver_id(target: &CallableTarget) -> Option<&str> {
    match target {
        CallableTarget::Function(_) => None,
        CallableTarget::Method { class, service, .. } => {
            Some(service.as_deref().unwrap_or_else(|| class.name()))
        }
    }
}

/// Invoke a callable with autowired arguments.
///
/// `owner` is the definition the callable belongs to, if any.
pub(crate) fn invoke_callable(
    container: &ContainerInner,
    target: &CallableTarget,
    bound: &BoundArguments,
    owner: Option<&str>,
    ctx: &ResolutionContext,
) -> Result<AnyValue> {
    let mut sink = LiveSink::new(container, ctx, owner);

    match target {
        CallableTarget::Function(function) => {
            let args = sink.resolve(function.name(), function.params(), bound)?;
            function.body().invoke(args)
        }
        CallableTarget::Method { class, method, .. } => {
            let descriptor = class.require_method(method)?;
            let MethodBody::Wither(f) = descriptor.body() else {
                return Err(DiError::invalid(
                    target.display_name(),
                    "a callable method must return a value",
                ));
            };
            let receiver = container.resolve_in(receiver_id(target).unwrap_or(class.name()), ctx)?;
            let name = target.display_name();
            let args = sink.resolve(&name, descriptor.params(), bound)?;
            f(receiver.as_ref(), args).map(Arc::from)
        }
    }
}

fn build_tagged(
    container: &ContainerInner,
    query: &TagQuery,
    owner: Option<&str>,
    ctx: &ResolutionContext,
) -> Result<AnyValue> {
    let members = collect_members(
        &container.store,
        query,
        owner,
        container.config.default_priority_method.as_deref(),
    )?;

    if query.lazy {
        let members = members
            .into_iter()
            .map(|member| (member.key, member.id))
            .collect();
        return Ok(Arc::new(LazyTagged::new(
            container.weak_locator(),
            query.tag.as_str(),
            members,
        )));
    }

    let entries = members
        .into_iter()
        .map(|member| {
            container
                .resolve_in(&member.id, ctx)
                .map(|value| (member.key, value))
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Arc::new(TaggedValues::new(entries)))
}
