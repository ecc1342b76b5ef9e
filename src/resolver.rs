//! Parameter resolution
//!
//! Every parameter of a constructor, method or function is resolved from the
//! first source that applies, in this order:
//!
//! 1. a bound argument (by name, then by position)
//! 2. declarative metadata attached to the parameter
//! 3. the declared type (first resolvable member of a union)
//! 4. the parameter name, for untyped and builtin parameters
//! 5. the declared default value
//!
//! Anything left over is an `UnresolvableDependency`. The walk is written
//! once against [`ArgumentSink`]: the live container plugs in a sink that
//! produces values, the compiler one that produces expressions.

use crate::definition::{ArgKey, ArgumentSpec, BoundArguments, CallableTarget, Definition, TagQuery};
use crate::descriptor::{ParamAttribute, ParamDescriptor};
use crate::value::AnyValue;
use crate::{DiError, Result};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

/// Where resolved arguments go.
///
/// The sink knows which definition it is resolving for, so `tagged` can
/// honor `exclude_self`.
pub(crate) trait ArgumentSink {
    type Output;

    /// Whether `id` can be resolved
    fn has(&self, id: &str) -> bool;

    /// The service registered under `id`
    fn service(&mut self, id: &str) -> Result<Self::Output>;

    /// A literal (bound value or parameter default)
    fn literal(&mut self, value: &AnyValue) -> Result<Self::Output>;

    /// A tag collection
    fn tagged(&mut self, query: &TagQuery) -> Result<Self::Output>;

    /// A closure resolving `id` when called
    fn proxy(&mut self, id: &str) -> Result<Self::Output>;

    /// The result of invoking `target`
    fn callable(&mut self, target: &CallableTarget) -> Result<Self::Output>;

    /// A nested definition built in place
    fn inline(&mut self, definition: &Definition) -> Result<Self::Output>;

    /// A sequence passed as a single argument
    fn list(&mut self, items: Vec<Self::Output>) -> Result<Self::Output>;

    /// Record which parameter `output` fills.
    ///
    /// `fallback` is set when a later failure of `output` may still be
    /// replaced by the parameter default. Sinks that produce values have
    /// already failed or succeeded by now and keep the default.
    fn parameter(
        &mut self,
        output: Self::Output,
        _target: &str,
        _parameter: &str,
        _position: usize,
        _fallback: Option<&AnyValue>,
    ) -> Self::Output {
        output
    }
}

/// The parameter currently being resolved, for diagnostics
struct Slot<'a> {
    target: &'a str,
    param: &'a ParamDescriptor,
    position: usize,
}

impl Slot<'_> {
    fn wrap(&self, err: DiError) -> DiError {
        err.in_parameter(self.target, self.param.name(), self.position)
    }

    fn attach<S: ArgumentSink>(&self, sink: &mut S, output: S::Output, rescuable: bool) -> S::Output {
        let fallback = if rescuable { self.param.default_arg() } else { None };
        sink.parameter(output, self.target, self.param.name(), self.position, fallback)
    }

    fn unresolvable(&self, message: impl Into<String>) -> DiError {
        DiError::UnresolvableDependency {
            target: self.target.to_owned(),
            parameter: self.param.name().to_owned(),
            position: self.position,
            message: message.into(),
            source: None,
        }
    }

    fn conflict(&self, kinds: Vec<&'static str>) -> DiError {
        DiError::ConflictingMetadata {
            target: self.target.to_owned(),
            parameter: self.param.name().to_owned(),
            position: self.position,
            kinds: kinds.join(", "),
        }
    }
}

/// Resolve the full argument list for `target`.
///
/// Variadic parameters are expanded in place, so the result can be longer
/// (or shorter) than `params`.
pub(crate) fn resolve_arguments<S: ArgumentSink>(
    sink: &mut S,
    target: &str,
    params: &[ParamDescriptor],
    bound: &BoundArguments,
    use_attributes: bool,
) -> Result<Vec<S::Output>> {
    let variadic_at = params.iter().position(ParamDescriptor::is_variadic);
    let absorbed = unmatched_bindings(target, params, bound, variadic_at)?;

    let mut resolved = Vec::with_capacity(params.len() + absorbed.len());
    for (position, param) in params.iter().enumerate() {
        let slot = Slot {
            target,
            param,
            position,
        };
        if param.is_variadic() {
            resolve_variadic(sink, &slot, bound, &absorbed, use_attributes, &mut resolved)?;
        } else {
            resolved.push(resolve_single(sink, &slot, bound, use_attributes)?);
        }
    }
    Ok(resolved)
}

/// Named bindings that match no parameter.
///
/// They are handed to the variadic parameter when there is one; otherwise
/// they (and out-of-range positions) make the definition invalid.
fn unmatched_bindings<'b>(
    target: &str,
    params: &[ParamDescriptor],
    bound: &'b BoundArguments,
    variadic_at: Option<usize>,
) -> Result<Vec<&'b ArgumentSpec>> {
    let mut absorbed = Vec::new();
    for (key, spec) in bound.iter() {
        let matched = match key {
            ArgKey::Name(name) => params.iter().any(|param| param.name() == name),
            ArgKey::Index(index) => *index < params.len() || variadic_at.is_some(),
        };
        if matched {
            continue;
        }
        match (key, variadic_at) {
            (ArgKey::Name(_), Some(_)) => absorbed.push(spec),
            _ => {
                return Err(DiError::invalid(
                    target,
                    format!("bound argument {key} matches no parameter"),
                ));
            }
        }
    }
    Ok(absorbed)
}

fn resolve_single<S: ArgumentSink>(
    sink: &mut S,
    slot: &Slot<'_>,
    bound: &BoundArguments,
    use_attributes: bool,
) -> Result<S::Output> {
    let param = slot.param;

    if let Some(spec) = bound.get(slot.position, param.name()) {
        #[cfg(feature = "logging")]
        trace!(
            target: "definition_injector",
            owner = slot.target,
            parameter = param.name(),
            "Using bound argument"
        );
        let output = resolve_spec(sink, spec).map_err(|e| slot.wrap(e))?;
        return Ok(slot.attach(sink, output, false));
    }

    if use_attributes && !param.attributes().is_empty() {
        let attributes = param.attributes();
        if attributes.len() > 1 {
            return Err(slot.conflict(attributes.iter().map(ParamAttribute::kind).collect()));
        }
        let output = resolve_attribute(sink, slot, &attributes[0]).map_err(|e| slot.wrap(e))?;
        return Ok(slot.attach(sink, output, false));
    }

    let mut candidates = param.candidates().peekable();
    let lookup = if candidates.peek().is_some() {
        candidates.find(|candidate| sink.has(candidate))
    } else {
        Some(param.name()).filter(|name| sink.has(name))
    };

    match lookup {
        Some(id) => match sink.service(id) {
            Ok(output) => Ok(slot.attach(sink, output, true)),
            Err(err) => fall_back_to_default(sink, slot, err),
        },
        None => match param.default_arg() {
            Some(default) => {
                #[cfg(feature = "logging")]
                debug!(
                    target: "definition_injector",
                    owner = slot.target,
                    parameter = param.name(),
                    "No source for parameter, using its default value"
                );
                sink.literal(default)
            }
            None if param.types().is_empty() => Err(slot.unresolvable(
                "parameter is untyped and no service is registered under its name",
            )),
            None => Err(slot.unresolvable(format!(
                "no registered service matches {}",
                param
                    .types()
                    .iter()
                    .map(|hint| hint.name.as_str())
                    .collect::<Vec<_>>()
                    .join("|")
            ))),
        },
    }
}

/// Recover an inferred dependency failure with the parameter default, if any.
///
/// Cycles are never masked.
fn fall_back_to_default<S: ArgumentSink>(
    sink: &mut S,
    slot: &Slot<'_>,
    err: DiError,
) -> Result<S::Output> {
    match slot.param.default_arg() {
        Some(default) if err.is_recoverable() => {
            #[cfg(feature = "logging")]
            debug!(
                target: "definition_injector",
                owner = slot.target,
                parameter = slot.param.name(),
                error = %err,
                "Dependency failed, using parameter default"
            );
            sink.literal(default)
        }
        _ => Err(slot.wrap(err)),
    }
}

fn resolve_variadic<S: ArgumentSink>(
    sink: &mut S,
    slot: &Slot<'_>,
    bound: &BoundArguments,
    absorbed: &[&ArgumentSpec],
    use_attributes: bool,
    out: &mut Vec<S::Output>,
) -> Result<()> {
    let param = slot.param;
    let start = out.len();

    let named = bound.iter().find_map(|(key, spec)| match key {
        ArgKey::Name(name) if name == param.name() => Some(spec),
        _ => None,
    });

    if let Some(spec) = named {
        expand_spec(sink, spec, out).map_err(|e| slot.wrap(e))?;
    } else {
        let mut indexed: Vec<(usize, &ArgumentSpec)> = bound
            .iter()
            .filter_map(|(key, spec)| match key {
                ArgKey::Index(index) if *index >= slot.position => Some((*index, spec)),
                _ => None,
            })
            .collect();
        indexed.sort_by_key(|(index, _)| *index);

        for (index, spec) in indexed {
            if index == slot.position {
                expand_spec(sink, spec, out).map_err(|e| slot.wrap(e))?;
            } else {
                out.push(resolve_spec(sink, spec).map_err(|e| slot.wrap(e))?);
            }
        }
    }

    for spec in absorbed {
        out.push(resolve_spec(sink, spec).map_err(|e| slot.wrap(e))?);
    }

    if out.len() == start && use_attributes && !param.attributes().is_empty() {
        let attributes = param.attributes();
        let first = attributes[0].kind();
        if attributes.iter().any(|attribute| attribute.kind() != first) {
            return Err(slot.conflict(attributes.iter().map(ParamAttribute::kind).collect()));
        }
        for attribute in attributes {
            out.push(resolve_attribute(sink, slot, attribute).map_err(|e| slot.wrap(e))?);
        }
    }

    let expanded: Vec<S::Output> = out.drain(start..).collect();
    for output in expanded {
        let output = slot.attach(sink, output, false);
        out.push(output);
    }

    #[cfg(feature = "logging")]
    trace!(
        target: "definition_injector",
        owner = slot.target,
        parameter = param.name(),
        count = out.len() - start,
        "Expanded variadic parameter"
    );

    Ok(())
}

/// Push `spec` into a variadic parameter: lists contribute one argument per
/// element, anything else a single argument.
fn expand_spec<S: ArgumentSink>(
    sink: &mut S,
    spec: &ArgumentSpec,
    out: &mut Vec<S::Output>,
) -> Result<()> {
    match spec {
        ArgumentSpec::List(items) => {
            for item in items {
                out.push(resolve_spec(sink, item)?);
            }
        }
        other => out.push(resolve_spec(sink, other)?),
    }
    Ok(())
}

fn resolve_spec<S: ArgumentSink>(sink: &mut S, spec: &ArgumentSpec) -> Result<S::Output> {
    match spec {
        ArgumentSpec::Value(value) => sink.literal(value),
        ArgumentSpec::Reference(id) => sink.service(id),
        ArgumentSpec::Tagged(query) => sink.tagged(query),
        ArgumentSpec::Proxy(id) => sink.proxy(id),
        ArgumentSpec::Callable(target) => sink.callable(target),
        ArgumentSpec::Inline(definition) => sink.inline(definition),
        ArgumentSpec::List(items) => {
            let resolved = items
                .iter()
                .map(|item| resolve_spec(sink, item))
                .collect::<Result<Vec<_>>>()?;
            sink.list(resolved)
        }
    }
}

fn resolve_attribute<S: ArgumentSink>(
    sink: &mut S,
    slot: &Slot<'_>,
    attribute: &ParamAttribute,
) -> Result<S::Output> {
    match attribute {
        ParamAttribute::Inject { id } => {
            let id = attribute_target(slot, id.as_deref())?;
            sink.service(id)
        }
        ParamAttribute::TaggedAs(query) => sink.tagged(query),
        ParamAttribute::ProxyClosure { id } => {
            let id = attribute_target(slot, id.as_deref())?;
            sink.proxy(id)
        }
        ParamAttribute::InjectByCallable(target) => sink.callable(target),
    }
}

fn attribute_target<'a>(slot: &Slot<'a>, explicit: Option<&'a str>) -> Result<&'a str> {
    explicit
        .or_else(|| slot.param.candidates().next())
        .ok_or_else(|| {
            slot.unresolvable("injection metadata names no identifier and the parameter has no class type")
        })
}
