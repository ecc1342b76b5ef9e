//! Target descriptors: the metadata side-table standing in for reflection
//!
//! A `ClassDescriptor` records what a reflective runtime would discover on its
//! own: the constructor signature, callable methods, static priority functions
//! and per-parameter injection metadata. Descriptors are built once by the
//! registration layer and only read by the resolver.

use crate::definition::{CallableTarget, TagQuery};
use crate::locator::{DiFactory, FactoryObject};
use crate::value::{AnyValue, Arguments, Injectable, Instance};
use crate::{DiError, Result};
use ahash::{AHashMap, RandomState};
use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;

#[cfg(feature = "logging")]
use tracing::debug;

type ConstructorFn = dyn Fn(Arguments) -> Result<Instance> + Send + Sync;
type MutatorFn = dyn Fn(&mut (dyn Any + Send + Sync), Arguments) -> Result<()> + Send + Sync;
type WitherFn = dyn Fn(&(dyn Any + Send + Sync), Arguments) -> Result<Instance> + Send + Sync;
type FunctionFn = dyn Fn(Arguments) -> Result<AnyValue> + Send + Sync;
type PriorityFn = dyn Fn(&str) -> i64 + Send + Sync;

/// Type-erased constructor handle
#[derive(Clone)]
pub struct Constructor(Arc<ConstructorFn>);

impl Constructor {
    /// Run the constructor
    #[inline]
    pub fn invoke(&self, args: Arguments) -> Result<Instance> {
        (self.0)(args)
    }
}

impl std::fmt::Debug for Constructor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Constructor(..)")
    }
}

/// Type-erased method body
#[derive(Clone)]
pub enum MethodBody {
    /// Mutates the receiver in place; nothing is returned
    Mutator(Arc<MutatorFn>),
    /// Reads the receiver and returns a new value (wither / plain call)
    Wither(Arc<WitherFn>),
}

impl MethodBody {
    /// Whether the method produces a value
    #[inline]
    pub fn returns_value(&self) -> bool {
        matches!(self, MethodBody::Wither(_))
    }
}

impl std::fmt::Debug for MethodBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MethodBody::Mutator(_) => f.write_str("Mutator(..)"),
            MethodBody::Wither(_) => f.write_str("Wither(..)"),
        }
    }
}

/// Type-erased free function handle
#[derive(Clone)]
pub struct FunctionBody(Arc<FunctionFn>);

impl FunctionBody {
    /// Call the function
    #[inline]
    pub fn invoke(&self, args: Arguments) -> Result<AnyValue> {
        (self.0)(args)
    }
}

impl std::fmt::Debug for FunctionBody {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("FunctionBody(..)")
    }
}

/// One member of a parameter's declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeHint {
    /// Type name; for non-builtin types this doubles as a container identifier
    pub name: String,
    /// Primitive/builtin types are never looked up in the container
    pub builtin: bool,
}

/// Declarative injection metadata attached to a parameter.
#[derive(Debug, Clone)]
pub enum ParamAttribute {
    /// Inject the service `id`, or the parameter's declared type when `None`
    Inject { id: Option<String> },
    /// Inject a tagged collection
    TaggedAs(TagQuery),
    /// Inject a closure that resolves `id` (or the declared type) when called
    ProxyClosure { id: Option<String> },
    /// Inject the result of calling a callable
    InjectByCallable(CallableTarget),
}

impl ParamAttribute {
    /// Kind label used in conflict diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            ParamAttribute::Inject { .. } => "inject",
            ParamAttribute::TaggedAs(_) => "tagged-as",
            ParamAttribute::ProxyClosure { .. } => "proxy-closure",
            ParamAttribute::InjectByCallable(_) => "inject-by-callable",
        }
    }
}

/// Declared parameter of a constructor, method or function.
#[derive(Clone)]
pub struct ParamDescriptor {
    pub(crate) name: String,
    pub(crate) types: Vec<TypeHint>,
    pub(crate) variadic: bool,
    pub(crate) default: Option<AnyValue>,
    pub(crate) attributes: Vec<ParamAttribute>,
}

impl ParamDescriptor {
    /// An untyped parameter
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            types: Vec::new(),
            variadic: false,
            default: None,
            attributes: Vec::new(),
        }
    }

    /// Add a concrete (container-resolvable) type
    pub fn typed(mut self, type_name: impl Into<String>) -> Self {
        self.types.push(TypeHint {
            name: type_name.into(),
            builtin: false,
        });
        self
    }

    /// Add `T` as a concrete type, named by `std::any::type_name`
    pub fn typed_as<T: Injectable>(self) -> Self {
        self.typed(T::type_name_of())
    }

    /// Declare a union type; candidates are tried in the given order
    pub fn union<I, S>(mut self, members: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for member in members {
            self = self.typed(member);
        }
        self
    }

    /// Add a builtin/primitive type (never looked up by identifier)
    pub fn builtin(mut self, type_name: impl Into<String>) -> Self {
        self.types.push(TypeHint {
            name: type_name.into(),
            builtin: true,
        });
        self
    }

    /// Mark as variadic (collects the remaining arguments)
    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    /// Default value used when nothing else resolves
    pub fn default_value<T: Injectable>(mut self, value: T) -> Self {
        self.default = Some(Arc::new(value));
        self
    }

    /// Attach declarative injection metadata
    pub fn attribute(mut self, attribute: ParamAttribute) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Parameter name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared types, in declaration order
    #[inline]
    pub fn types(&self) -> &[TypeHint] {
        &self.types
    }

    /// Whether the parameter is variadic
    #[inline]
    pub fn is_variadic(&self) -> bool {
        self.variadic
    }

    /// Declared default value
    #[inline]
    pub fn default_arg(&self) -> Option<&AnyValue> {
        self.default.as_ref()
    }

    /// Attached metadata
    #[inline]
    pub fn attributes(&self) -> &[ParamAttribute] {
        &self.attributes
    }

    /// Non-builtin type names, in declaration order
    pub fn candidates(&self) -> impl Iterator<Item = &str> {
        self.types
            .iter()
            .filter(|hint| !hint.builtin)
            .map(|hint| hint.name.as_str())
    }
}

impl std::fmt::Debug for ParamDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParamDescriptor")
            .field("name", &self.name)
            .field("types", &self.types)
            .field("variadic", &self.variadic)
            .field("has_default", &self.default.is_some())
            .field("attributes", &self.attributes)
            .finish()
    }
}

/// A callable method on a class.
#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    pub(crate) name: String,
    pub(crate) params: Vec<ParamDescriptor>,
    pub(crate) body: MethodBody,
    pub(crate) return_type: &'static str,
}

impl MethodDescriptor {
    /// Method name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameters
    #[inline]
    pub fn params(&self) -> &[ParamDescriptor] {
        &self.params
    }

    /// Type-erased body
    #[inline]
    pub fn body(&self) -> &MethodBody {
        &self.body
    }

    /// Declared return type (`()` for mutators)
    #[inline]
    pub fn return_type(&self) -> &'static str {
        self.return_type
    }
}

/// A free function (or closure) that can be autowired and invoked.
#[derive(Debug, Clone)]
pub struct FunctionDescriptor {
    pub(crate) name: String,
    pub(crate) params: Vec<ParamDescriptor>,
    pub(crate) body: FunctionBody,
    pub(crate) return_type: String,
}

impl FunctionDescriptor {
    /// Describe a function returning `R`
    pub fn new<R, F>(
        name: impl Into<String>,
        params: impl IntoIterator<Item = ParamDescriptor>,
        f: F,
    ) -> Self
    where
        R: Injectable,
        F: Fn(Arguments) -> Result<R> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params: params.into_iter().collect(),
            body: FunctionBody(Arc::new(move |args: Arguments| f(args).map(|v| Arc::new(v) as AnyValue))),
            return_type: R::type_name_of().to_owned(),
        }
    }

    /// Describe a function that already returns a type-erased value
    pub fn raw<F>(
        name: impl Into<String>,
        params: impl IntoIterator<Item = ParamDescriptor>,
        return_type: impl Into<String>,
        f: F,
    ) -> Self
    where
        F: Fn(Arguments) -> Result<AnyValue> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params: params.into_iter().collect(),
            body: FunctionBody(Arc::new(f)),
            return_type: return_type.into(),
        }
    }

    /// Function name
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declared parameters
    #[inline]
    pub fn params(&self) -> &[ParamDescriptor] {
        &self.params
    }

    /// Type-erased body
    #[inline]
    pub fn body(&self) -> &FunctionBody {
        &self.body
    }

    /// Declared return type
    #[inline]
    pub fn return_type(&self) -> &str {
        &self.return_type
    }
}

/// A class: constructor signature, methods and static priority functions.
///
/// # Examples
///
/// ```rust
/// use definition_injector::{ClassDescriptor, ParamDescriptor};
///
/// struct Mailer { host: String, retries: u32 }
///
/// let class = ClassDescriptor::of::<Mailer, _>(
///     [ParamDescriptor::new("host").builtin("String")],
///     |args| Ok(Mailer { host: args.cloned::<String>(0)?, retries: 0 }),
/// )
/// .mutator::<Mailer, _>("set_retries", [ParamDescriptor::new("n")], |m, args| {
///     m.retries = *args.get::<u32>(0)?;
///     Ok(())
/// });
///
/// assert!(class.method("set_retries").is_some());
/// ```
#[derive(Clone)]
pub struct ClassDescriptor {
    pub(crate) name: String,
    pub(crate) params: Vec<ParamDescriptor>,
    pub(crate) constructor: Constructor,
    pub(crate) methods: AHashMap<String, MethodDescriptor>,
    pub(crate) priorities: AHashMap<String, Arc<PriorityFn>>,
    pub(crate) is_factory: bool,
}

impl ClassDescriptor {
    /// Describe `T`, named by `std::any::type_name::<T>()`
    pub fn of<T, F>(params: impl IntoIterator<Item = ParamDescriptor>, ctor: F) -> Self
    where
        T: Injectable,
        F: Fn(Arguments) -> Result<T> + Send + Sync + 'static,
    {
        Self::named(T::type_name_of(), params, ctor)
    }

    /// Describe a class under an explicit name
    pub fn named<T, F>(
        name: impl Into<String>,
        params: impl IntoIterator<Item = ParamDescriptor>,
        ctor: F,
    ) -> Self
    where
        T: Injectable,
        F: Fn(Arguments) -> Result<T> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            params: params.into_iter().collect(),
            constructor: Constructor(Arc::new(move |args: Arguments| {
                ctor(args).map(|v| Box::new(v) as Instance)
            })),
            methods: AHashMap::new(),
            priorities: AHashMap::new(),
            is_factory: false,
        }
    }

    /// Describe a factory class: its instance is invoked with the container
    /// and the result of that call is the service value.
    pub fn factory<T, F>(
        name: impl Into<String>,
        params: impl IntoIterator<Item = ParamDescriptor>,
        ctor: F,
    ) -> Self
    where
        T: DiFactory,
        F: Fn(Arguments) -> Result<T> + Send + Sync + 'static,
    {
        let mut class = Self::named(name, params, move |args| {
            ctor(args).map(|factory| FactoryObject(Arc::new(factory)))
        });
        class.is_factory = true;
        class
    }

    /// Add a mutating method (used by mutable setup calls)
    pub fn mutator<T, F>(
        mut self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = ParamDescriptor>,
        f: F,
    ) -> Self
    where
        T: Injectable,
        F: Fn(&mut T, Arguments) -> Result<()> + Send + Sync + 'static,
    {
        let name = name.into();
        let context = format!("receiver of {}::{}", self.name, name);
        let body = MethodBody::Mutator(Arc::new(
            move |receiver: &mut (dyn Any + Send + Sync), args: Arguments| {
                let receiver = receiver
                    .downcast_mut::<T>()
                    .ok_or_else(|| DiError::type_mismatch::<T>(context.as_str()))?;
                f(receiver, args)
            },
        ));
        self.methods.insert(
            name.clone(),
            MethodDescriptor {
                name,
                params: params.into_iter().collect(),
                body,
                return_type: "()",
            },
        );
        self
    }

    /// Add a method that reads the receiver and returns a value
    /// (immutable setup calls, callable targets)
    pub fn wither<T, R, F>(
        mut self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = ParamDescriptor>,
        f: F,
    ) -> Self
    where
        T: Injectable,
        R: Injectable,
        F: Fn(&T, Arguments) -> Result<R> + Send + Sync + 'static,
    {
        let name = name.into();
        let context = format!("receiver of {}::{}", self.name, name);
        let body = MethodBody::Wither(Arc::new(
            move |receiver: &(dyn Any + Send + Sync), args: Arguments| {
                let receiver = receiver
                    .downcast_ref::<T>()
                    .ok_or_else(|| DiError::type_mismatch::<T>(context.as_str()))?;
                f(receiver, args).map(|v| Box::new(v) as Instance)
            },
        ));
        self.methods.insert(
            name.clone(),
            MethodDescriptor {
                name,
                params: params.into_iter().collect(),
                body,
                return_type: R::type_name_of(),
            },
        );
        self
    }

    /// Add a static priority function used to order tag members
    pub fn priority<F>(mut self, name: impl Into<String>, f: F) -> Self
    where
        F: Fn(&str) -> i64 + Send + Sync + 'static,
    {
        self.priorities.insert(name.into(), Arc::new(f));
        self
    }

    /// Class name (the default container identifier)
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Constructor parameters
    #[inline]
    pub fn params(&self) -> &[ParamDescriptor] {
        &self.params
    }

    /// Constructor handle
    #[inline]
    pub fn constructor(&self) -> &Constructor {
        &self.constructor
    }

    /// Look up a method by name
    #[inline]
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    /// Look up a method, failing with `InvalidDefinition` when absent
    pub fn require_method(&self, name: &str) -> Result<&MethodDescriptor> {
        self.method(name).ok_or_else(|| {
            DiError::invalid(
                self.name.as_str(),
                format!("class does not declare method `{name}`"),
            )
        })
    }

    /// Call the static priority function `method` for `tag`, if declared
    pub fn priority_for(&self, method: &str, tag: &str) -> Option<i64> {
        self.priorities.get(method).map(|f| f(tag))
    }

    /// Whether instances are factories
    #[inline]
    pub fn is_factory(&self) -> bool {
        self.is_factory
    }
}

impl std::fmt::Debug for ClassDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut methods: Vec<&str> = self.methods.keys().map(String::as_str).collect();
        methods.sort_unstable();
        f.debug_struct("ClassDescriptor")
            .field("name", &self.name)
            .field("params", &self.params)
            .field("methods", &methods)
            .field("is_factory", &self.is_factory)
            .finish()
    }
}

/// Known classes, keyed by name.
///
/// Used for zero-config autowiring: an identifier that was never registered
/// but names a known class can still be built.
#[derive(Default)]
pub struct ClassRegistry {
    classes: DashMap<String, Arc<ClassDescriptor>, RandomState>,
}

impl ClassRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a class
    pub fn insert(&self, class: ClassDescriptor) -> Arc<ClassDescriptor> {
        let class = Arc::new(class);

        #[cfg(feature = "logging")]
        debug!(
            target: "definition_injector",
            class = class.name(),
            params = class.params().len(),
            "Registering class descriptor"
        );

        self.classes
            .insert(class.name().to_owned(), Arc::clone(&class));
        class
    }

    /// Look up a class by name
    #[inline]
    pub fn get(&self, name: &str) -> Option<Arc<ClassDescriptor>> {
        self.classes.get(name).map(|c| Arc::clone(c.value()))
    }

    /// Check if a class is known
    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.classes.contains_key(name)
    }

    /// Number of known classes
    #[inline]
    pub fn len(&self) -> usize {
        self.classes.len()
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl std::fmt::Debug for ClassRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassRegistry")
            .field("count", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::any_value;

    #[derive(Debug, Clone, PartialEq)]
    struct Counter {
        count: u32,
    }

    fn counter_class() -> ClassDescriptor {
        ClassDescriptor::of::<Counter, _>([], |_| Ok(Counter { count: 0 }))
            .mutator::<Counter, _>("add", [ParamDescriptor::new("n")], |c, args| {
                c.count += *args.get::<u32>(0)?;
                Ok(())
            })
            .wither::<Counter, Counter, _>("doubled", [], |c, _| {
                Ok(Counter { count: c.count * 2 })
            })
            .priority("get_priority", |tag| if tag == "hot" { 10 } else { 0 })
    }

    #[test]
    fn test_constructor_and_methods() {
        let class = counter_class();
        let mut instance = class.constructor().invoke(Arguments::new("Counter", vec![])).unwrap();

        let MethodBody::Mutator(add) = class.require_method("add").unwrap().body().clone() else {
            panic!("add should be a mutator");
        };
        add(instance.as_mut(), Arguments::new("add", vec![any_value(3u32)])).unwrap();

        let MethodBody::Wither(doubled) = class.require_method("doubled").unwrap().body().clone()
        else {
            panic!("doubled should be a wither");
        };
        let replaced = doubled(instance.as_ref(), Arguments::new("doubled", vec![])).unwrap();

        assert_eq!(instance.downcast_ref::<Counter>(), Some(&Counter { count: 3 }));
        assert_eq!(replaced.downcast_ref::<Counter>(), Some(&Counter { count: 6 }));
    }

    #[test]
    fn test_missing_method_is_invalid_definition() {
        let err = counter_class().require_method("nope").unwrap_err();
        assert!(matches!(err, DiError::InvalidDefinition { .. }));
    }

    #[test]
    fn test_priority_function() {
        let class = counter_class();
        assert_eq!(class.priority_for("get_priority", "hot"), Some(10));
        assert_eq!(class.priority_for("get_priority", "cold"), Some(0));
        assert_eq!(class.priority_for("missing", "hot"), None);
    }

    #[test]
    fn test_param_candidates_skip_builtins() {
        let param = ParamDescriptor::new("logger")
            .builtin("null")
            .union(["FileLogger", "StdoutLogger"]);
        let candidates: Vec<&str> = param.candidates().collect();
        assert_eq!(candidates, vec!["FileLogger", "StdoutLogger"]);
    }

    #[test]
    fn test_registry() {
        let registry = ClassRegistry::new();
        assert!(registry.is_empty());
        registry.insert(counter_class());
        assert!(registry.contains(std::any::type_name::<Counter>()));
        assert_eq!(registry.len(), 1);
    }
}
