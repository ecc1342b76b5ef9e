//! Normalized service definitions
//!
//! A `Definition` is the recipe the registration layer hands to the engine:
//! what kind of value to produce, from which target, with which bound
//! arguments, setup calls and tag memberships. Definitions are immutable once
//! registered.

use crate::descriptor::{ClassDescriptor, FunctionDescriptor};
use crate::value::{AnyValue, Injectable};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Key of a bound argument: parameter name or zero-based position
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArgKey {
    Name(String),
    Index(usize),
}

impl From<&str> for ArgKey {
    fn from(name: &str) -> Self {
        ArgKey::Name(name.to_owned())
    }
}

impl From<String> for ArgKey {
    fn from(name: String) -> Self {
        ArgKey::Name(name)
    }
}

impl From<usize> for ArgKey {
    fn from(index: usize) -> Self {
        ArgKey::Index(index)
    }
}

impl std::fmt::Display for ArgKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArgKey::Name(name) => write!(f, "`{name}`"),
            ArgKey::Index(index) => write!(f, "#{index}"),
        }
    }
}

/// Something that can be invoked with autowired arguments
#[derive(Debug, Clone)]
pub enum CallableTarget {
    /// A free function
    Function(Arc<FunctionDescriptor>),
    /// A method on a service instance resolved from the container.
    ///
    /// `service` defaults to the class name.
    Method {
        class: Arc<ClassDescriptor>,
        service: Option<String>,
        method: String,
    },
}

impl CallableTarget {
    /// Wrap a function descriptor
    pub fn function(function: FunctionDescriptor) -> Self {
        CallableTarget::Function(Arc::new(function))
    }

    /// Call `method` on the service registered under the class name
    pub fn method(class: Arc<ClassDescriptor>, method: impl Into<String>) -> Self {
        CallableTarget::Method {
            class,
            service: None,
            method: method.into(),
        }
    }

    /// Call `method` on the service registered under `service`
    pub fn method_on(
        class: Arc<ClassDescriptor>,
        service: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        CallableTarget::Method {
            class,
            service: Some(service.into()),
            method: method.into(),
        }
    }

    /// Human-readable name (`function` or `Class::method`)
    pub fn display_name(&self) -> String {
        match self {
            CallableTarget::Function(function) => function.name().to_owned(),
            CallableTarget::Method { class, method, .. } => format!("{}::{}", class.name(), method),
        }
    }
}

/// Request for a tag collection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagQuery {
    pub tag: String,
    /// Resolve members on iteration instead of up front
    pub lazy: bool,
    /// Leave out the definition requesting the collection
    pub exclude_self: bool,
    /// Identifiers to leave out
    pub exclude: Vec<String>,
    /// Priority function consulted for members without an explicit priority
    pub priority_default_method: Option<String>,
    /// Tag metadata entry used as the collection key instead of the identifier
    pub key_option: Option<String>,
}

impl TagQuery {
    /// Lazy query for `tag`, excluding the requester
    pub fn new(tag: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            lazy: true,
            exclude_self: true,
            exclude: Vec::new(),
            priority_default_method: None,
            key_option: None,
        }
    }

    /// Resolve every member up front
    pub fn eager(mut self) -> Self {
        self.lazy = false;
        self
    }

    /// Resolve members on iteration
    pub fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    /// Keep the requesting definition in the collection
    pub fn include_self(mut self) -> Self {
        self.exclude_self = false;
        self
    }

    /// Leave out `id`
    pub fn excluding(mut self, id: impl Into<String>) -> Self {
        self.exclude.push(id.into());
        self
    }

    /// Priority function used when a member declares none
    pub fn priority_method(mut self, method: impl Into<String>) -> Self {
        self.priority_default_method = Some(method.into());
        self
    }

    /// Key members by the given tag metadata entry
    pub fn key_by(mut self, option: impl Into<String>) -> Self {
        self.key_option = Some(option.into());
        self
    }
}

/// Priority of a tag membership
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TagPriority {
    /// Fall back to the default priority function, then to the minimum
    #[default]
    Unset,
    /// Explicit priority
    Value(i64),
    /// Static priority function on the member's class
    Method(String),
}

/// Membership of a definition in one tag
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagSpec {
    pub priority: TagPriority,
    pub metadata: BTreeMap<String, String>,
}

impl TagSpec {
    /// Membership with an explicit priority
    pub fn priority(priority: i64) -> Self {
        Self {
            priority: TagPriority::Value(priority),
            metadata: BTreeMap::new(),
        }
    }

    /// Membership whose priority comes from a static class function
    pub fn priority_method(method: impl Into<String>) -> Self {
        Self {
            priority: TagPriority::Method(method.into()),
            metadata: BTreeMap::new(),
        }
    }

    /// Attach a metadata entry
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// How one argument is produced
#[derive(Debug, Clone)]
pub enum ArgumentSpec {
    /// A literal value
    Value(AnyValue),
    /// The service registered under an identifier
    Reference(String),
    /// A tag collection
    Tagged(TagQuery),
    /// A closure resolving an identifier when called
    Proxy(String),
    /// The result of invoking a callable
    Callable(CallableTarget),
    /// A nested, unregistered definition built in place
    Inline(Box<Definition>),
    /// A sequence; expanded element-wise into a variadic parameter,
    /// passed as one `Vec<AnyValue>` otherwise
    List(Vec<ArgumentSpec>),
}

impl ArgumentSpec {
    /// A literal value
    pub fn value<T: Injectable>(value: T) -> Self {
        ArgumentSpec::Value(Arc::new(value))
    }

    /// A reference to another service
    pub fn reference(id: impl Into<String>) -> Self {
        ArgumentSpec::Reference(id.into())
    }

    /// A reference to the service registered under `T`'s type name
    pub fn reference_to<T: Injectable>() -> Self {
        ArgumentSpec::Reference(T::type_name_of().to_owned())
    }

    /// A proxy closure for `id`
    pub fn proxy(id: impl Into<String>) -> Self {
        ArgumentSpec::Proxy(id.into())
    }

    /// A tag collection
    pub fn tagged(query: TagQuery) -> Self {
        ArgumentSpec::Tagged(query)
    }

    /// The result of a callable
    pub fn callable(target: CallableTarget) -> Self {
        ArgumentSpec::Callable(target)
    }

    /// A nested definition
    pub fn inline(definition: Definition) -> Self {
        ArgumentSpec::Inline(Box::new(definition))
    }

    /// A sequence of arguments
    pub fn list(items: impl IntoIterator<Item = ArgumentSpec>) -> Self {
        ArgumentSpec::List(items.into_iter().collect())
    }
}

/// Bound arguments in declaration order; binding a key twice replaces it
#[derive(Debug, Clone, Default)]
pub struct BoundArguments {
    entries: Vec<(ArgKey, ArgumentSpec)>,
}

impl BoundArguments {
    /// Empty binding set
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind (or rebind) `key`
    pub fn bind(&mut self, key: impl Into<ArgKey>, spec: ArgumentSpec) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some(entry) => entry.1 = spec,
            None => self.entries.push((key, spec)),
        }
    }

    /// Entry for a parameter, by name first and position second
    pub fn get(&self, position: usize, name: &str) -> Option<&ArgumentSpec> {
        self.find(&ArgKey::Name(name.to_owned()))
            .or_else(|| self.find(&ArgKey::Index(position)))
    }

    fn find(&self, key: &ArgKey) -> Option<&ArgumentSpec> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, spec)| spec)
    }

    /// Iterate in declaration order
    pub fn iter(&self) -> impl Iterator<Item = (&ArgKey, &ArgumentSpec)> {
        self.entries.iter().map(|(k, v)| (k, v))
    }

    /// Number of bound entries
    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Into<ArgKey>> FromIterator<(K, ArgumentSpec)> for BoundArguments {
    fn from_iter<I: IntoIterator<Item = (K, ArgumentSpec)>>(iter: I) -> Self {
        let mut bound = BoundArguments::new();
        for (key, spec) in iter {
            bound.bind(key, spec);
        }
        bound
    }
}

/// A post-construction method call
#[derive(Debug, Clone)]
pub struct SetupCall {
    pub method: String,
    /// Replace the working instance with the call's return value
    pub immutable: bool,
    pub arguments: BoundArguments,
}

/// What a definition produces
#[derive(Debug, Clone)]
pub enum DefinitionKind {
    /// A literal value, returned as-is
    Value { value: AnyValue, type_name: String },
    /// An object built from a class constructor plus setup calls
    Autowire(Arc<ClassDescriptor>),
    /// The result of invoking a callable
    Callable(CallableTarget),
    /// A factory object, itself invoked with the container
    Factory(Arc<ClassDescriptor>),
    /// An alias for another identifier
    Reference(String),
    /// A closure resolving another identifier on call
    Proxy(String),
    /// A tag collection
    Tagged(TagQuery),
}

impl DefinitionKind {
    /// Short label for logging and diagnostics
    pub fn label(&self) -> &'static str {
        match self {
            DefinitionKind::Value { .. } => "value",
            DefinitionKind::Autowire(_) => "autowire",
            DefinitionKind::Callable(_) => "callable",
            DefinitionKind::Factory(_) => "factory",
            DefinitionKind::Reference(_) => "reference",
            DefinitionKind::Proxy(_) => "proxy",
            DefinitionKind::Tagged(_) => "tagged",
        }
    }
}

/// A registered recipe for producing a value.
///
/// # Examples
///
/// ```rust
/// use definition_injector::{ArgumentSpec, ClassDescriptor, Definition, ParamDescriptor, TagSpec};
///
/// struct Handler { name: String }
///
/// let class = ClassDescriptor::of::<Handler, _>(
///     [ParamDescriptor::new("name").builtin("String")],
///     |args| Ok(Handler { name: args.cloned::<String>(0)? }),
/// );
///
/// let definition = Definition::autowire(class)
///     .singleton()
///     .bind("name", ArgumentSpec::value("audit".to_string()))
///     .tag_with("handlers", TagSpec::priority(10));
///
/// assert_eq!(definition.is_singleton(), Some(true));
/// assert!(definition.tags().contains_key("handlers"));
/// ```
#[derive(Debug, Clone)]
pub struct Definition {
    pub(crate) kind: DefinitionKind,
    pub(crate) singleton: Option<bool>,
    pub(crate) arguments: BoundArguments,
    pub(crate) setup: Vec<SetupCall>,
    pub(crate) tags: BTreeMap<String, TagSpec>,
}

impl Definition {
    /// Wrap a kind with no bindings
    pub fn new(kind: DefinitionKind) -> Self {
        Self {
            kind,
            singleton: None,
            arguments: BoundArguments::new(),
            setup: Vec::new(),
            tags: BTreeMap::new(),
        }
    }

    /// A literal value
    pub fn value<T: Injectable>(value: T) -> Self {
        Self::new(DefinitionKind::Value {
            value: Arc::new(value),
            type_name: T::type_name_of().to_owned(),
        })
    }

    /// An autowired object
    pub fn autowire(class: impl Into<Arc<ClassDescriptor>>) -> Self {
        Self::new(DefinitionKind::Autowire(class.into()))
    }

    /// The result of a callable
    pub fn callable(target: CallableTarget) -> Self {
        Self::new(DefinitionKind::Callable(target))
    }

    /// The result of a free function
    pub fn function(function: FunctionDescriptor) -> Self {
        Self::callable(CallableTarget::function(function))
    }

    /// A factory object
    pub fn factory(class: impl Into<Arc<ClassDescriptor>>) -> Self {
        Self::new(DefinitionKind::Factory(class.into()))
    }

    /// An alias for `id`
    pub fn reference(id: impl Into<String>) -> Self {
        Self::new(DefinitionKind::Reference(id.into()))
    }

    /// A proxy closure for `id`
    pub fn proxy(id: impl Into<String>) -> Self {
        Self::new(DefinitionKind::Proxy(id.into()))
    }

    /// A tag collection
    pub fn tagged(query: TagQuery) -> Self {
        Self::new(DefinitionKind::Tagged(query))
    }

    /// Cache the built value for the container's lifetime
    pub fn singleton(mut self) -> Self {
        self.singleton = Some(true);
        self
    }

    /// Build a fresh value on every resolve
    pub fn transient(mut self) -> Self {
        self.singleton = Some(false);
        self
    }

    /// Set (or clear, with `None`) the singleton flag
    pub fn with_singleton(mut self, singleton: Option<bool>) -> Self {
        self.singleton = singleton;
        self
    }

    /// Bind an argument by parameter name
    pub fn bind(mut self, name: impl Into<String>, spec: ArgumentSpec) -> Self {
        self.arguments.bind(ArgKey::Name(name.into()), spec);
        self
    }

    /// Bind an argument by position
    pub fn bind_index(mut self, index: usize, spec: ArgumentSpec) -> Self {
        self.arguments.bind(ArgKey::Index(index), spec);
        self
    }

    /// Append a mutating setup call
    pub fn setup(mut self, method: impl Into<String>, arguments: BoundArguments) -> Self {
        self.setup.push(SetupCall {
            method: method.into(),
            immutable: false,
            arguments,
        });
        self
    }

    /// Append a setup call whose return value replaces the instance
    pub fn setup_immutable(mut self, method: impl Into<String>, arguments: BoundArguments) -> Self {
        self.setup.push(SetupCall {
            method: method.into(),
            immutable: true,
            arguments,
        });
        self
    }

    /// Join a tag with default priority
    pub fn tag(self, name: impl Into<String>) -> Self {
        self.tag_with(name, TagSpec::default())
    }

    /// Join a tag with explicit membership details
    pub fn tag_with(mut self, name: impl Into<String>, spec: TagSpec) -> Self {
        self.tags.insert(name.into(), spec);
        self
    }

    /// What the definition produces
    #[inline]
    pub fn kind(&self) -> &DefinitionKind {
        &self.kind
    }

    /// Explicit singleton flag (`None` inherits the container default)
    #[inline]
    pub fn is_singleton(&self) -> Option<bool> {
        self.singleton
    }

    /// Effective singleton flag
    #[inline]
    pub fn singleton_or(&self, default: bool) -> bool {
        self.singleton.unwrap_or(default)
    }

    /// Bound constructor/callable arguments
    #[inline]
    pub fn arguments(&self) -> &BoundArguments {
        &self.arguments
    }

    /// Setup calls in declaration order
    #[inline]
    pub fn setup_calls(&self) -> &[SetupCall] {
        &self.setup
    }

    /// Tag memberships
    #[inline]
    pub fn tags(&self) -> &BTreeMap<String, TagSpec> {
        &self.tags
    }

    /// Membership in `tag`, if any
    #[inline]
    pub fn tag_spec(&self, tag: &str) -> Option<&TagSpec> {
        self.tags.get(tag)
    }

    /// Class behind an autowire or factory definition
    pub fn class(&self) -> Option<&Arc<ClassDescriptor>> {
        match &self.kind {
            DefinitionKind::Autowire(class) | DefinitionKind::Factory(class) => Some(class),
            _ => None,
        }
    }
}

/// Build a `BoundArguments` from `key => spec` pairs.
///
/// ```rust
/// use definition_injector::{args, ArgumentSpec};
///
/// let bound = args!["name" => ArgumentSpec::value("x".to_string()), 1usize => ArgumentSpec::reference("db")];
/// assert_eq!(bound.len(), 2);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        $crate::BoundArguments::new()
    };
    ($($key:expr => $spec:expr),+ $(,)?) => {{
        let mut bound = $crate::BoundArguments::new();
        $(bound.bind($key, $spec);)+
        bound
    }};
}
