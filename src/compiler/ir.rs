//! Intermediate representation of a compiled graph
//!
//! Expressions and statements carry the constructor and method handles they
//! need, so a [`CompiledGraph`] never refers back to descriptors or to the
//! definition store.

use crate::descriptor::{Constructor, FunctionBody, MethodBody};
use crate::value::AnyValue;
use ahash::AHashMap;

/// A value-producing expression
#[derive(Clone)]
pub enum Expr {
    /// A literal value
    Literal { value: AnyValue, type_name: String },
    /// Another compiled entry
    Service(String),
    /// Take the object built into a local slot
    Local(usize),
    /// Call a free function
    CallFunction {
        name: String,
        body: FunctionBody,
        args: Vec<Expr>,
    },
    /// Call a value-returning method on a receiver
    CallMethod {
        name: String,
        receiver: Box<Expr>,
        body: MethodBody,
        args: Vec<Expr>,
    },
    /// Invoke a factory object with the container
    InvokeFactory(Box<Expr>),
    /// A sequence passed as one argument
    List(Vec<Expr>),
    /// A tag collection; members are `(key, id)` pairs, already ordered
    Tagged {
        tag: String,
        lazy: bool,
        members: Vec<(String, String)>,
    },
    /// A closure resolving an entry on call
    Proxy(String),
    /// Statements of an inline definition, run where the argument is needed
    Block { stmts: Vec<Stmt>, value: Box<Expr> },
    /// An argument for parameter `position` of `target`.
    ///
    /// Failures are reported against that parameter. When `default` is set,
    /// a recoverable failure yields the default instead.
    Argument {
        value: Box<Expr>,
        target: String,
        parameter: String,
        position: usize,
        default: Option<AnyValue>,
    },
}

impl Expr {
    /// The expression with any argument wrapper removed
    pub fn unwrapped(&self) -> &Expr {
        match self {
            Self::Argument { value, .. } => value.unwrapped(),
            other => other,
        }
    }
}

/// A preparatory statement run before an entry's expression
#[derive(Clone)]
pub enum Stmt {
    /// Construct an object into `slot`
    Construct {
        slot: usize,
        class: String,
        constructor: Constructor,
        args: Vec<Expr>,
    },
    /// Run a setup call on the object in `slot`
    Setup {
        slot: usize,
        target: String,
        immutable: bool,
        body: MethodBody,
        args: Vec<Expr>,
    },
}

/// One compiled identifier
#[derive(Clone)]
pub struct CompiledEntry {
    pub(crate) id: String,
    pub(crate) accessor: String,
    pub(crate) slots: usize,
    pub(crate) stmts: Vec<Stmt>,
    pub(crate) expr: Expr,
    pub(crate) return_type: String,
    pub(crate) singleton: bool,
}

impl CompiledEntry {
    /// Container identifier
    #[inline]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Generated accessor name
    #[inline]
    pub fn accessor(&self) -> &str {
        &self.accessor
    }

    /// Statements, in execution order
    #[inline]
    pub fn stmts(&self) -> &[Stmt] {
        &self.stmts
    }

    /// Final expression
    #[inline]
    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    /// Declared type of the produced value
    #[inline]
    pub fn return_type(&self) -> &str {
        &self.return_type
    }

    /// Whether the value is built once and reused
    #[inline]
    pub fn is_singleton(&self) -> bool {
        self.singleton
    }
}

impl std::fmt::Debug for CompiledEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledEntry")
            .field("id", &self.id)
            .field("accessor", &self.accessor)
            .field("stmts", &self.stmts.len())
            .field("return_type", &self.return_type)
            .field("singleton", &self.singleton)
            .finish()
    }
}

/// Output of a compile pass: one entry per identifier, in compile order
/// (dependencies before their dependents).
#[derive(Clone, Default)]
pub struct CompiledGraph {
    entries: Vec<CompiledEntry>,
    index: AHashMap<String, usize>,
}

impl CompiledGraph {
    pub(crate) fn new(entries: Vec<CompiledEntry>) -> Self {
        let index = entries
            .iter()
            .enumerate()
            .map(|(position, entry)| (entry.id.clone(), position))
            .collect();
        Self { entries, index }
    }

    /// Entry for `id`
    #[inline]
    pub fn get(&self, id: &str) -> Option<&CompiledEntry> {
        self.index.get(id).map(|&position| &self.entries[position])
    }

    /// Position of `id` in [`entries`](Self::entries)
    #[inline]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    /// Check whether `id` was compiled
    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Every entry, in compile order
    #[inline]
    pub fn entries(&self) -> &[CompiledEntry] {
        &self.entries
    }

    /// Number of entries
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

impl std::fmt::Debug for CompiledGraph {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.entries.iter()).finish()
    }
}
