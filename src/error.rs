//! Error types for definition resolution and compilation

use thiserror::Error;

/// Errors that can occur while registering, resolving or compiling definitions
#[derive(Error, Debug, Clone)]
pub enum DiError {
    /// Identifier is unknown and cannot be autowired
    #[error("Service not found: {id}")]
    NotFound { id: String },

    /// A parameter could not be resolved by any strategy
    #[error("Unresolvable dependency: parameter #{position} `{parameter}` of {target}: {message}")]
    UnresolvableDependency {
        target: String,
        parameter: String,
        position: usize,
        message: String,
        #[source]
        source: Option<Box<DiError>>,
    },

    /// Reference chain loops back onto itself
    #[error("Circular reference detected: {}", .chain.join(" -> "))]
    CircularReference { chain: Vec<String> },

    /// Object construction re-entered an identifier still being built
    #[error("Circular construction detected: {}", .chain.join(" -> "))]
    CircularConstruction { chain: Vec<String> },

    /// Incompatible injection metadata on one parameter
    #[error("Conflicting injection metadata on parameter #{position} `{parameter}` of {target}: {kinds}")]
    ConflictingMetadata {
        target: String,
        parameter: String,
        position: usize,
        kinds: String,
    },

    /// Failure surfaced while compiling a definition
    #[error("Failed to compile definition `{id}`: {source}")]
    Compile {
        id: String,
        #[source]
        source: Box<DiError>,
    },

    /// Attempted to register an identifier twice
    #[error("Service already registered: {id}")]
    AlreadyRegistered { id: String },

    /// Container is locked and cannot be modified
    #[error("Container is locked - cannot register new definitions")]
    Locked,

    /// Definition is structurally wrong (unknown method, unknown argument, ...)
    #[error("Invalid definition `{id}`: {reason}")]
    InvalidDefinition { id: String, reason: String },

    /// A value did not have the expected concrete type
    #[error("Type mismatch: expected {expected} for {context}")]
    TypeMismatch {
        expected: &'static str,
        context: String,
    },

    /// User constructor, method or factory failed
    #[error("Failed to create {target}: {reason}")]
    CreationFailed { target: String, reason: String },

    /// A proxy or lazy collection outlived its container
    #[error("Container has been dropped")]
    ContainerDropped,
}

impl DiError {
    /// Create a NotFound error
    #[inline]
    pub fn not_found(id: impl Into<String>) -> Self {
        Self::NotFound { id: id.into() }
    }

    /// Create a CreationFailed error
    #[inline]
    pub fn creation_failed(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CreationFailed {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Create an AlreadyRegistered error
    #[inline]
    pub fn already_registered(id: impl Into<String>) -> Self {
        Self::AlreadyRegistered { id: id.into() }
    }

    /// Create an InvalidDefinition error
    #[inline]
    pub fn invalid(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDefinition {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Create a TypeMismatch error for `T`
    #[inline]
    pub fn type_mismatch<T: 'static>(context: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected: std::any::type_name::<T>(),
            context: context.into(),
        }
    }

    /// Wrap a parameter failure with its position in the enclosing target.
    ///
    /// Cycle and structural errors already carry everything a caller needs
    /// and are returned as-is.
    pub(crate) fn in_parameter(self, target: &str, parameter: &str, position: usize) -> Self {
        match self {
            Self::CircularReference { .. }
            | Self::CircularConstruction { .. }
            | Self::ConflictingMetadata { .. }
            | Self::InvalidDefinition { .. }
            | Self::ContainerDropped => self,
            other => Self::UnresolvableDependency {
                target: target.to_owned(),
                parameter: parameter.to_owned(),
                position,
                message: other.to_string(),
                source: Some(Box::new(other)),
            },
        }
    }

    /// Whether a parameter default may stand in for this failure.
    ///
    /// Missing or failing services qualify; cycles never do.
    pub(crate) fn is_recoverable(&self) -> bool {
        self.cycle().is_none()
            && matches!(
                self,
                Self::NotFound { .. }
                    | Self::UnresolvableDependency { .. }
                    | Self::CreationFailed { .. }
                    | Self::TypeMismatch { .. }
            )
    }

    /// Wrap a failure with the identifier being compiled (only once).
    pub(crate) fn in_compile(self, id: &str) -> Self {
        match self {
            Self::Compile { .. } => self,
            other => Self::Compile {
                id: id.to_owned(),
                source: Box::new(other),
            },
        }
    }

    /// Follow `source` links down to the innermost error.
    pub fn root_cause(&self) -> &DiError {
        match self {
            Self::UnresolvableDependency {
                source: Some(inner),
                ..
            }
            | Self::Compile { source: inner, .. } => inner.root_cause(),
            _ => self,
        }
    }

    /// The cycle carried by a circular reference/construction error, if any
    pub fn cycle(&self) -> Option<&[String]> {
        match self.root_cause() {
            Self::CircularReference { chain } | Self::CircularConstruction { chain } => {
                Some(chain.as_slice())
            }
            _ => None,
        }
    }
}

/// Result type alias for DI operations
pub type Result<T> = std::result::Result<T, DiError>;
