//! Type-erased values flowing through the container
//!
//! Resolved services are shared as `Arc<dyn Any + Send + Sync>`. While an
//! object is still being constructed (setup calls pending) it is owned as a
//! `Box<dyn Any + Send + Sync>` so mutating setup calls get `&mut` access
//! without any interior mutability.

use crate::{DiError, Result};
use std::any::Any;
use std::sync::Arc;

/// A resolved, shareable value
pub type AnyValue = Arc<dyn Any + Send + Sync>;

/// An exclusively owned value still under construction
pub type Instance = Box<dyn Any + Send + Sync>;

/// Marker trait for types that can live in the container.
///
/// This is automatically implemented for all types that are `Send + Sync + 'static`.
/// You never need to implement this manually.
pub trait Injectable: Send + Sync + 'static {
    /// Returns the type name, which is also the default class identifier
    #[inline]
    fn type_name_of() -> &'static str
    where
        Self: Sized,
    {
        std::any::type_name::<Self>()
    }
}

// Blanket implementation - everything that's Send + Sync + 'static is Injectable
impl<T: Send + Sync + 'static> Injectable for T {}

/// Wrap any injectable value for storage.
#[inline]
pub fn any_value<T: Injectable>(value: T) -> AnyValue {
    Arc::new(value)
}

/// Downcast a resolved value, naming `context` in the error.
#[inline]
pub fn downcast_value<T: Injectable>(value: AnyValue, context: &str) -> Result<Arc<T>> {
    value
        .downcast::<T>()
        .map_err(|_| DiError::type_mismatch::<T>(context))
}

/// Resolved argument list handed to constructors, methods and functions.
///
/// Variadic parameters are already expanded, so `len()` can exceed the
/// number of declared parameters.
#[derive(Clone)]
pub struct Arguments {
    target: Arc<str>,
    values: Vec<AnyValue>,
}

impl Arguments {
    /// Create an argument list for `target`
    pub fn new(target: impl Into<Arc<str>>, values: Vec<AnyValue>) -> Self {
        Self {
            target: target.into(),
            values,
        }
    }

    /// Name of the constructor, method or function receiving these arguments
    #[inline]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Number of resolved values
    #[inline]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Raw value at `index`
    pub fn value(&self, index: usize) -> Result<&AnyValue> {
        self.values.get(index).ok_or_else(|| {
            DiError::creation_failed(
                self.target.as_ref(),
                format!("missing argument #{index} ({} provided)", self.values.len()),
            )
        })
    }

    /// Typed value at `index`
    pub fn get<T: Injectable>(&self, index: usize) -> Result<Arc<T>> {
        let value = Arc::clone(self.value(index)?);
        downcast_value(value, &format!("argument #{index} of {}", self.target))
    }

    /// Typed value at `index`, cloned out of the shared handle
    pub fn cloned<T: Injectable + Clone>(&self, index: usize) -> Result<T> {
        self.get::<T>(index).map(|value| (*value).clone())
    }

    /// Every value from `from` onwards, typed (variadic tail)
    pub fn rest<T: Injectable>(&self, from: usize) -> Result<Vec<Arc<T>>> {
        (from..self.values.len()).map(|i| self.get::<T>(i)).collect()
    }

    /// Iterate over the raw values
    pub fn iter(&self) -> impl Iterator<Item = &AnyValue> {
        self.values.iter()
    }

    /// Consume into the raw values
    pub fn into_vec(self) -> Vec<AnyValue> {
        self.values
    }
}

impl std::fmt::Debug for Arguments {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arguments")
            .field("target", &self.target)
            .field("count", &self.values.len())
            .finish()
    }
}

/// Best-effort literal rendering of a type-erased value.
///
/// Only common scalar types are recognised; everything else yields `None`.
pub fn describe_literal(value: &(dyn Any + Send + Sync)) -> Option<String> {
    macro_rules! try_debug {
        ($($ty:ty),+) => {
            $(
                if let Some(v) = value.downcast_ref::<$ty>() {
                    return Some(format!("{v:?}"));
                }
            )+
        };
    }

    try_debug!(
        String, &'static str, bool, char, i8, i16, i32, i64, i128, isize, u8, u16, u32, u64,
        u128, usize, f32, f64, ()
    );
    None
}
