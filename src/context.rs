//! Per-call resolution state
//!
//! A `ResolutionContext` is created for every top-level `get` and threaded
//! through every nested resolution of that call. It is intentionally `!Sync`:
//! concurrent callers each get their own context, so cycle detection never
//! sees another thread's work.

use crate::{DiError, Result};
use std::cell::RefCell;

/// Identifiers currently being constructed, in entry order
#[derive(Debug, Default)]
pub struct ResolutionContext {
    resolving: RefCell<Vec<String>>,
}

impl ResolutionContext {
    /// Fresh, empty context
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark `id` as being constructed.
    ///
    /// Fails with `CircularConstruction` (carrying the whole cycle) when `id`
    /// is already on the stack. The returned guard removes `id` again when
    /// dropped, on success and on failure alike.
    pub fn enter(&self, id: &str) -> Result<ResolvingGuard<'_>> {
        let mut resolving = self.resolving.borrow_mut();
        if let Some(start) = resolving.iter().position(|entry| entry == id) {
            let mut chain: Vec<String> = resolving[start..].to_vec();
            chain.push(id.to_owned());
            return Err(DiError::CircularConstruction { chain });
        }
        resolving.push(id.to_owned());
        Ok(ResolvingGuard { context: self })
    }

    /// Whether `id` is currently being constructed
    #[inline]
    pub fn is_resolving(&self, id: &str) -> bool {
        self.resolving.borrow().iter().any(|entry| entry == id)
    }

    /// Current construction stack depth
    #[inline]
    pub fn depth(&self) -> usize {
        self.resolving.borrow().len()
    }

    /// Snapshot of the construction stack
    pub fn stack(&self) -> Vec<String> {
        self.resolving.borrow().clone()
    }
}

/// Pops its identifier off the construction stack on drop
#[must_use = "the identifier leaves the resolving set as soon as the guard is dropped"]
pub struct ResolvingGuard<'a> {
    context: &'a ResolutionContext,
}

impl Drop for ResolvingGuard<'_> {
    fn drop(&mut self) {
        self.context.resolving.borrow_mut().pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_enter_and_leave() {
        let ctx = ResolutionContext::new();
        {
            let _a = ctx.enter("a").unwrap();
            let _b = ctx.enter("b").unwrap();
            assert_eq!(ctx.stack(), vec!["a".to_string(), "b".to_string()]);
            assert!(ctx.is_resolving("a"));
        }
        assert_eq!(ctx.depth(), 0);
    }

    #[test]
    fn test_cycle_reports_from_first_occurrence() {
        let ctx = ResolutionContext::new();
        let _root = ctx.enter("root").unwrap();
        let _a = ctx.enter("a").unwrap();
        let _b = ctx.enter("b").unwrap();

        let err = ctx.enter("a").err().unwrap();
        match err {
            DiError::CircularConstruction { chain } => {
                assert_eq!(chain, vec!["a", "b", "a"]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(ctx.depth(), 3);
    }

    #[test]
    fn test_guard_released_on_error_path() {
        fn failing(ctx: &ResolutionContext) -> Result<()> {
            let _guard = ctx.enter("x")?;
            Err(DiError::not_found("y"))
        }

        let ctx = ResolutionContext::new();
        assert!(failing(&ctx).is_err());
        assert!(!ctx.is_resolving("x"));
    }
}
