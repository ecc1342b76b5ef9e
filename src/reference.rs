//! Reference chain resolution
//!
//! Reference definitions are aliases: they are followed, never built. The
//! chain walk records every identifier it visits and fails as soon as one
//! repeats.

use crate::definition::DefinitionKind;
use crate::storage::DefinitionStore;
use crate::{DiError, Result};
use ahash::AHashMap;

#[cfg(feature = "logging")]
use tracing::trace;

/// Follows reference chains, remembering every chain it has already walked.
///
/// The live container uses a fresh resolver per call; the compiler keeps one
/// for the whole pass so a chain shared by several roots is walked once and
/// cycles spanning independently compiled roots are still caught.
#[derive(Debug, Default)]
pub struct ReferenceResolver {
    resolved: AHashMap<String, String>,
}

impl ReferenceResolver {
    /// Resolver with no remembered chains
    pub fn new() -> Self {
        Self::default()
    }

    /// Final (non-reference) identifier behind `id`.
    ///
    /// An identifier that is not registered terminates the chain; whether it
    /// can be built is decided by the caller.
    pub fn deref(&mut self, store: &DefinitionStore, id: &str) -> Result<String> {
        if let Some(target) = self.resolved.get(id) {
            return Ok(target.clone());
        }

        let mut chain: Vec<String> = Vec::new();
        let mut current = id.to_owned();

        let target = loop {
            if let Some(known) = self.resolved.get(&current) {
                break known.clone();
            }
            if chain.contains(&current) {
                chain.push(current);
                return Err(DiError::CircularReference { chain });
            }

            let next = store.get(&current).and_then(|definition| match definition.kind() {
                DefinitionKind::Reference(next) => Some(next.clone()),
                _ => None,
            });

            match next {
                Some(next) => {
                    chain.push(current);
                    current = next;
                }
                None => break current,
            }
        };

        #[cfg(feature = "logging")]
        if !chain.is_empty() {
            trace!(
                target: "definition_injector",
                service = id,
                resolved = target.as_str(),
                hops = chain.len(),
                "Followed reference chain"
            );
        }

        for visited in chain {
            self.resolved.insert(visited, target.clone());
        }
        Ok(target)
    }

    /// Whether `id` was already resolved by this resolver
    #[inline]
    pub fn is_known(&self, id: &str) -> bool {
        self.resolved.contains_key(id)
    }
}

/// One-shot reference resolution with no remembered state.
#[inline]
pub fn deref(store: &DefinitionStore, id: &str) -> Result<String> {
    ReferenceResolver::new().deref(store, id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::Definition;

    fn store_with(entries: &[(&str, Definition)]) -> DefinitionStore {
        let store = DefinitionStore::new();
        for (id, definition) in entries {
            store.insert(id, definition.clone()).unwrap();
        }
        store
    }

    #[test]
    fn test_non_reference_is_its_own_target() {
        let store = store_with(&[("a", Definition::value(1u8))]);
        assert_eq!(deref(&store, "a").unwrap(), "a");
        assert_eq!(deref(&store, "unknown").unwrap(), "unknown");
    }

    #[test]
    fn test_follows_chain() {
        let store = store_with(&[
            ("a", Definition::reference("b")),
            ("b", Definition::reference("c")),
            ("c", Definition::value(1u8)),
        ]);
        assert_eq!(deref(&store, "a").unwrap(), "c");
    }

    #[test]
    fn test_cycle_reports_chain_in_visit_order() {
        let store = store_with(&[
            ("a", Definition::reference("b")),
            ("b", Definition::reference("c")),
            ("c", Definition::reference("a")),
        ]);
        let err = deref(&store, "a").unwrap_err();
        match err {
            DiError::CircularReference { chain } => assert_eq!(chain, vec!["a", "b", "c", "a"]),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_self_reference() {
        let store = store_with(&[("a", Definition::reference("a"))]);
        let err = deref(&store, "a").unwrap_err();
        assert_eq!(err.cycle().unwrap(), ["a".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_persistent_resolver_reuses_chains() {
        let store = store_with(&[
            ("x", Definition::reference("shared")),
            ("y", Definition::reference("shared")),
            ("shared", Definition::reference("final")),
            ("final", Definition::value(1u8)),
        ]);
        let mut resolver = ReferenceResolver::new();
        assert_eq!(resolver.deref(&store, "x").unwrap(), "final");
        assert!(resolver.is_known("shared"));
        assert_eq!(resolver.deref(&store, "y").unwrap(), "final");
    }
}
