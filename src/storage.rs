//! Definition store
//!
//! Uses DashMap for lock-free concurrent reads. Registration is append-only:
//! an identifier can be registered exactly once, and every entry remembers
//! its registration sequence so iteration (and tag tie-breaking) follows
//! declaration order.

use crate::definition::Definition;
use crate::{DiError, Result};
use ahash::RandomState;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// A registered definition plus its registration sequence number
#[derive(Debug, Clone)]
pub(crate) struct StoredDefinition {
    pub(crate) seq: u64,
    pub(crate) definition: Arc<Definition>,
}

/// Thread-safe, append-only definition storage
pub struct DefinitionStore {
    /// Map from identifier to definition
    definitions: DashMap<String, StoredDefinition, RandomState>,
    /// Next registration sequence number
    next_seq: AtomicU64,
}

impl DefinitionStore {
    /// Create new empty storage with optimized shard count.
    ///
    /// Default DashMap uses num_cpus * 4 shards which is overkill for
    /// typical containers with a few hundred definitions.
    #[inline]
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create with pre-allocated capacity and shards scaled to it.
    #[inline]
    pub fn with_capacity(capacity: usize) -> Self {
        let shard_amount = if capacity <= 16 {
            8
        } else if capacity <= 64 {
            16
        } else {
            32
        };
        Self {
            definitions: DashMap::with_capacity_and_hasher_and_shard_amount(
                capacity,
                RandomState::new(),
                shard_amount,
            ),
            next_seq: AtomicU64::new(0),
        }
    }

    /// Register a definition; identifiers are never overwritten
    pub fn insert(&self, id: &str, definition: Definition) -> Result<()> {
        if id.is_empty() {
            return Err(DiError::invalid(id, "identifier must not be empty"));
        }

        match self.definitions.entry(id.to_owned()) {
            Entry::Occupied(_) => Err(DiError::already_registered(id)),
            Entry::Vacant(slot) => {
                slot.insert(StoredDefinition {
                    seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
                    definition: Arc::new(definition),
                });
                Ok(())
            }
        }
    }

    /// Check if an identifier is registered
    #[inline]
    pub fn contains(&self, id: &str) -> bool {
        self.definitions.contains_key(id)
    }

    /// Look up a definition
    #[inline]
    pub fn get(&self, id: &str) -> Option<Arc<Definition>> {
        self.definitions
            .get(id)
            .map(|entry| Arc::clone(&entry.definition))
    }

    /// Every definition, in registration order
    pub(crate) fn ordered(&self) -> Vec<(String, StoredDefinition)> {
        let mut all: Vec<(String, StoredDefinition)> = self
            .definitions
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        all.sort_by_key(|(_, stored)| stored.seq);
        all
    }

    /// Definitions that are members of `tag`, in registration order
    pub(crate) fn tagged(&self, tag: &str) -> Vec<(String, StoredDefinition)> {
        let mut members: Vec<(String, StoredDefinition)> = self
            .definitions
            .iter()
            .filter(|entry| entry.definition.tags().contains_key(tag))
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();
        members.sort_by_key(|(_, stored)| stored.seq);
        members
    }

    /// Registered identifiers, in registration order
    pub fn ids(&self) -> Vec<String> {
        self.ordered().into_iter().map(|(id, _)| id).collect()
    }

    /// Get number of registered definitions
    #[inline]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    /// Check if empty
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

impl Default for DefinitionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DefinitionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionStore")
            .field("count", &self.len())
            .finish()
    }
}
