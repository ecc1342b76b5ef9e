//! Singleton cache
//!
//! One `OnceCell` slot per identifier. Concurrent first builds of the same
//! identifier are serialized by the cell, so a singleton is built exactly
//! once; reads of an already-built singleton are a map lookup plus an
//! atomic load.
//!
//! A thread only blocks on a cell after checking the waits-for table kept by
//! [`BuildTracker`]: if the thread building that cell is itself (directly or
//! through other threads) waiting on a cell this thread is building, the
//! request fails with `CircularConstruction` instead of deadlocking.

use crate::value::AnyValue;
use crate::{DiError, Result};
use ahash::{AHashMap, RandomState};
use dashmap::DashMap;
use once_cell::sync::OnceCell;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, ThreadId};

#[cfg(feature = "logging")]
use tracing::{debug, trace};

type Slot = Arc<OnceCell<AnyValue>>;

#[derive(Default)]
struct Builds {
    /// Identifier -> thread running its initializer
    owners: AHashMap<String, ThreadId>,
    /// Thread -> identifier it is about to block on
    waiting: AHashMap<ThreadId, String>,
}

impl Builds {
    /// The cross-thread cycle closed by `me` waiting on `id`, if any.
    ///
    /// Follows owner -> awaited identifier -> owner until it reaches a cell
    /// built by `me` or a thread that is not waiting.
    fn cycle_through<'a>(&'a self, id: &'a str, me: ThreadId) -> Option<Vec<String>> {
        let mut path = vec![id.to_owned()];
        let mut current = id;
        loop {
            let owner = self.owners.get(current)?;
            if *owner == me {
                let mut chain = Vec::with_capacity(path.len() + 1);
                chain.push(current.to_owned());
                chain.extend(path);
                return Some(chain);
            }
            let next = self.waiting.get(owner)?;
            if path.len() > self.owners.len() {
                return None;
            }
            path.push(next.clone());
            current = next.as_str();
        }
    }
}

/// Waits-for table guarding blocking singleton initialization
#[derive(Default)]
pub(crate) struct BuildTracker {
    builds: Mutex<Builds>,
}

/// Clears an identifier's owner when its initializer finishes or unwinds
struct Building<'t> {
    tracker: &'t BuildTracker,
    id: &'t str,
}

impl Drop for Building<'_> {
    fn drop(&mut self) {
        self.tracker.lock().owners.remove(self.id);
    }
}

impl BuildTracker {
    fn lock(&self) -> MutexGuard<'_, Builds> {
        self.builds.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Initialize `cell` for `id` with `init`, or wait for the thread that is.
    pub(crate) fn init<F>(&self, cell: &OnceCell<AnyValue>, id: &str, init: F) -> Result<AnyValue>
    where
        F: FnOnce() -> Result<AnyValue>,
    {
        let me = thread::current().id();
        {
            let mut builds = self.lock();
            if let Some(chain) = builds.cycle_through(id, me) {
                #[cfg(feature = "logging")]
                debug!(
                    target: "definition_injector",
                    service = id,
                    chain = chain.join(" -> ").as_str(),
                    "Singleton is being built by a thread waiting on this one"
                );
                return Err(DiError::CircularConstruction { chain });
            }
            builds.waiting.insert(me, id.to_owned());
        }

        let result = cell
            .get_or_try_init(|| {
                {
                    let mut builds = self.lock();
                    builds.waiting.remove(&me);
                    builds.owners.insert(id.to_owned(), me);
                }
                let _building = Building { tracker: self, id };
                init()
            })
            .map(Arc::clone);

        self.lock().waiting.remove(&me);
        result
    }
}

/// Lifetime-long cache of built singleton values
pub struct SingletonCache {
    slots: DashMap<String, Slot, RandomState>,
    builds: BuildTracker,
}

impl SingletonCache {
    /// Create an empty cache
    #[inline]
    pub fn new() -> Self {
        Self {
            slots: DashMap::with_capacity_and_hasher_and_shard_amount(0, RandomState::new(), 8),
            builds: BuildTracker::default(),
        }
    }

    /// Cached value for `id`, if it was built already
    #[inline]
    pub fn get(&self, id: &str) -> Option<AnyValue> {
        self.slots
            .get(id)
            .and_then(|slot| slot.get().map(Arc::clone))
    }

    /// Return the cached value, building it with `init` on first access.
    ///
    /// A failed build caches nothing; the next call retries. The map shard
    /// is released before `init` runs so nested resolutions never contend on
    /// it.
    pub fn get_or_try_init<F>(&self, id: &str, init: F) -> Result<AnyValue>
    where
        F: FnOnce() -> Result<AnyValue>,
    {
        let slot: Slot = Arc::clone(&self.slots.entry(id.to_owned()).or_default());

        if let Some(value) = slot.get() {
            #[cfg(feature = "logging")]
            trace!(
                target: "definition_injector",
                service = id,
                "Singleton already initialized, returning cached instance"
            );
            return Ok(Arc::clone(value));
        }

        self.builds.init(&slot, id, || {
            #[cfg(feature = "logging")]
            debug!(
                target: "definition_injector",
                service = id,
                "Singleton initializing on first access"
            );

            init()
        })
    }

    /// Check whether `id` has been built
    #[inline]
    pub fn is_built(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Number of built singletons
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.get().is_some()).count()
    }

    /// Check if nothing has been built yet
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SingletonCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SingletonCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonCache")
            .field("built", &self.len())
            .finish()
    }
}
