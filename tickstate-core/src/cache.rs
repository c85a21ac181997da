//! Auto-cache of reusable state instances.
//!
//! Each track owns one cache. Entries keep both the erased [`StateRef`] the
//! protocol works with and an `Rc<dyn Any>` of the same allocation, so the
//! owner can get the concrete `Rc<S>` back.

use crate::state::{State, StateRef};
use std::any::Any;
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

struct CacheEntry<T: 'static> {
    state: StateRef<T>,
    concrete: Rc<dyn Any>,
}

/// Lazily populated pool: one instance per key.
pub(crate) struct StateCache<K, T: 'static> {
    entries: HashMap<K, CacheEntry<T>>,
}

impl<K: Eq + Hash, T: 'static> Default for StateCache<K, T> {
    fn default() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }
}

impl<K: Eq + Hash, T: 'static> StateCache<K, T> {
    /// Returns the cached instance for `key`, constructing it with `make` on
    /// first use. The flag is true when the instance was just created.
    pub(crate) fn get_or_create<S, F>(&mut self, key: K, make: F) -> (StateRef<T>, bool)
    where
        S: State<T>,
        F: FnOnce() -> S,
    {
        if let Some(entry) = self.entries.get(&key) {
            return (entry.state.clone(), false);
        }
        let instance = Rc::new(make());
        let state: StateRef<T> = instance.clone();
        self.entries.insert(
            key,
            CacheEntry {
                state: state.clone(),
                concrete: instance,
            },
        );
        (state, true)
    }

    /// Places a caller-built instance in the cache, replacing any previous one.
    pub(crate) fn insert<S: State<T>>(&mut self, key: K, instance: Rc<S>) -> StateRef<T> {
        let state: StateRef<T> = instance.clone();
        self.entries.insert(
            key,
            CacheEntry {
                state: state.clone(),
                concrete: instance,
            },
        );
        state
    }

    pub(crate) fn get<S: State<T>>(&self, key: &K) -> Option<Rc<S>> {
        self.entries
            .get(key)
            .and_then(|entry| entry.concrete.clone().downcast::<S>().ok())
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
