//! Get-or-create-by-key layer on top of an [`InstanceRegistry`].
//!
//! This is the kind of code the registry deliberately leaves to its callers:
//! it decides cache keys and when to construct an instance. It stays correct
//! under concurrent release because the key map is only touched while the
//! registry lock is held (lock order: registry, then key map).

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;
use tally::{InstanceId, InstanceRegistry, Release};
use tracing::debug;

pub struct InstanceCache<K, T> {
    registry: InstanceRegistry<T>,
    by_key: Mutex<HashMap<K, InstanceId<T>>>,
}

impl<K, T> InstanceCache<K, T>
where
    K: Eq + Hash + Clone + std::fmt::Debug,
{
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            registry: InstanceRegistry::new(name),
            by_key: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &InstanceRegistry<T> {
        &self.registry
    }

    /// Returns the live instance for `key` with its count bumped, or builds
    /// one with `create` and starts tracking it. Lookup, creation and the
    /// reference increment all happen inside one registry critical section.
    pub fn get_or_create(&self, key: &K, create: impl FnOnce(&K) -> T) -> InstanceId<T> {
        let mut guard = self.registry.lock();
        let mut by_key = self.by_key.lock();

        if let Some(&id) = by_key.get(key) {
            if guard.contains(id) {
                if let Some(refs) = guard.add_reference(id) {
                    debug!(?key, refs, "reusing cached instance");
                    return id;
                }
            }
        }

        let id = guard.adopt(create(key));
        by_key.insert(key.clone(), id);
        debug!(?key, %id, "created instance");
        id
    }

    /// Drops one reference; forgets the key once its instance is destroyed.
    pub fn release(&self, id: InstanceId<T>) -> Release {
        let mut guard = self.registry.lock();
        let outcome = guard.release_reference(id);
        if outcome.is_destroyed() {
            let mut by_key = self.by_key.lock();
            by_key.retain(|_, cached| *cached != id);
        }
        outcome
    }

    pub fn cached_keys(&self) -> usize {
        let _guard = self.registry.lock();
        self.by_key.lock().len()
    }
}
