use std::any::type_name;
use std::fmt;
use std::mem;

use parking_lot::{Mutex, MutexGuard};
use tally_types::{RefCountError, RegistrySnapshot, TrackedInstanceSnapshot};
use tracing::{debug, error, trace, warn};

use crate::id::{next_registry_id, InstanceId};
use crate::release::Release;
use crate::slab::Slab;

/// Table of instances and their reference counts, guarded by one lock.
///
/// Every read and write of the table happens under the registry's
/// `parking_lot::Mutex`. The convenience methods on this type each take the
/// lock for the duration of one operation; [`lock`](Self::lock) hands out the
/// same lock so several operations can run as one critical section.
///
/// The registry is not `Clone`. Share it by reference or behind an `Arc`.
pub struct InstanceRegistry<T> {
    id: u64,
    name: String,
    table: Mutex<Slab<T>>,
}

impl<T> InstanceRegistry<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_capacity(name, 0)
    }

    pub fn with_capacity(name: impl Into<String>, capacity: usize) -> Self {
        Self {
            id: next_registry_id(),
            name: name.into(),
            table: Mutex::new(Slab::with_capacity(capacity)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Acquires the registry lock.
    ///
    /// The returned guard is the critical section: the lock is released when
    /// it drops. Use it to make a caller-side lookup and the following
    /// [`RegistryGuard::add_reference`] or [`RegistryGuard::adopt`] atomic.
    ///
    /// The lock is not reentrant. Calling any method of this registry other
    /// than through the guard, on the thread holding the guard, deadlocks.
    pub fn lock(&self) -> RegistryGuard<'_, T> {
        RegistryGuard {
            registry: self,
            table: self.table.lock(),
        }
    }

    pub fn try_lock(&self) -> Option<RegistryGuard<'_, T>> {
        self.table.try_lock().map(|table| RegistryGuard {
            registry: self,
            table,
        })
    }

    /// Starts tracking `value` with a reference count of 1.
    ///
    /// From here on the registry owns `value` and is the only party that may
    /// destroy it.
    ///
    /// # Panics
    ///
    /// Panics if every slot index of the registry is in use or retired. See
    /// [`try_adopt`](Self::try_adopt).
    pub fn adopt(&self, value: T) -> InstanceId<T> {
        self.lock().adopt(value)
    }

    /// Like [`adopt`](Self::adopt), but hands `value` back when the registry
    /// has no slot left for it.
    pub fn try_adopt(&self, value: T) -> Result<InstanceId<T>, T> {
        self.lock().try_adopt(value)
    }

    /// Adds one reference to a tracked instance and returns the new count.
    ///
    /// `id` must name a live instance of this registry. Anything else is a
    /// caller bug: debug builds panic, release builds log an error and
    /// return `None` without touching the table.
    pub fn add_reference(&self, id: InstanceId<T>) -> Option<u32> {
        self.lock().add_reference(id)
    }

    /// Like [`add_reference`](Self::add_reference), but reports misuse as an error.
    pub fn try_add_reference(&self, id: InstanceId<T>) -> Result<u32, RefCountError> {
        self.lock().try_add_reference(id)
    }

    /// Drops one reference and destroys the instance when none remain.
    ///
    /// Passing `None` returns [`Release::Untracked`] without taking the lock.
    pub fn release_reference(&self, id: impl Into<Option<InstanceId<T>>>) -> Release {
        let Some(id) = id.into() else {
            return Release::Untracked;
        };
        self.lock().release_reference(id)
    }

    pub fn ref_count(&self, id: InstanceId<T>) -> Option<u32> {
        self.lock().ref_count(id)
    }

    pub fn contains(&self, id: InstanceId<T>) -> bool {
        self.lock().contains(id)
    }

    /// Runs `f` on a tracked instance with the lock held.
    pub fn with<R>(&self, id: InstanceId<T>, f: impl FnOnce(&T) -> R) -> Option<R> {
        self.lock().get(id).map(f)
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        self.lock().snapshot()
    }
}

impl<T> Drop for InstanceRegistry<T> {
    fn drop(&mut self) {
        for (slot, entry) in self.table.get_mut().drain() {
            warn!(
                registry = self.name.as_str(),
                ty = type_name::<T>(),
                slot,
                generation = entry.generation,
                refs = entry.refs,
                "reference not released before registry teardown, leaking instance"
            );
            mem::forget(entry.value);
        }
    }
}

impl<T> fmt::Debug for InstanceRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut s = f.debug_struct("InstanceRegistry");
        s.field("name", &self.name).field("type", &type_name::<T>());
        match self.table.try_lock() {
            Some(table) => s.field("len", &table.len()),
            None => s.field("len", &format_args!("<locked>")),
        };
        s.finish()
    }
}

/// Scoped hold on a registry's lock.
///
/// Obtained from [`InstanceRegistry::lock`]. All operations here run inside
/// the same critical section and never re-acquire the lock.
pub struct RegistryGuard<'a, T> {
    registry: &'a InstanceRegistry<T>,
    table: MutexGuard<'a, Slab<T>>,
}

impl<'a, T> RegistryGuard<'a, T> {
    fn owns(&self, id: InstanceId<T>) -> bool {
        id.registry == self.registry.id
    }

    fn id_for(&self, slot: u32, generation: u32) -> InstanceId<T> {
        InstanceId::new(self.registry.id, slot, generation)
    }

    pub fn adopt(&mut self, value: T) -> InstanceId<T> {
        match self.try_adopt(value) {
            Ok(id) => id,
            Err(_) => panic!(
                "adopt<{}> on registry {:?}: slot space exhausted",
                type_name::<T>(),
                self.registry.name
            ),
        }
    }

    pub fn try_adopt(&mut self, value: T) -> Result<InstanceId<T>, T> {
        let (slot, generation) = match self.table.insert(value) {
            Ok(placed) => placed,
            Err(value) => {
                error!(
                    registry = self.registry.name.as_str(),
                    ty = type_name::<T>(),
                    len = self.table.len(),
                    "no free slot, refusing to adopt instance"
                );
                return Err(value);
            }
        };
        debug!(
            registry = self.registry.name.as_str(),
            ty = type_name::<T>(),
            slot,
            generation,
            "instance adopted"
        );
        Ok(self.id_for(slot, generation))
    }

    pub fn add_reference(&mut self, id: InstanceId<T>) -> Option<u32> {
        match self.try_add_reference(id) {
            Ok(refs) => Some(refs),
            Err(err) => {
                if cfg!(debug_assertions) {
                    panic!(
                        "add_reference<{}> on registry {:?}: {err}",
                        type_name::<T>(),
                        self.registry.name
                    );
                }
                error!(
                    registry = self.registry.name.as_str(),
                    ty = type_name::<T>(),
                    %err,
                    "add_reference precondition violated"
                );
                None
            }
        }
    }

    pub fn try_add_reference(&mut self, id: InstanceId<T>) -> Result<u32, RefCountError> {
        let untracked = RefCountError::Untracked {
            slot: id.slot,
            generation: id.generation,
        };
        if !self.owns(id) {
            return Err(untracked);
        }
        let entry = self
            .table
            .get_mut(id.slot, id.generation)
            .ok_or(untracked)?;
        entry.refs = entry
            .refs
            .checked_add(1)
            .ok_or(RefCountError::Overflow { slot: id.slot })?;
        let refs = entry.refs;
        trace!(
            registry = self.registry.name.as_str(),
            slot = id.slot,
            refs,
            "reference added"
        );
        Ok(refs)
    }

    /// Drops one reference. On the zero-crossing release the instance is
    /// destroyed before this returns, while the lock is still held.
    ///
    /// A tracked value's `Drop` must not call back into this registry.
    pub fn release_reference(&mut self, id: impl Into<Option<InstanceId<T>>>) -> Release {
        let Some(id) = id.into() else {
            return Release::Untracked;
        };
        if !self.owns(id) {
            return Release::Untracked;
        }
        let Some(entry) = self.table.get_mut(id.slot, id.generation) else {
            return Release::Untracked;
        };

        entry.refs -= 1;
        let refs = entry.refs;
        if refs > 0 {
            trace!(
                registry = self.registry.name.as_str(),
                slot = id.slot,
                refs,
                "reference released"
            );
            return Release::Retained(refs);
        }

        let Some(value) = self.table.remove(id.slot, id.generation) else {
            return Release::Untracked;
        };
        debug!(
            registry = self.registry.name.as_str(),
            ty = type_name::<T>(),
            slot = id.slot,
            generation = id.generation,
            "last reference released, destroying instance"
        );
        drop(value);
        Release::Destroyed
    }

    pub fn ref_count(&self, id: InstanceId<T>) -> Option<u32> {
        if !self.owns(id) {
            return None;
        }
        self.table.get(id.slot, id.generation).map(|e| e.refs)
    }

    pub fn contains(&self, id: InstanceId<T>) -> bool {
        self.ref_count(id).is_some()
    }

    pub fn get(&self, id: InstanceId<T>) -> Option<&T> {
        if !self.owns(id) {
            return None;
        }
        self.table.get(id.slot, id.generation).map(|e| &e.value)
    }

    pub fn get_mut(&mut self, id: InstanceId<T>) -> Option<&mut T> {
        if !self.owns(id) {
            return None;
        }
        self.table
            .get_mut(id.slot, id.generation)
            .map(|e| &mut e.value)
    }

    /// First tracked instance, by slot order, matching `predicate`.
    pub fn find(&self, mut predicate: impl FnMut(&T) -> bool) -> Option<InstanceId<T>> {
        self.table
            .iter()
            .find(|(_, entry)| predicate(&entry.value))
            .map(|(slot, entry)| self.id_for(slot, entry.generation))
    }

    pub fn ids(&self) -> impl Iterator<Item = InstanceId<T>> + '_ {
        self.table
            .iter()
            .map(move |(slot, entry)| self.id_for(slot, entry.generation))
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.len() == 0
    }

    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            name: self.registry.name.clone(),
            type_name: type_name::<T>().to_owned(),
            instances: self
                .table
                .iter()
                .map(|(slot, entry)| TrackedInstanceSnapshot {
                    slot,
                    generation: entry.generation,
                    ref_count: entry.refs,
                })
                .collect(),
        }
    }
}

impl<T> fmt::Debug for RegistryGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryGuard")
            .field("name", &self.registry.name)
            .field("len", &self.table.len())
            .finish()
    }
}
