use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};

// 64 bits: registry ids are never reused within a process.
static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn next_registry_id() -> u64 {
    NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed)
}

/// Opaque identity of an instance tracked by an [`InstanceRegistry`](crate::InstanceRegistry).
///
/// An id names one slot of one registry at one generation. Once the instance is
/// destroyed the slot's generation moves on, so the old id stays dead even if
/// the slot is reused: releasing it reports [`Release::Untracked`](crate::Release::Untracked).
///
/// Ids are `Copy` and carry no ownership. Holding an id is not holding a
/// reference; the count only changes through the registry.
pub struct InstanceId<T> {
    pub(crate) registry: u64,
    pub(crate) slot: u32,
    pub(crate) generation: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> InstanceId<T> {
    pub(crate) fn new(registry: u64, slot: u32, generation: u32) -> Self {
        Self {
            registry,
            slot,
            generation,
            _marker: PhantomData,
        }
    }

    /// Arena slot of the instance within its registry.
    pub fn slot(self) -> u32 {
        self.slot
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl<T> Clone for InstanceId<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for InstanceId<T> {}

impl<T> PartialEq for InstanceId<T> {
    fn eq(&self, other: &Self) -> bool {
        self.registry == other.registry
            && self.slot == other.slot
            && self.generation == other.generation
    }
}

impl<T> Eq for InstanceId<T> {}

impl<T> Hash for InstanceId<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.registry.hash(state);
        self.slot.hash(state);
        self.generation.hash(state);
    }
}

impl<T> fmt::Debug for InstanceId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "InstanceId(r{}:{}v{})",
            self.registry, self.slot, self.generation
        )
    }
}

impl<T> fmt::Display for InstanceId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}v{}", self.slot, self.generation)
    }
}
