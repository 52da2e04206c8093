//! Plain data describing the state of a tally instance registry.
//!
//! These types carry no behavior of their own. They are what a registry hands
//! out when asked to describe itself, and they derive [`Facet`] so any facet
//! format crate can serialize them for dashboards or test fixtures.

use facet::Facet;
use std::error::Error;
use std::fmt;

/// Point-in-time view of one registry's table.
#[derive(Facet, Debug, Clone, PartialEq, Eq)]
pub struct RegistrySnapshot {
    /// Human-facing registry name given at construction.
    pub name: String,
    /// Rust type name of the tracked instances.
    pub type_name: String,
    /// Every tracked instance, ordered by slot.
    pub instances: Vec<TrackedInstanceSnapshot>,
}

impl RegistrySnapshot {
    /// Sum of the reference counts of all tracked instances.
    pub fn total_references(&self) -> u64 {
        self.instances.iter().map(|i| u64::from(i.ref_count)).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

/// One row of the registry table.
#[derive(Facet, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackedInstanceSnapshot {
    /// Arena slot holding the instance.
    pub slot: u32,
    /// Generation of the slot; bumped every time the slot is freed.
    pub generation: u32,
    /// Current reference count. Always at least 1.
    pub ref_count: u32,
}

/// Failure of a checked reference-count operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefCountError {
    /// The id does not name an instance currently tracked by this registry.
    Untracked { slot: u32, generation: u32 },
    /// The count is already at its maximum.
    Overflow { slot: u32 },
}

impl fmt::Display for RefCountError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Untracked { slot, generation } => {
                write!(f, "instance {slot}v{generation} is not tracked")
            }
            Self::Overflow { slot } => {
                write!(f, "reference count of instance in slot {slot} would overflow")
            }
        }
    }
}

impl Error for RefCountError {}
