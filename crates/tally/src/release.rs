/// Outcome of [`InstanceRegistry::release_reference`](crate::InstanceRegistry::release_reference).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub enum Release {
    /// The count dropped but is still positive; the instance stays alive.
    Retained(u32),
    /// The count reached zero and the instance was destroyed by this call.
    Destroyed,
    /// The id was absent, unknown to this registry, or already destroyed.
    Untracked,
}

impl Release {
    /// Integer form of the outcome: the count after decrement, `0` when the
    /// instance was destroyed, or `-1` when nothing was tracked.
    pub fn count(self) -> i64 {
        match self {
            Release::Retained(n) => i64::from(n),
            Release::Destroyed => 0,
            Release::Untracked => -1,
        }
    }

    pub fn is_destroyed(self) -> bool {
        matches!(self, Release::Destroyed)
    }

    pub fn is_tracked(self) -> bool {
        !matches!(self, Release::Untracked)
    }
}
