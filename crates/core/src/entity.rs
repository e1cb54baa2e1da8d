//! Entity traits: identity + continuity across state changes.

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// Mutable entities carry a version number used as an optimistic-concurrency
/// token: updates compare-and-swap on it and surface a conflict on mismatch.
pub trait Versioned {
    fn version(&self) -> u64;
}
