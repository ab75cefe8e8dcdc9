//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Tenants and inventory items are entities: they keep their id while their
/// configuration, quantity or availability changes.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}
