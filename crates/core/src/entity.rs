//! Identity-bearing domain objects.

/// A domain object tracked by identity rather than by value.
///
/// Two entities with the same id are the same thing even when their
/// attributes differ (an adjustment row keeps its identity while later
/// events refresh its fields). Compare with [`crate::ValueObject`].
pub trait Entity {
    /// Newtype id the entity is tracked by.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    fn id(&self) -> &Self::Id;
}
