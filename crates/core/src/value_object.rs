//! Attribute-compared domain values.

/// Marker for types whose equality is attribute equality.
///
/// Value objects are **immutable** and **compared by value**. Two value
/// objects with the same attribute values are the same value; identity plays
/// no part. To "modify" one, construct a new one.
///
/// Contrast with [`crate::Entity`], where two instances with the same id are
/// the same thing regardless of attribute values.
///
/// The supertraits keep value objects cheap to copy, comparable, and
/// debuggable:
///
/// ```ignore
/// #[derive(Debug, Clone, PartialEq, Eq)]
/// struct CountNumber(String);
///
/// impl ValueObject for CountNumber {}
/// ```
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
