//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects are **immutable** and **compared by value**: a [`crate::User`]
/// with the same name and address is the same customer as far as shipping is
/// concerned, while two [`crate::Order`]s are always distinct entities.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {}
