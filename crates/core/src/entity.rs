//! Identity for records whose state changes while their id stays put.

/// A record identified by its id rather than by its field values.
///
/// An [`crate::Order`] keeps its id while its stage flags move, so two
/// snapshots of the same order taken at different times still name the same
/// entity.
pub trait Entity {
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    fn id(&self) -> &Self::Id;

    fn same_entity(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}
