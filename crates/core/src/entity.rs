//! Entity traits: identity + ownership.

use crate::id::OwnerId;

/// Entity marker + minimal interface.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug + core::fmt::Display;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

/// An entity that belongs to a single owner and may be shared publicly.
///
/// These four properties (`id`, `name`, `owner_id`, `is_public`) are everything
/// the authorization layer needs to mirror the entity as a protected resource.
pub trait OwnedEntity: Entity {
    fn name(&self) -> &str;

    fn owner_id(&self) -> &OwnerId;

    fn is_public(&self) -> bool;
}
