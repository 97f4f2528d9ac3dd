use botforge_core::OwnedEntity;

use crate::{Resource, ResourceType};

/// A domain entity that is mirrored as a protected resource.
///
/// Implemented by each owned entity type so lifecycle code can stay generic
/// while the scope set and display-name template come from the type tag.
pub trait ProtectedEntity: OwnedEntity {
    const RESOURCE_TYPE: ResourceType;

    /// Resource id in the authorization service (the store-generated id).
    fn resource_id(&self) -> String {
        self.id().to_string()
    }

    /// Canonical mirrored resource for this entity.
    fn to_resource(&self) -> Resource {
        Resource::for_entity(
            Self::RESOURCE_TYPE,
            self.resource_id(),
            self.name(),
            self.owner_id(),
            self.is_public(),
        )
    }
}
