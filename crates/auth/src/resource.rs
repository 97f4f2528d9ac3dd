//! External representation of a protected resource.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use botforge_core::OwnerId;

use crate::{ResourceType, Scope, ScopeRegistry};

pub const ATTR_TYPE: &str = "type";
pub const ATTR_OWNER_ID: &str = "ownerId";
pub const ATTR_PUBLIC: &str = "public";

/// Multi-valued resource attributes (`map<string, []string>` on the wire).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceAttributes(BTreeMap<String, Vec<String>>);

impl ResourceAttributes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attributes of a domain-backed resource: `{type, ownerId, public?}`.
    pub fn for_entity(resource_type: ResourceType, owner_id: &OwnerId, public: bool) -> Self {
        let mut attrs = Self::new();
        attrs.set(ATTR_TYPE, resource_type.as_str());
        attrs.set(ATTR_OWNER_ID, owner_id.as_str());
        if resource_type.is_visibility_aware() {
            attrs.set(ATTR_PUBLIC, if public { "true" } else { "false" });
        }
        attrs
    }

    /// Attributes of a group resource: `{type: "group"}` plus the owner if one is known.
    pub fn for_group(owner_id: Option<&str>) -> Self {
        let mut attrs = Self::new();
        attrs.set(ATTR_TYPE, ResourceType::Group.as_str());
        if let Some(owner) = owner_id {
            attrs.set(ATTR_OWNER_ID, owner);
        }
        attrs
    }

    /// Replace all values of `key` with a single value.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), vec![value.into()]);
    }

    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.0.get(key).map(Vec::as_slice)
    }

    /// First value of `key`, if any.
    pub fn first(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn owner_id(&self) -> Option<&str> {
        self.first(ATTR_OWNER_ID)
    }

    pub fn resource_type(&self) -> Option<ResourceType> {
        self.first(ATTR_TYPE).and_then(|t| t.parse().ok())
    }

    pub fn is_public(&self) -> Option<bool> {
        self.first(ATTR_PUBLIC).map(|v| v == "true")
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }
}

/// A protected resource as the authorization service stores it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: String,
    pub name: String,
    pub scopes: Vec<Scope>,
    pub attributes: ResourceAttributes,
}

impl Resource {
    /// Canonical resource for a domain entity: templated name, full scope set
    /// and `{type, ownerId, public?}` attributes.
    pub fn for_entity(
        resource_type: ResourceType,
        id: impl Into<String>,
        name: &str,
        owner_id: &OwnerId,
        public: bool,
    ) -> Self {
        Self {
            id: id.into(),
            name: resource_type.display_name(name),
            scopes: ScopeRegistry::scopes_for(resource_type).to_vec(),
            attributes: ResourceAttributes::for_entity(resource_type, owner_id, public),
        }
    }

    /// Canonical resource for a group.
    pub fn for_group(id: impl Into<String>, name: impl Into<String>, owner_id: Option<&str>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            scopes: ScopeRegistry::scopes_for(ResourceType::Group).to_vec(),
            attributes: ResourceAttributes::for_group(owner_id),
        }
    }

    pub fn has_scope(&self, scope: &str) -> bool {
        self.scopes.iter().any(|s| s == scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> OwnerId {
        OwnerId::new("user-1").unwrap()
    }

    #[test]
    fn bot_resource_carries_owner_and_visibility() {
        let r = Resource::for_entity(ResourceType::Bot, "b-1", "alpha", &owner(), true);
        assert_eq!(r.name, "Bot: alpha");
        assert_eq!(r.scopes, ScopeRegistry::scopes_for(ResourceType::Bot));
        assert_eq!(r.attributes.resource_type(), Some(ResourceType::Bot));
        assert_eq!(r.attributes.owner_id(), Some("user-1"));
        assert_eq!(r.attributes.is_public(), Some(true));
    }

    #[test]
    fn exchange_resource_has_no_public_attribute() {
        let r = Resource::for_entity(ResourceType::Exchange, "e-1", "binance", &owner(), true);
        assert_eq!(r.attributes.is_public(), None);
        assert_eq!(r.attributes.len(), 2);
    }

    #[test]
    fn group_attributes_only_include_owner_when_known() {
        assert_eq!(ResourceAttributes::for_group(None).len(), 1);
        let attrs = ResourceAttributes::for_group(Some("admin-7"));
        assert_eq!(attrs.owner_id(), Some("admin-7"));
        assert_eq!(attrs.first(ATTR_TYPE), Some("group"));
    }

    #[test]
    fn attributes_serialize_as_multi_valued_map() {
        let attrs = ResourceAttributes::for_entity(ResourceType::Runner, &owner(), false);
        let json = serde_json::to_value(&attrs).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"ownerId": ["user-1"], "public": ["false"], "type": ["runner"]})
        );
    }
}
