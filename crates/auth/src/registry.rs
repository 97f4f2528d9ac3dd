//! Static scope tables per resource type.

use crate::{ResourceType, Scope};

static BOT_SCOPES: [Scope; 6] = [
    Scope::from_static("view"),
    Scope::from_static("edit"),
    Scope::from_static("delete"),
    Scope::from_static("run"),
    Scope::from_static("stop"),
    Scope::from_static("view-logs"),
];

static STRATEGY_SCOPES: [Scope; 5] = [
    Scope::from_static("view"),
    Scope::from_static("edit"),
    Scope::from_static("delete"),
    Scope::from_static("run-backtest"),
    Scope::from_static("clone"),
];

static EXCHANGE_SCOPES: [Scope; 5] = [
    Scope::from_static("view"),
    Scope::from_static("edit"),
    Scope::from_static("delete"),
    Scope::from_static("view-secrets"),
    Scope::from_static("trade"),
];

static RUNNER_SCOPES: [Scope; 5] = [
    Scope::from_static("view"),
    Scope::from_static("edit"),
    Scope::from_static("delete"),
    Scope::from_static("deploy"),
    Scope::from_static("view-logs"),
];

static GROUP_SCOPES: [Scope; 5] = [
    Scope::from_static("view"),
    Scope::from_static("edit"),
    Scope::from_static("delete"),
    Scope::from_static("manage-members"),
    Scope::from_static("create-resources"),
];

/// Canonical scope sets for every resource type.
///
/// - No IO
/// - Backed by immutable statics, so concurrent reads need no synchronization
pub struct ScopeRegistry;

impl ScopeRegistry {
    /// The full, duplicate-free scope set for a resource type.
    pub fn scopes_for(resource_type: ResourceType) -> &'static [Scope] {
        match resource_type {
            ResourceType::Bot => &BOT_SCOPES,
            ResourceType::Strategy => &STRATEGY_SCOPES,
            ResourceType::Exchange => &EXCHANGE_SCOPES,
            ResourceType::Runner => &RUNNER_SCOPES,
            ResourceType::Group => &GROUP_SCOPES,
        }
    }

    /// Scope set for a wire tag (`"bot"`, `"group"`, ...).
    ///
    /// Unknown tags yield an empty slice rather than an error.
    pub fn scopes_for_tag(tag: &str) -> &'static [Scope] {
        tag.parse::<ResourceType>()
            .map(Self::scopes_for)
            .unwrap_or(&[])
    }

    /// Whether `scope` is defined for `resource_type`.
    pub fn is_defined(resource_type: ResourceType, scope: &str) -> bool {
        Self::scopes_for(resource_type).iter().any(|s| s == scope)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use proptest::prelude::*;

    use super::*;

    const ALL: [ResourceType; 5] = [
        ResourceType::Bot,
        ResourceType::Strategy,
        ResourceType::Exchange,
        ResourceType::Runner,
        ResourceType::Group,
    ];

    fn names(ty: ResourceType) -> Vec<&'static str> {
        ScopeRegistry::scopes_for(ty).iter().map(|s| s.as_str()).collect()
    }

    #[test]
    fn documented_scope_lists() {
        assert_eq!(
            names(ResourceType::Bot),
            ["view", "edit", "delete", "run", "stop", "view-logs"]
        );
        assert_eq!(
            names(ResourceType::Strategy),
            ["view", "edit", "delete", "run-backtest", "clone"]
        );
        assert_eq!(
            names(ResourceType::Exchange),
            ["view", "edit", "delete", "view-secrets", "trade"]
        );
        assert_eq!(
            names(ResourceType::Runner),
            ["view", "edit", "delete", "deploy", "view-logs"]
        );
        assert_eq!(
            names(ResourceType::Group),
            ["view", "edit", "delete", "manage-members", "create-resources"]
        );
    }

    #[test]
    fn every_type_has_non_empty_duplicate_free_scopes() {
        for ty in ALL {
            let scopes = ScopeRegistry::scopes_for(ty);
            assert!(!scopes.is_empty(), "{ty} has no scopes");
            let unique: HashSet<_> = scopes.iter().collect();
            assert_eq!(unique.len(), scopes.len(), "{ty} has duplicate scopes");
        }
    }

    #[test]
    fn tag_lookup_matches_enum_lookup() {
        for ty in ALL {
            assert_eq!(ScopeRegistry::scopes_for_tag(ty.as_str()), ScopeRegistry::scopes_for(ty));
        }
    }

    #[test]
    fn shared_spelling_does_not_imply_shared_scope_set() {
        assert!(ScopeRegistry::is_defined(ResourceType::Exchange, "view-secrets"));
        assert!(!ScopeRegistry::is_defined(ResourceType::Bot, "view-secrets"));
        assert!(ScopeRegistry::is_defined(ResourceType::Strategy, "run-backtest"));
    }

    proptest! {
        #[test]
        fn unknown_tags_yield_empty(tag in "[a-z]{1,12}") {
            prop_assume!(tag.parse::<ResourceType>().is_err());
            prop_assert!(ScopeRegistry::scopes_for_tag(&tag).is_empty());
        }
    }
}
