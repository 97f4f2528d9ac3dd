use core::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Kind of protected resource mirrored in the authorization service.
///
/// Closed set: adding a variant forces every scope table and display-name
/// template to be extended at compile time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceType {
    Bot,
    Strategy,
    Exchange,
    Runner,
    /// Organization-level resource native to the authorization service
    /// (no backing row in the transactional store).
    Group,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown resource type '{0}'")]
pub struct UnknownResourceType(pub String);

impl ResourceType {
    /// Domain-backed types in resolution priority order.
    pub const DOMAIN_TYPES: [ResourceType; 4] = [
        ResourceType::Bot,
        ResourceType::Strategy,
        ResourceType::Exchange,
        ResourceType::Runner,
    ];

    /// Wire tag stored in the `type` attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Bot => "bot",
            ResourceType::Strategy => "strategy",
            ResourceType::Exchange => "exchange",
            ResourceType::Runner => "runner",
            ResourceType::Group => "group",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ResourceType::Bot => "Bot",
            ResourceType::Strategy => "Strategy",
            ResourceType::Exchange => "Exchange",
            ResourceType::Runner => "Runner",
            ResourceType::Group => "Group",
        }
    }

    /// Display name of the mirrored resource, e.g. `"Bot: alpha"`.
    pub fn display_name(&self, name: &str) -> String {
        format!("{}: {}", self.label(), name)
    }

    /// Whether the type has a row in the transactional store.
    pub fn is_domain_backed(&self) -> bool {
        !matches!(self, ResourceType::Group)
    }

    /// Whether resources of this type carry a `public` attribute.
    ///
    /// Exchanges hold venue credentials and can never be shared.
    pub fn is_visibility_aware(&self) -> bool {
        matches!(
            self,
            ResourceType::Bot | ResourceType::Strategy | ResourceType::Runner
        )
    }
}

impl core::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = UnknownResourceType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bot" => Ok(ResourceType::Bot),
            "strategy" => Ok(ResourceType::Strategy),
            "exchange" => Ok(ResourceType::Exchange),
            "runner" => Ok(ResourceType::Runner),
            "group" => Ok(ResourceType::Group),
            other => Err(UnknownResourceType(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_round_trip() {
        for ty in ResourceType::DOMAIN_TYPES.into_iter().chain([ResourceType::Group]) {
            assert_eq!(ty.as_str().parse::<ResourceType>().unwrap(), ty);
        }
    }

    #[test]
    fn unknown_tag_is_rejected() {
        assert_eq!(
            "wallet".parse::<ResourceType>(),
            Err(UnknownResourceType("wallet".to_string()))
        );
    }

    #[test]
    fn display_names_follow_type_template() {
        assert_eq!(ResourceType::Bot.display_name("alpha"), "Bot: alpha");
        assert_eq!(ResourceType::Strategy.display_name("mean-rev"), "Strategy: mean-rev");
    }

    #[test]
    fn exchange_is_not_visibility_aware() {
        assert!(!ResourceType::Exchange.is_visibility_aware());
        assert!(ResourceType::Bot.is_visibility_aware());
        assert!(!ResourceType::Group.is_domain_backed());
    }
}
