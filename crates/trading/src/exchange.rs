use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use botforge_auth::{ProtectedEntity, ResourceType};
use botforge_core::{DomainError, DomainResult, Entity, ExchangeId, OwnedEntity, OwnerId};

/// A user's connection to a trading venue.
///
/// Holds (a reference to) API credentials, so it is never public.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    pub id: ExchangeId,
    pub owner_id: OwnerId,
    pub name: String,
    /// Venue identifier, lowercase (e.g. `binance`, `kraken`).
    pub provider: String,
    /// Connected to the venue's paper-trading environment.
    pub sandbox: bool,
    pub created_at: DateTime<Utc>,
}

impl Exchange {
    pub fn new(
        id: ExchangeId,
        owner_id: OwnerId,
        name: impl Into<String>,
        provider: impl Into<String>,
        sandbox: bool,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let provider = provider.into().trim().to_lowercase();
        if provider.is_empty() {
            return Err(DomainError::validation("Exchange provider cannot be empty"));
        }

        Ok(Self {
            id,
            owner_id,
            name: crate::validate_name("Exchange", name)?,
            provider,
            sandbox,
            created_at,
        })
    }
}

impl Entity for Exchange {
    type Id = ExchangeId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl OwnedEntity for Exchange {
    fn name(&self) -> &str {
        &self.name
    }

    fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    fn is_public(&self) -> bool {
        false
    }
}

impl ProtectedEntity for Exchange {
    const RESOURCE_TYPE: ResourceType = ResourceType::Exchange;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_is_required_and_lowercased() {
        let owner = OwnerId::new("user-1").unwrap();
        assert!(Exchange::new(ExchangeId::new(), owner.clone(), "Main", " ", false, Utc::now()).is_err());

        let ex = Exchange::new(ExchangeId::new(), owner, "Main", "Binance", true, Utc::now()).unwrap();
        assert_eq!(ex.provider, "binance");
        assert!(!ex.is_public());
    }
}
