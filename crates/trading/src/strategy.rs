use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use botforge_auth::{ProtectedEntity, ResourceType};
use botforge_core::{DomainResult, Entity, OwnedEntity, OwnerId, StrategyId};

/// Language a strategy's source is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StrategyLanguage {
    #[default]
    Python,
    Rust,
    Pine,
}

/// A trading strategy definition that bots execute and users backtest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: StrategyId,
    pub owner_id: OwnerId,
    pub name: String,
    pub public: bool,
    pub language: StrategyLanguage,
    pub source: String,
    pub created_at: DateTime<Utc>,
}

impl Strategy {
    pub fn new(
        id: StrategyId,
        owner_id: OwnerId,
        name: impl Into<String>,
        language: StrategyLanguage,
        source: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        Ok(Self {
            id,
            owner_id,
            name: crate::validate_name("Strategy", name)?,
            public: false,
            language,
            source: source.into(),
            created_at,
        })
    }

    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }
}

impl Entity for Strategy {
    type Id = StrategyId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl OwnedEntity for Strategy {
    fn name(&self) -> &str {
        &self.name
    }

    fn owner_id(&self) -> &OwnerId {
        &self.owner_id
    }

    fn is_public(&self) -> bool {
        self.public
    }
}

impl ProtectedEntity for Strategy {
    const RESOURCE_TYPE: ResourceType = ResourceType::Strategy;
}
