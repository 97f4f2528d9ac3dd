use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use botforge_auth::{ProtectedEntity, ResourceType};
use botforge_core::{BotId, DomainError, DomainResult, Entity, ExchangeId, OwnedEntity, OwnerId, StrategyId};

/// A trading bot: runs one strategy against one exchange connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bot {
    pub id: BotId,
    pub owner_id: OwnerId,
    pub name: String,
    pub public: bool,
    /// Market symbol the bot trades (e.g. `BTC/USDT`).
    pub symbol: String,
    pub strategy_id: Option<StrategyId>,
    pub exchange_id: Option<ExchangeId>,
    pub created_at: DateTime<Utc>,
}

impl Bot {
    pub fn new(
        id: BotId,
        owner_id: OwnerId,
        name: impl Into<String>,
        symbol: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let name = crate::validate_name("Bot", name)?;
        let symbol = symbol.into().trim().to_uppercase();
        if symbol.is_empty() {
            return Err(DomainError::validation("Bot symbol cannot be empty"));
        }

        Ok(Self {
            id,
            owner_id,
            name,
            public: false,
            symbol,
            strategy_id: None,
            exchange_id: None,
            created_at,
        })
    }

    pub fn with_strategy(mut self, strategy_id: StrategyId) -> Self {
        self.strategy_id = Some(strategy_id);
        self
    }

    pub fn with_exchange(mut self, exchange_id: ExchangeId) -> Self {
        self.exchange_id = Some(exchange_id);
        self
    }

    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }
}

impl Entity for Bot {
    type Id = BotId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl OwnedEntity for Bot {
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

impl ProtectedEntity for Bot {
    const RESOURCE_TYPE: ResourceType = ResourceType::Bot;
}
