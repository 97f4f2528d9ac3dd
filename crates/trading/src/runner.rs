use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use botforge_auth::{ProtectedEntity, ResourceType};
use botforge_core::{DomainError, DomainResult, Entity, OwnedEntity, OwnerId, RunnerId};

/// Where a runner executes bots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunnerKind {
    /// Managed by the platform.
    Local,
    /// User-supplied host reachable at `endpoint`.
    Remote,
}

/// An execution host that bots are deployed onto.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Runner {
    pub id: RunnerId,
    pub owner_id: OwnerId,
    pub name: String,
    pub public: bool,
    pub kind: RunnerKind,
    pub endpoint: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Runner {
    pub fn new(
        id: RunnerId,
        owner_id: OwnerId,
        name: impl Into<String>,
        kind: RunnerKind,
        endpoint: Option<String>,
        created_at: DateTime<Utc>,
    ) -> DomainResult<Self> {
        let endpoint = endpoint
            .map(|e| e.trim().to_string())
            .filter(|e| !e.is_empty());
        if kind == RunnerKind::Remote && endpoint.is_none() {
            return Err(DomainError::validation("remote Runner requires an endpoint"));
        }

        Ok(Self {
            id,
            owner_id,
            name: crate::validate_name("Runner", name)?,
            public: false,
            kind,
            endpoint,
            created_at,
        })
    }

    pub fn with_public(mut self, public: bool) -> Self {
        self.public = public;
        self
    }
}

impl Entity for Runner {
    type Id = RunnerId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

impl OwnedEntity for Runner {
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

impl ProtectedEntity for Runner {
    const RESOURCE_TYPE: ResourceType = ResourceType::Runner;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_runner_requires_endpoint() {
        let owner = OwnerId::new("user-1").unwrap();
        let err = Runner::new(RunnerId::new(), owner.clone(), "edge", RunnerKind::Remote, Some(" ".into()), Utc::now())
            .unwrap_err();
        assert_eq!(err, DomainError::validation("remote Runner requires an endpoint"));

        let local = Runner::new(RunnerId::new(), owner, "shared", RunnerKind::Local, None, Utc::now()).unwrap();
        assert_eq!(local.to_resource().name, "Runner: shared");
    }
}
