use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::Value as JsonValue;
use thiserror::Error;
use uuid::Uuid;

use botforge_auth::{ProtectedEntity, Resource, ResourceType};
use botforge_core::OwnerId;

/// A domain entity as the transactional store persists it.
///
/// The columns every protected entity shares (`id`, `name`, `owner_id`,
/// `public`) are first-class so point lookups can build the mirrored resource
/// without knowing the concrete entity type. Type-specific fields travel in
/// `payload` (the serde representation of the whole entity).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: Uuid,
    pub resource_type: ResourceType,
    pub name: String,
    pub owner_id: OwnerId,
    pub public: bool,
    pub payload: JsonValue,
    pub created_at: DateTime<Utc>,
}

impl EntityRecord {
    /// Build a record from a typed entity.
    pub fn from_entity<E>(entity: &E) -> Result<Self, StoreError>
    where
        E: ProtectedEntity + Serialize,
        E::Id: Copy + Into<Uuid>,
    {
        let payload = serde_json::to_value(entity)
            .map_err(|e| StoreError::InvalidRecord(format!("payload serialization failed: {e}")))?;

        Ok(Self {
            id: (*entity.id()).into(),
            resource_type: E::RESOURCE_TYPE,
            name: entity.name().to_string(),
            owner_id: entity.owner_id().clone(),
            public: entity.is_public(),
            payload,
            created_at: Utc::now(),
        })
    }

    /// Decode the payload back into the typed entity.
    pub fn into_entity<E>(self) -> Result<E, StoreError>
    where
        E: ProtectedEntity + DeserializeOwned,
    {
        if self.resource_type != E::RESOURCE_TYPE {
            return Err(StoreError::InvalidRecord(format!(
                "record {} is a {}, not a {}",
                self.id,
                self.resource_type,
                E::RESOURCE_TYPE
            )));
        }
        serde_json::from_value(self.payload)
            .map_err(|e| StoreError::InvalidRecord(format!("payload deserialization failed: {e}")))
    }

    /// Canonical mirrored resource for this row.
    pub fn to_resource(&self) -> Resource {
        Resource::for_entity(
            self.resource_type,
            self.id.to_string(),
            &self.name,
            &self.owner_id,
            self.public,
        )
    }
}

/// An external resource whose deletion failed after its domain row was removed.
///
/// Entries form an outbox that `ResourceLifecycleManager::purge_dangling_resources`
/// drains on demand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DanglingResource {
    pub resource_id: String,
    pub resource_type: ResourceType,
    pub reason: String,
    /// Number of failed deletion attempts recorded so far.
    pub attempts: u32,
    pub recorded_at: DateTime<Utc>,
}

impl DanglingResource {
    pub fn new(resource_id: impl Into<String>, resource_type: ResourceType, reason: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            resource_type,
            reason: reason.into(),
            attempts: 1,
            recorded_at: Utc::now(),
        }
    }
}

/// Transactional store error.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("entity not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid record: {0}")]
    InvalidRecord(String),

    #[error("transaction already finished")]
    TransactionFinished,

    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Transactional store holding the owned domain entities.
///
/// Besides the per-type entity tables, implementations maintain:
/// - a **resource index** (`resource id -> resource type`) written in the same
///   transaction as the entity row, so resolution needs no probing;
/// - a **dangling-resource ledger** of external resources whose delete failed.
#[async_trait::async_trait]
pub trait EntityStore: Send + Sync {
    /// Begin a transaction. Dropping it without `commit` rolls back.
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError>;

    /// Point lookup of a committed entity.
    async fn find(&self, resource_type: ResourceType, id: Uuid) -> Result<Option<EntityRecord>, StoreError>;

    /// Resource-index lookup.
    async fn indexed_type(&self, id: Uuid) -> Result<Option<ResourceType>, StoreError>;

    /// Record (or bump the attempt count of) a dangling external resource.
    async fn record_dangling(&self, entry: DanglingResource) -> Result<(), StoreError>;

    /// Oldest dangling resources first.
    async fn dangling_resources(&self, limit: usize) -> Result<Vec<DanglingResource>, StoreError>;

    /// Remove a ledger entry (no-op if absent).
    async fn clear_dangling(&self, resource_id: &str) -> Result<(), StoreError>;
}

/// A unit of work against the entity store.
#[async_trait::async_trait]
pub trait StoreTransaction: Send {
    /// Insert an entity row and its resource-index entry.
    async fn insert(&mut self, record: &EntityRecord) -> Result<(), StoreError>;

    /// Delete an entity row and its index entry. Returns whether a row existed.
    async fn delete(&mut self, resource_type: ResourceType, id: Uuid) -> Result<bool, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;

    async fn rollback(&mut self) -> Result<(), StoreError>;
}

#[async_trait::async_trait]
impl<S> EntityStore for Arc<S>
where
    S: EntityStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn StoreTransaction>, StoreError> {
        (**self).begin().await
    }

    async fn find(&self, resource_type: ResourceType, id: Uuid) -> Result<Option<EntityRecord>, StoreError> {
        (**self).find(resource_type, id).await
    }

    async fn indexed_type(&self, id: Uuid) -> Result<Option<ResourceType>, StoreError> {
        (**self).indexed_type(id).await
    }

    async fn record_dangling(&self, entry: DanglingResource) -> Result<(), StoreError> {
        (**self).record_dangling(entry).await
    }

    async fn dangling_resources(&self, limit: usize) -> Result<Vec<DanglingResource>, StoreError> {
        (**self).dangling_resources(limit).await
    }

    async fn clear_dangling(&self, resource_id: &str) -> Result<(), StoreError> {
        (**self).clear_dangling(resource_id).await
    }
}
