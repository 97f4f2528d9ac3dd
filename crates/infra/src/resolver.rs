//! Resource type resolution.
//!
//! Given an opaque resource id, work out which kind of protected resource it
//! names and build its canonical [`Resource`] (display name, full scope set,
//! attributes).
//!
//! Lookup order:
//! 1. ids that are not UUIDs can only be groups;
//! 2. the store's resource index, then a single point lookup;
//! 3. for rows written before the index existed, a probe over [`PROBE_ORDER`];
//! 4. otherwise the id is a group, enriched from the authorization service when
//!    the service already knows it.

use thiserror::Error;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use botforge_auth::{Resource, ResourceType};

use crate::authz_service::{AuthorizationService, AuthzServiceError};
use crate::context::OperationContext;
use crate::entity_store::{EntityRecord, EntityStore, StoreError};

/// Probe order for rows missing from the resource index. First match wins.
pub const PROBE_ORDER: [ResourceType; 4] = ResourceType::DOMAIN_TYPES;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("store error during resolution: {0}")]
    Store(#[from] StoreError),

    #[error("authorization service error during resolution: {0}")]
    Service(#[from] AuthzServiceError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResource {
    pub resource_type: ResourceType,
    pub resource: Resource,
}

#[derive(Debug, Clone)]
pub struct ResourceTypeResolver<S, A> {
    store: S,
    authz: A,
}

impl<S, A> ResourceTypeResolver<S, A>
where
    S: EntityStore,
    A: AuthorizationService,
{
    pub fn new(store: S, authz: A) -> Self {
        Self { store, authz }
    }

    #[instrument(skip(self, ctx), err)]
    pub async fn resolve(&self, ctx: &OperationContext, resource_id: &str) -> Result<ResolvedResource, ResolveError> {
        if let Ok(id) = Uuid::parse_str(resource_id) {
            if let Some(record) = self.find_record(id).await? {
                return Ok(ResolvedResource {
                    resource_type: record.resource_type,
                    resource: record.to_resource(),
                });
            }
        }

        self.resolve_group(ctx, resource_id).await
    }

    async fn find_record(&self, id: Uuid) -> Result<Option<EntityRecord>, StoreError> {
        if let Some(resource_type) = self.store.indexed_type(id).await? {
            if let Some(record) = self.store.find(resource_type, id).await? {
                return Ok(Some(record));
            }
            warn!(%id, %resource_type, "resource index points at a missing row; probing");
        }

        for resource_type in PROBE_ORDER {
            if let Some(record) = self.store.find(resource_type, id).await? {
                debug!(%id, %resource_type, "resolved unindexed row by probing");
                return Ok(Some(record));
            }
        }
        Ok(None)
    }

    async fn resolve_group(&self, ctx: &OperationContext, resource_id: &str) -> Result<ResolvedResource, ResolveError> {
        let resource = match ctx.try_run(self.authz.get_resource(resource_id)).await {
            Ok(existing) => {
                let name = if existing.name.trim().is_empty() {
                    ResourceType::Group.display_name(resource_id)
                } else {
                    existing.name
                };
                Resource::for_group(resource_id, name, existing.attributes.owner_id())
            }
            Err(err) if err.is_not_found() => {
                debug!(resource_id, "no external resource yet; treating as new group");
                Resource::for_group(resource_id, ResourceType::Group.display_name(resource_id), None)
            }
            Err(err) => return Err(err.into()),
        };

        Ok(ResolvedResource {
            resource_type: ResourceType::Group,
            resource,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use serde_json::json;

    use botforge_auth::{ScopeRegistry, resource::ATTR_TYPE};
    use botforge_core::OwnerId;

    use super::*;
    use crate::authz_service::{InMemoryAuthzService, ServiceOperation};
    use crate::entity_store::InMemoryEntityStore;

    fn record(resource_type: ResourceType, public: bool) -> EntityRecord {
        EntityRecord {
            id: Uuid::now_v7(),
            resource_type,
            name: "alpha".to_string(),
            owner_id: OwnerId::new("user-1").unwrap(),
            public,
            payload: json!({}),
            created_at: Utc::now(),
        }
    }

    fn resolver() -> (
        Arc<InMemoryEntityStore>,
        InMemoryAuthzService,
        ResourceTypeResolver<Arc<InMemoryEntityStore>, InMemoryAuthzService>,
    ) {
        let store = InMemoryEntityStore::arc();
        let authz = InMemoryAuthzService::new();
        let resolver = ResourceTypeResolver::new(store.clone(), authz.clone());
        (store, authz, resolver)
    }

    #[tokio::test]
    async fn indexed_rows_resolve_to_their_type() {
        let (store, authz, resolver) = resolver();
        let ctx = OperationContext::new();

        for resource_type in ResourceType::DOMAIN_TYPES {
            let r = record(resource_type, true);
            let mut tx = store.begin().await.unwrap();
            tx.insert(&r).await.unwrap();
            tx.commit().await.unwrap();

            let resolved = resolver.resolve(&ctx, &r.id.to_string()).await.unwrap();
            assert_eq!(resolved.resource_type, resource_type);
            assert_eq!(resolved.resource.name, resource_type.display_name("alpha"));
            assert_eq!(resolved.resource.scopes, ScopeRegistry::scopes_for(resource_type));
            assert_eq!(resolved.resource.attributes.owner_id(), Some("user-1"));
        }
        assert!(authz.calls().is_empty());
    }

    #[tokio::test]
    async fn unindexed_rows_are_found_by_probing() {
        let (store, _, resolver) = resolver();
        let r = record(ResourceType::Runner, false);
        store.insert_unindexed(r.clone()).unwrap();

        let resolved = resolver
            .resolve(&OperationContext::new(), &r.id.to_string())
            .await
            .unwrap();
        assert_eq!(resolved.resource_type, ResourceType::Runner);
        assert_eq!(resolved.resource.attributes.is_public(), Some(false));
    }

    #[tokio::test]
    async fn unknown_ids_resolve_to_bare_groups() {
        let (_, _, resolver) = resolver();
        let ctx = OperationContext::new();
        let unknown_uuid = Uuid::now_v7().to_string();

        for id in ["desk-a", unknown_uuid.as_str()] {
            let resolved = resolver.resolve(&ctx, id).await.unwrap();
            assert_eq!(resolved.resource_type, ResourceType::Group);
            assert_eq!(resolved.resource.name, format!("Group: {id}"));
            assert_eq!(resolved.resource.attributes.len(), 1);
            assert_eq!(resolved.resource.attributes.first(ATTR_TYPE), Some("group"));
        }
    }

    #[tokio::test]
    async fn existing_group_keeps_owner_and_name() {
        let (_, authz, resolver) = resolver();
        authz.insert_resource(Resource::for_group("desk-a", "Desk A", Some("admin-7")));

        let resolved = resolver.resolve(&OperationContext::new(), "desk-a").await.unwrap();
        assert_eq!(resolved.resource.name, "Desk A");
        assert_eq!(resolved.resource.attributes.owner_id(), Some("admin-7"));
    }

    #[tokio::test]
    async fn service_failures_other_than_not_found_surface() {
        let (_, authz, resolver) = resolver();
        authz.fail_next(
            ServiceOperation::GetResource,
            AuthzServiceError::Transport("connection refused".into()),
        );

        let err = resolver
            .resolve(&OperationContext::new(), "desk-a")
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::Service(AuthzServiceError::Transport(_))));
    }
}
