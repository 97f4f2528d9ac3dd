//! Coupled lifecycle of domain entities and their authorization resources.
//!
//! ## Create
//!
//! ```text
//! begin ─► insert row ─► register resource ─► grant owner ─► commit
//!               │               │                   │           │
//!               ▼               ▼                   ▼           ▼
//!           rollback        rollback     rollback + delete   delete resource
//!                                         resource
//! ```
//!
//! Registration and grant run under the caller's [`OperationContext`], so one
//! deadline bounds both. Compensating deletes run under their own short
//! context (the caller's may already be expired); if a compensation fails the
//! resource lands in the dangling-resource ledger.
//!
//! ## Delete
//!
//! The row is removed in its own transaction first. Removing the external
//! resource is best effort: failures are logged and recorded in the ledger,
//! which [`ResourceLifecycleManager::purge_dangling_resources`] drains.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tracing::{Span, error, info, instrument, warn};
use uuid::Uuid;

use botforge_auth::{ProtectedEntity, Resource, ResourceType};
use botforge_core::{DomainError, OwnerId};

use crate::authz_service::{AuthorizationService, AuthzServiceError};
use crate::context::{Interrupted, OperationContext};
use crate::entity_store::{DanglingResource, EntityRecord, EntityStore, StoreError, StoreTransaction};

/// Budget for a compensating delete.
pub const DEFAULT_CLEANUP_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("resource registration failed: {0}")]
    Registration(AuthzServiceError),

    #[error("owner grant failed: {0}")]
    Grant(AuthzServiceError),

    #[error("resource deletion failed: {0}")]
    Deregistration(AuthzServiceError),

    #[error("operation timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,
}

impl From<Interrupted> for LifecycleError {
    fn from(value: Interrupted) -> Self {
        match value {
            Interrupted::Timeout => Self::Timeout,
            Interrupted::Cancelled => Self::Cancelled,
        }
    }
}

impl LifecycleError {
    /// Wrap a service error, keeping deadline/cancellation as their own variants.
    fn service(err: AuthzServiceError, wrap: fn(AuthzServiceError) -> Self) -> Self {
        match err {
            AuthzServiceError::Timeout => Self::Timeout,
            AuthzServiceError::Cancelled => Self::Cancelled,
            other => wrap(other),
        }
    }
}

/// Result of a ledger drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// External resources deleted and cleared from the ledger.
    pub purged: usize,
    /// Deletes that failed again; their entries stay with a bumped attempt count.
    pub failed: usize,
    /// Entries not attempted because the context expired or was cancelled.
    pub skipped: usize,
}

#[derive(Debug, Clone)]
pub struct ResourceLifecycleManager<S, A> {
    store: S,
    authz: A,
    cleanup_timeout: Duration,
}

impl<S, A> ResourceLifecycleManager<S, A>
where
    S: EntityStore,
    A: AuthorizationService,
{
    pub fn new(store: S, authz: A) -> Self {
        Self {
            store,
            authz,
            cleanup_timeout: DEFAULT_CLEANUP_TIMEOUT,
        }
    }

    pub fn with_cleanup_timeout(mut self, timeout: Duration) -> Self {
        self.cleanup_timeout = timeout;
        self
    }

    /// Persist `entity` and register it as a protected resource owned by its owner.
    ///
    /// Either both the row and the resource (with the owner's grant) exist
    /// afterwards, or the row does not.
    #[instrument(
        skip(self, ctx, entity),
        fields(resource_type = %E::RESOURCE_TYPE, resource_id = tracing::field::Empty),
        err
    )]
    pub async fn create_with_resource<E>(&self, ctx: &OperationContext, entity: E) -> Result<E, LifecycleError>
    where
        E: ProtectedEntity + Serialize,
        E::Id: Copy + Into<Uuid>,
    {
        let record = EntityRecord::from_entity(&entity)?;
        let resource = entity.to_resource();
        Span::current().record("resource_id", resource.id.as_str());

        let mut tx = self.store.begin().await?;
        if let Err(err) = tx.insert(&record).await {
            rollback(tx.as_mut()).await;
            return Err(err.into());
        }

        if let Err(err) = ctx.try_run(self.authz.create_resource(&resource)).await {
            warn!(error = %err, "resource registration failed; rolling back");
            rollback(tx.as_mut()).await;
            // The service may have applied a request that timed out on our side.
            if matches!(err, AuthzServiceError::Timeout | AuthzServiceError::Cancelled) {
                self.compensate(&resource.id, E::RESOURCE_TYPE).await;
            }
            return Err(LifecycleError::service(err, LifecycleError::Registration));
        }

        let grant = self
            .authz
            .create_permission(&resource.id, entity.owner_id(), &resource.scopes);
        if let Err(err) = ctx.try_run(grant).await {
            warn!(error = %err, "owner grant failed; rolling back");
            rollback(tx.as_mut()).await;
            self.compensate(&resource.id, E::RESOURCE_TYPE).await;
            return Err(LifecycleError::service(err, LifecycleError::Grant));
        }

        if let Err(err) = tx.commit().await {
            warn!(error = %err, "commit failed after registration");
            self.compensate(&resource.id, E::RESOURCE_TYPE).await;
            return Err(err.into());
        }

        info!(owner_id = %entity.owner_id(), "created protected entity");
        Ok(entity)
    }

    /// Delete a domain entity, then (best effort) its external resource.
    ///
    /// Fails only if the row cannot be deleted. A missing row is
    /// [`StoreError::NotFound`].
    #[instrument(skip(self, ctx), fields(resource_type = %resource_type, id = %id), err)]
    pub async fn delete_with_resource(
        &self,
        ctx: &OperationContext,
        resource_type: ResourceType,
        id: Uuid,
    ) -> Result<(), LifecycleError> {
        if !resource_type.is_domain_backed() {
            return Err(DomainError::validation(
                "group resources have no domain row; use delete_group_resource",
            )
            .into());
        }

        let mut tx = self.store.begin().await?;
        let existed = match tx.delete(resource_type, id).await {
            Ok(existed) => existed,
            Err(err) => {
                rollback(tx.as_mut()).await;
                return Err(err.into());
            }
        };
        if !existed {
            rollback(tx.as_mut()).await;
            return Err(StoreError::NotFound(format!("{resource_type} {id}")).into());
        }
        tx.commit().await?;
        info!("deleted domain entity");

        let resource_id = id.to_string();
        if let Err(err) = ctx.try_run(self.authz.delete_resource(&resource_id)).await {
            self.record_dangling(&resource_id, resource_type, &err).await;
        }
        Ok(())
    }

    /// Register a group resource (no backing row) and grant its owner, if any,
    /// every group scope. A blank name falls back to `"Group: <id>"`.
    #[instrument(skip(self, ctx), err)]
    pub async fn create_group_resource(
        &self,
        ctx: &OperationContext,
        group_id: &str,
        name: &str,
        owner_id: Option<&OwnerId>,
    ) -> Result<Resource, LifecycleError> {
        if group_id.trim().is_empty() {
            return Err(DomainError::validation("group id cannot be empty").into());
        }
        let name = match name.trim() {
            "" => ResourceType::Group.display_name(group_id),
            trimmed => trimmed.to_string(),
        };
        let resource = Resource::for_group(group_id, name, owner_id.map(OwnerId::as_str));

        if let Err(err) = ctx.try_run(self.authz.create_resource(&resource)).await {
            warn!(error = %err, "group registration failed");
            if matches!(err, AuthzServiceError::Timeout | AuthzServiceError::Cancelled) {
                self.compensate(group_id, ResourceType::Group).await;
            }
            return Err(LifecycleError::service(err, LifecycleError::Registration));
        }

        if let Some(owner) = owner_id {
            let grant = self.authz.create_permission(group_id, owner, &resource.scopes);
            if let Err(err) = ctx.try_run(grant).await {
                warn!(error = %err, "group owner grant failed; deleting group resource");
                self.compensate(group_id, ResourceType::Group).await;
                return Err(LifecycleError::service(err, LifecycleError::Grant));
            }
        }

        info!("created group resource");
        Ok(resource)
    }

    /// Delete a group resource. The service is the only copy, so failures are returned.
    #[instrument(skip(self, ctx), err)]
    pub async fn delete_group_resource(&self, ctx: &OperationContext, group_id: &str) -> Result<(), LifecycleError> {
        ctx.try_run(self.authz.delete_resource(group_id))
            .await
            .map_err(|e| LifecycleError::service(e, LifecycleError::Deregistration))?;
        info!("deleted group resource");
        Ok(())
    }

    /// Retry external deletes recorded in the dangling-resource ledger, oldest first.
    ///
    /// Runs only when called. Each delete gets at most the cleanup timeout.
    /// Stops early (counting the rest as skipped) when `ctx` expires or is
    /// cancelled.
    #[instrument(skip(self, ctx), err)]
    pub async fn purge_dangling_resources(
        &self,
        ctx: &OperationContext,
        limit: usize,
    ) -> Result<PurgeReport, LifecycleError> {
        let entries = self.store.dangling_resources(limit).await?;
        let mut report = PurgeReport::default();

        for (idx, entry) in entries.iter().enumerate() {
            let attempt = ctx.child_with_timeout(self.cleanup_timeout);
            match attempt.try_run(self.authz.delete_resource(&entry.resource_id)).await {
                Ok(()) => {
                    self.store.clear_dangling(&entry.resource_id).await?;
                    report.purged += 1;
                }
                Err(AuthzServiceError::Timeout | AuthzServiceError::Cancelled) if ctx_finished(ctx) => {
                    report.skipped = entries.len() - idx;
                    warn!(skipped = report.skipped, "purge interrupted");
                    break;
                }
                Err(err) => {
                    warn!(resource_id = %entry.resource_id, error = %err, "dangling resource still not deleted");
                    self.store
                        .record_dangling(DanglingResource::new(
                            entry.resource_id.clone(),
                            entry.resource_type,
                            err.to_string(),
                        ))
                        .await?;
                    report.failed += 1;
                }
            }
        }

        info!(purged = report.purged, failed = report.failed, skipped = report.skipped, "purged dangling resources");
        Ok(report)
    }

    /// Best-effort delete of an external resource created by a failed operation.
    async fn compensate(&self, resource_id: &str, resource_type: ResourceType) {
        let cleanup = OperationContext::with_timeout(self.cleanup_timeout);
        match cleanup.try_run(self.authz.delete_resource(resource_id)).await {
            Ok(()) => info!(resource_id, "removed orphaned resource"),
            Err(err) => self.record_dangling(resource_id, resource_type, &err).await,
        }
    }

    async fn record_dangling(&self, resource_id: &str, resource_type: ResourceType, err: &AuthzServiceError) {
        warn!(resource_id, %resource_type, error = %err, "external resource deletion failed; recording as dangling");
        let entry = DanglingResource::new(resource_id, resource_type, err.to_string());
        if let Err(ledger_err) = self.store.record_dangling(entry).await {
            error!(resource_id, error = %ledger_err, "failed to record dangling resource");
        }
    }
}

/// Whether the context itself stopped the call, as opposed to a transport timeout.
fn ctx_finished(ctx: &OperationContext) -> bool {
    ctx.is_cancelled() || ctx.is_expired()
}

async fn rollback(tx: &mut dyn StoreTransaction) {
    if let Err(err) = tx.rollback().await {
        warn!(error = %err, "rollback failed");
    }
}
