//! Reactive repair of drifted authorization metadata.
//!
//! When a permission check fails in a way that suggests the service's copy of a
//! resource is stale (unknown scope, missing resource, or a plain denial), the
//! synchronizer re-derives the canonical resource from the domain and upserts
//! it. Existing grants survive the upsert.
//!
//! Per attempt:
//!
//! ```text
//! Checked ─► Granted
//!    └─────► Denied ─► Healed ─► Checked (once) ─► GrantedAfterHealing | DeniedAfterHealing
//!                └───► HealFailed (error)
//! ```

use thiserror::Error;
use tracing::{info, instrument, warn};

use botforge_auth::{StaleMetadataSignal, should_trigger_self_healing};

use crate::authz_service::{AuthorizationService, AuthzServiceError};
use crate::context::OperationContext;
use crate::entity_store::EntityStore;
use crate::resolver::{ResolveError, ResolvedResource, ResourceTypeResolver};
use crate::verifier::PermissionVerifier;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("authorization service error during sync: {0}")]
    Service(#[from] AuthzServiceError),
}

/// When a failed check should trigger a resync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum HealingPolicy {
    /// Any denial, plus errors that signal stale metadata.
    #[default]
    AnyDenial,
    /// Only errors that signal stale metadata; clean denials are final.
    StaleMetadataOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealingOutcome {
    Granted,
    Denied,
    GrantedAfterHealing,
    DeniedAfterHealing,
}

impl HealingOutcome {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted | Self::GrantedAfterHealing)
    }

    pub fn healed(&self) -> bool {
        matches!(self, Self::GrantedAfterHealing | Self::DeniedAfterHealing)
    }
}

#[derive(Debug, Clone)]
pub struct SelfHealingSynchronizer<S, A> {
    resolver: ResourceTypeResolver<S, A>,
    verifier: PermissionVerifier<A>,
    authz: A,
    policy: HealingPolicy,
}

impl<S, A> SelfHealingSynchronizer<S, A>
where
    S: EntityStore,
    A: AuthorizationService + Clone,
{
    pub fn new(store: S, authz: A) -> Self {
        Self {
            resolver: ResourceTypeResolver::new(store, authz.clone()),
            verifier: PermissionVerifier::new(authz.clone()),
            authz,
            policy: HealingPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: HealingPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn should_trigger(&self, has_permission: bool, err: Option<&AuthzServiceError>) -> bool {
        match self.policy {
            HealingPolicy::AnyDenial => should_trigger_self_healing(has_permission, err),
            HealingPolicy::StaleMetadataOnly => {
                !has_permission && err.is_some_and(|e| e.signals_stale_metadata())
            }
        }
    }

    /// Re-derive the canonical resource for `resource_id` and upsert it.
    #[instrument(skip(self, ctx), err)]
    pub async fn sync(&self, ctx: &OperationContext, resource_id: &str) -> Result<ResolvedResource, SyncError> {
        let resolved = self.resolver.resolve(ctx, resource_id).await?;
        ctx.try_run(self.authz.sync_resource_scopes(&resolved.resource))
            .await?;

        info!(
            resource_type = %resolved.resource_type,
            scopes = resolved.resource.scopes.len(),
            "synchronized resource"
        );
        Ok(resolved)
    }

    /// Check a permission, healing and re-checking once if the result looks stale.
    #[instrument(skip(self, ctx, caller_token), err)]
    pub async fn check_with_healing(
        &self,
        ctx: &OperationContext,
        caller_token: &str,
        resource_id: &str,
        scope: &str,
    ) -> Result<HealingOutcome, SyncError> {
        let first = self
            .verifier
            .check_permission(ctx, caller_token, resource_id, scope)
            .await;

        let err = match first {
            Ok(true) => return Ok(HealingOutcome::Granted),
            Ok(false) => None,
            Err(err) => Some(err),
        };

        if !self.should_trigger(false, err.as_ref()) {
            return match err {
                Some(err) => Err(err.into()),
                None => Ok(HealingOutcome::Denied),
            };
        }

        if let Err(heal_err) = self.sync(ctx, resource_id).await {
            warn!(error = %heal_err, "self-healing sync failed");
            return Err(heal_err);
        }

        match self
            .verifier
            .check_permission(ctx, caller_token, resource_id, scope)
            .await?
        {
            true => Ok(HealingOutcome::GrantedAfterHealing),
            false => Ok(HealingOutcome::DeniedAfterHealing),
        }
    }
}
