use tracing::{debug, instrument};

use crate::authz_service::{AuthorizationService, AuthzServiceError};
use crate::context::OperationContext;

/// Remote permission checks. Decisions are never cached.
#[derive(Debug, Clone)]
pub struct PermissionVerifier<A> {
    authz: A,
}

impl<A: AuthorizationService> PermissionVerifier<A> {
    pub fn new(authz: A) -> Self {
        Self { authz }
    }

    /// `Ok(false)` is a denial; `Err` means the decision could not be made.
    #[instrument(skip(self, ctx, caller_token))]
    pub async fn check_permission(
        &self,
        ctx: &OperationContext,
        caller_token: &str,
        resource_id: &str,
        scope: &str,
    ) -> Result<bool, AuthzServiceError> {
        let result = ctx
            .try_run(self.authz.check_permission(caller_token, resource_id, scope))
            .await;

        match &result {
            Ok(granted) => debug!(granted, "permission checked"),
            Err(err) => debug!(error = %err, "permission check failed"),
        }
        result
    }
}
