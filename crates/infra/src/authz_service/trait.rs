use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;

use botforge_auth::{Resource, Scope, StaleMetadataSignal};
use botforge_core::OwnerId;

/// Authorization service error.
///
/// Transport failures (`Transport`, `Timeout`, `Status`, ...) are kept apart from
/// the two conditions that mean the remote copy of a resource has drifted
/// (`InvalidScope`, `ResourceNotFound`).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzServiceError {
    #[error("resource not found: {0}")]
    ResourceNotFound(String),

    #[error("invalid_scope: {0}")]
    InvalidScope(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("failed to decode response: {0}")]
    Decode(String),

    #[error("operation timed out")]
    Timeout,

    #[error("operation cancelled")]
    Cancelled,
}

/// OAuth-style error body (`{"error": "...", "error_description": "..."}`).
#[derive(Debug, Default, Deserialize)]
struct OAuthErrorBody {
    #[serde(default)]
    error: String,
    #[serde(default, alias = "errorMessage")]
    error_description: Option<String>,
}

impl AuthzServiceError {
    /// Classify a non-success HTTP response.
    pub fn from_response(status: u16, body: &str) -> Self {
        let parsed: OAuthErrorBody = serde_json::from_str(body).unwrap_or_default();
        let detail = parsed
            .error_description
            .clone()
            .unwrap_or_else(|| body.trim().to_string());

        match (status, parsed.error.as_str()) {
            (_, "invalid_scope") => Self::InvalidScope(detail),
            (_, "invalid_resource" | "resource_not_found") => Self::ResourceNotFound(detail),
            (404, _) => Self::ResourceNotFound(detail),
            (401, _) => Self::Unauthorized(detail),
            (409, _) => Self::Conflict(detail),
            _ => Self::Status {
                status,
                body: body.to_string(),
            },
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::ResourceNotFound(_))
    }
}

impl StaleMetadataSignal for AuthzServiceError {
    fn signals_stale_metadata(&self) -> bool {
        matches!(self, Self::InvalidScope(_) | Self::ResourceNotFound(_))
    }
}

impl From<reqwest::Error> for AuthzServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            Self::Transport(err.to_string())
        }
    }
}

/// Client boundary to the external (UMA-2.0-flavored) authorization service.
///
/// Resource ids are strings: domain-backed resources reuse the store UUID,
/// group resources use the service's own identifiers.
#[async_trait::async_trait]
pub trait AuthorizationService: Send + Sync {
    /// Register a new protected resource.
    async fn create_resource(&self, resource: &Resource) -> Result<(), AuthzServiceError>;

    /// Idempotent upsert of name, scopes and attributes.
    ///
    /// Updates in place when the resource exists so existing grants survive.
    async fn sync_resource_scopes(&self, resource: &Resource) -> Result<(), AuthzServiceError>;

    /// Delete a resource. Deleting an absent resource succeeds.
    async fn delete_resource(&self, resource_id: &str) -> Result<(), AuthzServiceError>;

    /// Fetch a resource; `ResourceNotFound` when absent.
    async fn get_resource(&self, resource_id: &str) -> Result<Resource, AuthzServiceError>;

    /// Grant `owner_id` the given scopes on a resource.
    async fn create_permission(
        &self,
        resource_id: &str,
        owner_id: &OwnerId,
        scopes: &[Scope],
    ) -> Result<(), AuthzServiceError>;

    /// Evaluate whether the caller holds `scope` on a resource.
    ///
    /// `Ok(false)` is a legitimate denial; `Err` is a service failure.
    async fn check_permission(
        &self,
        caller_token: &str,
        resource_id: &str,
        scope: &str,
    ) -> Result<bool, AuthzServiceError>;
}

#[async_trait::async_trait]
impl<S> AuthorizationService for Arc<S>
where
    S: AuthorizationService + ?Sized,
{
    async fn create_resource(&self, resource: &Resource) -> Result<(), AuthzServiceError> {
        (**self).create_resource(resource).await
    }

    async fn sync_resource_scopes(&self, resource: &Resource) -> Result<(), AuthzServiceError> {
        (**self).sync_resource_scopes(resource).await
    }

    async fn delete_resource(&self, resource_id: &str) -> Result<(), AuthzServiceError> {
        (**self).delete_resource(resource_id).await
    }

    async fn get_resource(&self, resource_id: &str) -> Result<Resource, AuthzServiceError> {
        (**self).get_resource(resource_id).await
    }

    async fn create_permission(
        &self,
        resource_id: &str,
        owner_id: &OwnerId,
        scopes: &[Scope],
    ) -> Result<(), AuthzServiceError> {
        (**self).create_permission(resource_id, owner_id, scopes).await
    }

    async fn check_permission(
        &self,
        caller_token: &str,
        resource_id: &str,
        scope: &str,
    ) -> Result<bool, AuthzServiceError> {
        (**self).check_permission(caller_token, resource_id, scope).await
    }
}
