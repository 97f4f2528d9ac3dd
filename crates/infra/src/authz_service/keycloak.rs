//! Keycloak (UMA 2.0) authorization service client.
//!
//! - Resources are managed through the protection API
//!   (`/realms/{realm}/authz/protection/resource_set`), authenticated with a
//!   protection API token obtained by client-credentials grant. The token is
//!   cached until shortly before it expires.
//! - Owner grants use a user-managed policy (`/authz/protection/uma-policy/{id}`).
//! - Permission checks use the UMA ticket grant with `response_mode=decision`,
//!   on behalf of the caller's token. Decisions are never cached.
//!
//! Keycloak requires resource `name`s to be unique per resource server, so the
//! resource id doubles as `name` and the human-readable name travels as
//! `displayName`.

use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, instrument, warn};

use botforge_auth::{Resource, ResourceAttributes, Scope};
use botforge_core::OwnerId;

use super::r#trait::{AuthorizationService, AuthzServiceError};
use crate::config::AuthzConfig;

const UMA_TICKET_GRANT: &str = "urn:ietf:params:oauth:grant-type:uma-ticket";

/// Refresh the protection token this long before it expires.
const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScopeRepresentation {
    name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ResourceRepresentation {
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    name: String,
    #[serde(rename = "displayName", default, skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    kind: Option<String>,
    #[serde(default)]
    resource_scopes: Vec<ScopeRepresentation>,
    #[serde(default)]
    attributes: ResourceAttributes,
    #[serde(rename = "ownerManagedAccess", default)]
    owner_managed_access: bool,
}

impl ResourceRepresentation {
    fn from_resource(resource: &Resource, client_id: &str) -> Self {
        Self {
            id: Some(resource.id.clone()),
            name: resource.id.clone(),
            display_name: Some(resource.name.clone()),
            kind: resource
                .attributes
                .resource_type()
                .map(|t| format!("urn:{client_id}:resources:{t}")),
            resource_scopes: resource
                .scopes
                .iter()
                .map(|s| ScopeRepresentation {
                    name: s.as_str().to_string(),
                })
                .collect(),
            attributes: resource.attributes.clone(),
            owner_managed_access: true,
        }
    }

    fn into_resource(self, requested_id: &str) -> Resource {
        Resource {
            id: self.id.unwrap_or_else(|| requested_id.to_string()),
            name: self.display_name.unwrap_or(self.name),
            scopes: self
                .resource_scopes
                .into_iter()
                .map(|s| Scope::new(s.name))
                .collect(),
            attributes: self.attributes,
        }
    }
}

#[derive(Debug, Serialize)]
struct UmaPolicyRepresentation {
    name: String,
    description: String,
    scopes: Vec<String>,
    users: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expires_in")]
    expires_in: u64,
}

fn default_expires_in() -> u64 {
    60
}

#[derive(Debug, Deserialize)]
struct DecisionResponse {
    #[serde(default)]
    result: bool,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    refresh_at: Instant,
}

/// HTTP client for a Keycloak realm acting as the authorization service.
pub struct KeycloakAuthzClient {
    http: Client,
    realm_url: String,
    client_id: String,
    client_secret: String,
    token: Mutex<Option<CachedToken>>,
}

impl core::fmt::Debug for KeycloakAuthzClient {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("KeycloakAuthzClient")
            .field("realm_url", &self.realm_url)
            .field("client_id", &self.client_id)
            .finish_non_exhaustive()
    }
}

impl KeycloakAuthzClient {
    pub fn new(config: &AuthzConfig) -> Result<Self, AuthzServiceError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthzServiceError::Transport(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            realm_url: format!(
                "{}/realms/{}",
                config.base_url.trim_end_matches('/'),
                config.realm
            ),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
            token: Mutex::new(None),
        })
    }

    fn token_url(&self) -> String {
        format!("{}/protocol/openid-connect/token", self.realm_url)
    }

    fn resource_set_url(&self) -> String {
        format!("{}/authz/protection/resource_set", self.realm_url)
    }

    fn resource_url(&self, resource_id: &str) -> String {
        format!("{}/{}", self.resource_set_url(), resource_id)
    }

    fn uma_policy_url(&self, resource_id: &str) -> String {
        format!("{}/authz/protection/uma-policy/{}", self.realm_url, resource_id)
    }

    /// Protection API token, fetched by client-credentials grant and cached.
    async fn protection_token(&self) -> Result<String, AuthzServiceError> {
        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if Instant::now() < token.refresh_at {
                return Ok(token.access_token.clone());
            }
        }

        debug!("requesting protection API token");
        let response = self
            .http
            .post(self.token_url())
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await?;
        let response = ensure_success(response).await?;
        let token: TokenResponse = response.json().await?;

        let lifetime = Duration::from_secs(token.expires_in).saturating_sub(TOKEN_REFRESH_MARGIN);
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            refresh_at: Instant::now() + lifetime,
        });
        Ok(token.access_token)
    }

    async fn invalidate_token(&self) {
        *self.token.lock().await = None;
    }

    /// Drop the cached token when the service rejects it, so the next call re-authenticates.
    async fn observe<T>(&self, result: Result<T, AuthzServiceError>) -> Result<T, AuthzServiceError> {
        if let Err(AuthzServiceError::Unauthorized(_)) = &result {
            warn!("protection API token rejected; discarding cached token");
            self.invalidate_token().await;
        }
        result
    }

    async fn put_resource(&self, resource: &Resource) -> Result<(), AuthzServiceError> {
        let token = self.protection_token().await?;
        let body = ResourceRepresentation::from_resource(resource, &self.client_id);
        let response = self
            .http
            .put(self.resource_url(&resource.id))
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await.map(drop)
    }

    async fn post_resource(&self, resource: &Resource) -> Result<(), AuthzServiceError> {
        let token = self.protection_token().await?;
        let body = ResourceRepresentation::from_resource(resource, &self.client_id);
        let response = self
            .http
            .post(self.resource_set_url())
            .bearer_auth(token)
            .json(&body)
            .send()
            .await?;
        ensure_success(response).await.map(drop)
    }
}

/// Pass 2xx responses through, classify everything else.
async fn ensure_success(response: Response) -> Result<Response, AuthzServiceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(AuthzServiceError::from_response(status.as_u16(), &body))
}

#[async_trait::async_trait]
impl AuthorizationService for KeycloakAuthzClient {
    #[instrument(skip(self, resource), fields(resource_id = %resource.id), err)]
    async fn create_resource(&self, resource: &Resource) -> Result<(), AuthzServiceError> {
        let result = self.post_resource(resource).await;
        self.observe(result).await
    }

    #[instrument(skip(self, resource), fields(resource_id = %resource.id), err)]
    async fn sync_resource_scopes(&self, resource: &Resource) -> Result<(), AuthzServiceError> {
        let result = match self.put_resource(resource).await {
            Err(AuthzServiceError::ResourceNotFound(_)) => {
                debug!("resource absent on sync; creating it");
                self.post_resource(resource).await
            }
            other => other,
        };
        self.observe(result).await
    }

    #[instrument(skip(self), err)]
    async fn delete_resource(&self, resource_id: &str) -> Result<(), AuthzServiceError> {
        let result = async {
            let token = self.protection_token().await?;
            let response = self
                .http
                .delete(self.resource_url(resource_id))
                .bearer_auth(token)
                .send()
                .await?;
            if response.status() == StatusCode::NOT_FOUND {
                debug!("resource already absent");
                return Ok(());
            }
            ensure_success(response).await.map(drop)
        }
        .await;
        self.observe(result).await
    }

    #[instrument(skip(self), err)]
    async fn get_resource(&self, resource_id: &str) -> Result<Resource, AuthzServiceError> {
        let result = async {
            let token = self.protection_token().await?;
            let response = self
                .http
                .get(self.resource_url(resource_id))
                .bearer_auth(token)
                .send()
                .await?;
            let response = ensure_success(response).await?;
            let repr: ResourceRepresentation = response.json().await?;
            Ok(repr.into_resource(resource_id))
        }
        .await;
        self.observe(result).await
    }

    #[instrument(skip(self, scopes), fields(owner_id = %owner_id, scope_count = scopes.len()), err)]
    async fn create_permission(
        &self,
        resource_id: &str,
        owner_id: &OwnerId,
        scopes: &[Scope],
    ) -> Result<(), AuthzServiceError> {
        let result = async {
            let token = self.protection_token().await?;
            let policy = UmaPolicyRepresentation {
                name: format!("owner-{resource_id}"),
                description: format!("Owner access for {owner_id}"),
                scopes: scopes.iter().map(|s| s.as_str().to_string()).collect(),
                users: vec![owner_id.as_str().to_string()],
            };
            let response = self
                .http
                .post(self.uma_policy_url(resource_id))
                .bearer_auth(token)
                .json(&policy)
                .send()
                .await?;
            ensure_success(response).await.map(drop)
        }
        .await;
        self.observe(result).await
    }

    #[instrument(skip(self, caller_token), err)]
    async fn check_permission(
        &self,
        caller_token: &str,
        resource_id: &str,
        scope: &str,
    ) -> Result<bool, AuthzServiceError> {
        let permission = format!("{resource_id}#{scope}");
        let response = self
            .http
            .post(self.token_url())
            .bearer_auth(caller_token)
            .form(&[
                ("grant_type", UMA_TICKET_GRANT),
                ("audience", self.client_id.as_str()),
                ("permission", permission.as_str()),
                ("response_mode", "decision"),
            ])
            .send()
            .await?;

        if response.status() == StatusCode::FORBIDDEN {
            return Ok(false);
        }
        let response = ensure_success(response).await?;
        let decision: DecisionResponse = response.json().await?;
        Ok(decision.result)
    }
}

#[cfg(test)]
mod tests {
    use mockito::{Matcher, Server, ServerGuard};
    use serde_json::json;

    use botforge_auth::ResourceType;

    use super::*;

    fn client(server: &ServerGuard) -> KeycloakAuthzClient {
        let config = AuthzConfig::new(server.url(), "botforge", "botforge-api", "s3cret");
        KeycloakAuthzClient::new(&config).unwrap()
    }

    async fn mock_token(server: &mut ServerGuard, hits: usize) -> mockito::Mock {
        server
            .mock("POST", "/realms/botforge/protocol/openid-connect/token")
            .match_body(Matcher::UrlEncoded("grant_type".into(), "client_credentials".into()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token":"pat-1","expires_in":300}"#)
            .expect(hits)
            .create_async()
            .await
    }

    fn bot() -> Resource {
        Resource::for_entity(
            ResourceType::Bot,
            "0190b3a2-0000-7000-8000-000000000001",
            "alpha",
            &OwnerId::new("user-1").unwrap(),
            false,
        )
    }

    #[tokio::test]
    async fn create_resource_posts_representation_with_cached_token() {
        let mut server = Server::new_async().await;
        let token = mock_token(&mut server, 1).await;
        let create = server
            .mock("POST", "/realms/botforge/authz/protection/resource_set")
            .match_header("authorization", "Bearer pat-1")
            .match_body(Matcher::PartialJson(json!({
                "_id": "0190b3a2-0000-7000-8000-000000000001",
                "displayName": "Bot: alpha",
                "type": "urn:botforge-api:resources:bot",
                "attributes": {"type": ["bot"], "ownerId": ["user-1"], "public": ["false"]}
            })))
            .with_status(201)
            .expect(2)
            .create_async()
            .await;

        let client = client(&server);
        client.create_resource(&bot()).await.unwrap();
        client.create_resource(&bot()).await.unwrap();

        token.assert_async().await;
        create.assert_async().await;
    }

    #[tokio::test]
    async fn get_resource_maps_display_name_and_scopes() {
        let mut server = Server::new_async().await;
        let _token = mock_token(&mut server, 1).await;
        let _group = server
            .mock("GET", "/realms/botforge/authz/protection/resource_set/grp-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "_id": "grp-1",
                    "name": "grp-1",
                    "displayName": "Desk A",
                    "resource_scopes": [{"name": "view"}],
                    "attributes": {"type": ["group"], "ownerId": ["admin-7"]}
                })
                .to_string(),
            )
            .create_async()
            .await;
        let _missing = server
            .mock("GET", "/realms/botforge/authz/protection/resource_set/missing")
            .with_status(404)
            .create_async()
            .await;

        let client = client(&server);
        let resource = client.get_resource("grp-1").await.unwrap();
        assert_eq!(resource.name, "Desk A");
        assert_eq!(resource.scopes, vec![Scope::new("view")]);
        assert_eq!(resource.attributes.owner_id(), Some("admin-7"));

        assert!(client.get_resource("missing").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn delete_of_absent_resource_succeeds() {
        let mut server = Server::new_async().await;
        let _token = mock_token(&mut server, 1).await;
        let _gone = server
            .mock("DELETE", "/realms/botforge/authz/protection/resource_set/gone")
            .with_status(404)
            .create_async()
            .await;

        client(&server).delete_resource("gone").await.unwrap();
    }

    #[tokio::test]
    async fn sync_falls_back_to_create_when_resource_is_missing() {
        let mut server = Server::new_async().await;
        let _token = mock_token(&mut server, 1).await;
        let r = bot();
        let put = server
            .mock("PUT", format!("/realms/botforge/authz/protection/resource_set/{}", r.id).as_str())
            .with_status(404)
            .create_async()
            .await;
        let post = server
            .mock("POST", "/realms/botforge/authz/protection/resource_set")
            .with_status(201)
            .create_async()
            .await;

        client(&server).sync_resource_scopes(&r).await.unwrap();
        put.assert_async().await;
        post.assert_async().await;
    }

    #[tokio::test]
    async fn decision_mapping_keeps_denial_and_failure_apart() {
        let mut server = Server::new_async().await;
        let decision = |permission: &str| {
            Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), UMA_TICKET_GRANT.into()),
                Matcher::UrlEncoded("permission".into(), permission.into()),
                Matcher::UrlEncoded("response_mode".into(), "decision".into()),
            ])
        };
        let _granted = server
            .mock("POST", "/realms/botforge/protocol/openid-connect/token")
            .match_body(decision("r-1#view"))
            .with_status(200)
            .with_body(r#"{"result":true}"#)
            .create_async()
            .await;
        let _denied = server
            .mock("POST", "/realms/botforge/protocol/openid-connect/token")
            .match_body(decision("r-1#edit"))
            .with_status(403)
            .with_body(r#"{"error":"access_denied","error_description":"not_authorized"}"#)
            .create_async()
            .await;
        let _invalid = server
            .mock("POST", "/realms/botforge/protocol/openid-connect/token")
            .match_body(decision("r-1#run-backtest"))
            .with_status(400)
            .with_body(r#"{"error":"invalid_scope","error_description":"Invalid scopes: run-backtest"}"#)
            .create_async()
            .await;

        let client = client(&server);
        assert!(client.check_permission("user-token", "r-1", "view").await.unwrap());
        assert!(!client.check_permission("user-token", "r-1", "edit").await.unwrap());
        assert_eq!(
            client.check_permission("user-token", "r-1", "run-backtest").await,
            Err(AuthzServiceError::InvalidScope("Invalid scopes: run-backtest".into()))
        );
    }

    #[tokio::test]
    async fn rejected_protection_token_is_discarded() {
        let mut server = Server::new_async().await;
        let token = mock_token(&mut server, 2).await;
        let _expired = server
            .mock("DELETE", "/realms/botforge/authz/protection/resource_set/r-1")
            .with_status(401)
            .with_body("token expired")
            .expect(2)
            .create_async()
            .await;

        let client = client(&server);
        assert!(matches!(
            client.delete_resource("r-1").await,
            Err(AuthzServiceError::Unauthorized(_))
        ));
        assert!(client.delete_resource("r-1").await.is_err());
        token.assert_async().await;
    }
}
