//! Wiring of the authorization services over a store and a service client.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::authz_service::{AuthorizationService, InMemoryAuthzService, KeycloakAuthzClient};
use crate::config::AuthzConfig;
use crate::entity_store::{EntityStore, InMemoryEntityStore, PostgresEntityStore};
use crate::healing::SelfHealingSynchronizer;
use crate::lifecycle::ResourceLifecycleManager;
use crate::resolver::ResourceTypeResolver;
use crate::verifier::PermissionVerifier;

/// The four authorization services, sharing one store and one client.
#[derive(Debug, Clone)]
pub struct AuthzServices<S, A> {
    pub lifecycle: ResourceLifecycleManager<S, A>,
    pub resolver: ResourceTypeResolver<S, A>,
    pub verifier: PermissionVerifier<A>,
    pub healing: SelfHealingSynchronizer<S, A>,
}

pub type InMemoryServices = AuthzServices<Arc<InMemoryEntityStore>, InMemoryAuthzService>;
pub type PersistentServices = AuthzServices<Arc<PostgresEntityStore>, Arc<KeycloakAuthzClient>>;

impl<S, A> AuthzServices<S, A>
where
    S: EntityStore + Clone,
    A: AuthorizationService + Clone,
{
    pub fn new(store: S, authz: A) -> Self {
        Self {
            lifecycle: ResourceLifecycleManager::new(store.clone(), authz.clone()),
            resolver: ResourceTypeResolver::new(store.clone(), authz.clone()),
            verifier: PermissionVerifier::new(authz.clone()),
            healing: SelfHealingSynchronizer::new(store, authz),
        }
    }
}

/// In-memory store and fake service (tests/dev). Returns the backends too so
/// callers can seed or inspect them.
pub fn build_in_memory_services() -> (Arc<InMemoryEntityStore>, InMemoryAuthzService, InMemoryServices) {
    let store = InMemoryEntityStore::arc();
    let authz = InMemoryAuthzService::new();
    let services = AuthzServices::new(store.clone(), authz.clone());
    (store, authz, services)
}

/// Postgres store and Keycloak client from `config`.
pub async fn build_persistent_services(config: &AuthzConfig) -> anyhow::Result<PersistentServices> {
    let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL must be set for persistent services")?;

    let store = PostgresEntityStore::connect(database_url)
        .await
        .context("failed to connect to Postgres")?;
    store
        .apply_schema()
        .await
        .context("failed to apply entity schema")?;

    let authz = KeycloakAuthzClient::new(config).context("failed to build authorization client")?;

    info!(realm = %config.realm, client_id = %config.client_id, "authorization services ready");
    Ok(AuthzServices::new(Arc::new(store), Arc::new(authz)))
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use botforge_auth::ProtectedEntity;
    use botforge_core::{OwnerId, StrategyId};
    use botforge_trading::{Strategy, StrategyLanguage};

    use super::*;
    use crate::context::OperationContext;

    #[tokio::test]
    async fn in_memory_services_share_backends() {
        let (store, authz, services) = build_in_memory_services();
        let ctx = OperationContext::new();
        let owner = OwnerId::new("user-1").unwrap();
        let strategy = Strategy::new(StrategyId::new(), owner, "breakout", StrategyLanguage::Rust, "", Utc::now())
            .unwrap();

        let strategy = services.lifecycle.create_with_resource(&ctx, strategy).await.unwrap();
        assert_eq!(store.len(), 1);
        assert!(authz.resource(&strategy.resource_id()).is_some());
        assert_eq!(
            services
                .verifier
                .check_permission(&ctx, "user-1", &strategy.resource_id(), "run-backtest")
                .await,
            Ok(true)
        );
    }

    #[tokio::test]
    async fn persistent_services_require_a_database_url() {
        let config = AuthzConfig::new("https://sso.example.com", "botforge", "botforge-api", "s3cret");
        let err = build_persistent_services(&config).await.unwrap_err();
        assert!(err.to_string().contains("DATABASE_URL"));
    }
}
