//! Infrastructure layer: entity storage, the authorization service client and
//! the services that keep the two consistent.
//!
//! - [`lifecycle`]: create/delete entities together with their resources
//! - [`resolver`]: map a resource id back to its type and canonical resource
//! - [`verifier`]: remote permission checks
//! - [`healing`]: resync drifted resources on suspicious check results
//! - [`services`]: wiring over in-memory or Postgres/Keycloak backends

pub mod authz_service;
pub mod config;
pub mod context;
pub mod entity_store;
pub mod healing;
pub mod lifecycle;
pub mod resolver;
pub mod services;
pub mod verifier;


pub use authz_service::{AuthorizationService, AuthzServiceError, InMemoryAuthzService, KeycloakAuthzClient};
pub use config::{AuthzConfig, ConfigError};
pub use context::{Interrupted, OperationContext};
pub use entity_store::{EntityStore, InMemoryEntityStore, PostgresEntityStore, StoreError};
pub use healing::{HealingOutcome, HealingPolicy, SelfHealingSynchronizer, SyncError};
pub use lifecycle::{LifecycleError, PurgeReport, ResourceLifecycleManager};
pub use resolver::{ResolveError, ResolvedResource, ResourceTypeResolver};
pub use services::{AuthzServices, build_in_memory_services, build_persistent_services};
pub use verifier::PermissionVerifier;
