mod in_memory;
mod keycloak;
mod r#trait;

pub use in_memory::{InMemoryAuthzService, ServiceCall, ServiceOperation};
pub use keycloak::KeycloakAuthzClient;
pub use r#trait::{AuthorizationService, AuthzServiceError};
