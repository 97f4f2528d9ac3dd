use std::collections::{BTreeSet, HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use botforge_auth::resource::ATTR_PUBLIC;
use botforge_auth::{Resource, Scope};
use botforge_core::OwnerId;

use super::r#trait::{AuthorizationService, AuthzServiceError};

/// Operations of the authorization service, used for failure injection.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ServiceOperation {
    CreateResource,
    SyncResourceScopes,
    DeleteResource,
    GetResource,
    CreatePermission,
    CheckPermission,
}

/// A call observed by [`InMemoryAuthzService`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServiceCall {
    CreateResource(Resource),
    SyncResourceScopes(Resource),
    DeleteResource(String),
    GetResource(String),
    CreatePermission {
        resource_id: String,
        owner_id: OwnerId,
        scopes: Vec<Scope>,
    },
    CheckPermission {
        subject: String,
        resource_id: String,
        scope: String,
    },
}

#[derive(Debug, Default)]
struct State {
    resources: HashMap<String, Resource>,
    /// (resource id, subject) -> granted scopes
    grants: HashMap<(String, String), BTreeSet<String>>,
    calls: Vec<ServiceCall>,
    failures: HashMap<ServiceOperation, VecDeque<AuthzServiceError>>,
}

/// In-memory authorization service.
///
/// Intended for tests/dev. Caller tokens are taken to be the subject id
/// directly. Evaluation rules:
/// - unknown resource → `ResourceNotFound`
/// - scope not defined on the resource → `InvalidScope`
/// - otherwise granted iff the subject holds the scope, or the resource is
///   public and the scope is `view`
#[derive(Debug, Default, Clone)]
pub struct InMemoryAuthzService {
    state: Arc<Mutex<State>>,
    latency: Option<Duration>,
}

impl InMemoryAuthzService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every call by `latency` (for deadline tests).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Make the next call of `op` fail with `err`. Queued failures are consumed in order.
    pub fn fail_next(&self, op: ServiceOperation, err: AuthzServiceError) {
        self.lock().failures.entry(op).or_default().push_back(err);
    }

    /// Store a resource directly, bypassing the call log (seeds drifted state).
    pub fn insert_resource(&self, resource: Resource) {
        self.lock().resources.insert(resource.id.clone(), resource);
    }

    /// Overwrite the scopes of a stored resource (simulates drift).
    pub fn set_scopes(&self, resource_id: &str, scopes: Vec<Scope>) {
        if let Some(r) = self.lock().resources.get_mut(resource_id) {
            r.scopes = scopes;
        }
    }

    pub fn resource(&self, resource_id: &str) -> Option<Resource> {
        self.lock().resources.get(resource_id).cloned()
    }

    pub fn granted_scopes(&self, resource_id: &str, subject: &str) -> BTreeSet<String> {
        self.lock()
            .grants
            .get(&(resource_id.to_string(), subject.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    pub fn calls(&self) -> Vec<ServiceCall> {
        self.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Number of logged calls matching `pred`.
    pub fn count_calls(&self, pred: impl Fn(&ServiceCall) -> bool) -> usize {
        self.lock().calls.iter().filter(|c| pred(c)).count()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panic while holding the lock only happens in a failing test; keep going.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn enter(&self, op: ServiceOperation, call: ServiceCall) -> Result<(), AuthzServiceError> {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let mut state = self.lock();
        state.calls.push(call);
        match state.failures.get_mut(&op).and_then(VecDeque::pop_front) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl AuthorizationService for InMemoryAuthzService {
    async fn create_resource(&self, resource: &Resource) -> Result<(), AuthzServiceError> {
        self.enter(ServiceOperation::CreateResource, ServiceCall::CreateResource(resource.clone()))
            .await?;

        let mut state = self.lock();
        if state.resources.contains_key(&resource.id) {
            return Err(AuthzServiceError::Conflict(format!(
                "resource {} already exists",
                resource.id
            )));
        }
        state.resources.insert(resource.id.clone(), resource.clone());
        Ok(())
    }

    async fn sync_resource_scopes(&self, resource: &Resource) -> Result<(), AuthzServiceError> {
        self.enter(
            ServiceOperation::SyncResourceScopes,
            ServiceCall::SyncResourceScopes(resource.clone()),
        )
        .await?;

        self.lock()
            .resources
            .insert(resource.id.clone(), resource.clone());
        Ok(())
    }

    async fn delete_resource(&self, resource_id: &str) -> Result<(), AuthzServiceError> {
        self.enter(
            ServiceOperation::DeleteResource,
            ServiceCall::DeleteResource(resource_id.to_string()),
        )
        .await?;

        let mut state = self.lock();
        state.resources.remove(resource_id);
        state.grants.retain(|(rid, _), _| rid != resource_id);
        Ok(())
    }

    async fn get_resource(&self, resource_id: &str) -> Result<Resource, AuthzServiceError> {
        self.enter(
            ServiceOperation::GetResource,
            ServiceCall::GetResource(resource_id.to_string()),
        )
        .await?;

        self.lock()
            .resources
            .get(resource_id)
            .cloned()
            .ok_or_else(|| AuthzServiceError::ResourceNotFound(resource_id.to_string()))
    }

    async fn create_permission(
        &self,
        resource_id: &str,
        owner_id: &OwnerId,
        scopes: &[Scope],
    ) -> Result<(), AuthzServiceError> {
        self.enter(
            ServiceOperation::CreatePermission,
            ServiceCall::CreatePermission {
                resource_id: resource_id.to_string(),
                owner_id: owner_id.clone(),
                scopes: scopes.to_vec(),
            },
        )
        .await?;

        let mut state = self.lock();
        if !state.resources.contains_key(resource_id) {
            return Err(AuthzServiceError::ResourceNotFound(resource_id.to_string()));
        }
        state
            .grants
            .entry((resource_id.to_string(), owner_id.as_str().to_string()))
            .or_default()
            .extend(scopes.iter().map(|s| s.as_str().to_string()));
        Ok(())
    }

    async fn check_permission(
        &self,
        caller_token: &str,
        resource_id: &str,
        scope: &str,
    ) -> Result<bool, AuthzServiceError> {
        self.enter(
            ServiceOperation::CheckPermission,
            ServiceCall::CheckPermission {
                subject: caller_token.to_string(),
                resource_id: resource_id.to_string(),
                scope: scope.to_string(),
            },
        )
        .await?;

        let state = self.lock();
        let resource = state
            .resources
            .get(resource_id)
            .ok_or_else(|| AuthzServiceError::ResourceNotFound(resource_id.to_string()))?;

        if !resource.has_scope(scope) {
            return Err(AuthzServiceError::InvalidScope(format!(
                "scope '{scope}' is not defined on resource {resource_id}"
            )));
        }

        let publicly_visible = scope == "view" && resource.attributes.first(ATTR_PUBLIC) == Some("true");
        let granted = state
            .grants
            .get(&(resource_id.to_string(), caller_token.to_string()))
            .is_some_and(|scopes| scopes.contains(scope));

        Ok(granted || publicly_visible)
    }
}
