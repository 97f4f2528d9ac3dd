use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

use crate::context::OperationContext;

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(10_000);
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_millis(15_000);

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),

    #[error("{name} is invalid: {reason}")]
    Invalid { name: &'static str, reason: String },
}

/// Connection settings for the external authorization service.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct AuthzConfig {
    pub base_url: String,
    pub realm: String,
    pub client_id: String,
    pub client_secret: String,
    /// Per-HTTP-request timeout.
    #[serde(default = "default_request_timeout", with = "millis")]
    pub request_timeout: Duration,
    /// Deadline shared by chained external calls of one operation.
    #[serde(default = "default_operation_timeout", with = "millis")]
    pub operation_timeout: Duration,
    #[serde(default)]
    pub database_url: Option<String>,
}

fn default_request_timeout() -> Duration {
    DEFAULT_REQUEST_TIMEOUT
}

fn default_operation_timeout() -> Duration {
    DEFAULT_OPERATION_TIMEOUT
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

impl core::fmt::Debug for AuthzConfig {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("AuthzConfig")
            .field("base_url", &self.base_url)
            .field("realm", &self.realm)
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .field("operation_timeout", &self.operation_timeout)
            .field("database_url", &self.database_url.as_ref().map(|_| "<set>"))
            .finish()
    }
}

impl AuthzConfig {
    pub fn new(
        base_url: impl Into<String>,
        realm: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            realm: realm.into(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            database_url: None,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Fresh context bounded by the configured operation timeout.
    pub fn operation_context(&self) -> OperationContext {
        OperationContext::with_timeout(self.operation_timeout)
    }

    /// Load from `AUTHZ_*` / `DATABASE_URL` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let duration_ms = |name: &'static str, default: Duration| -> Result<Duration, ConfigError> {
            match lookup(name) {
                Some(raw) => raw
                    .trim()
                    .parse::<u64>()
                    .map(Duration::from_millis)
                    .map_err(|e| ConfigError::Invalid {
                        name,
                        reason: e.to_string(),
                    }),
                None => {
                    tracing::info!("{name} not set; using {}ms", default.as_millis());
                    Ok(default)
                }
            }
        };

        let base_url = required("AUTHZ_BASE_URL")?;
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ConfigError::Invalid {
                name: "AUTHZ_BASE_URL",
                reason: format!("expected an http(s) URL, got '{base_url}'"),
            });
        }
        if base_url.starts_with("http://") {
            tracing::warn!("AUTHZ_BASE_URL uses plain http; credentials travel unencrypted");
        }

        let database_url = lookup("DATABASE_URL").filter(|v| !v.trim().is_empty());
        if database_url.is_none() {
            tracing::info!("DATABASE_URL not set; only the in-memory entity store is available");
        }

        Ok(Self {
            base_url,
            realm: required("AUTHZ_REALM")?,
            client_id: required("AUTHZ_CLIENT_ID")?,
            client_secret: required("AUTHZ_CLIENT_SECRET")?,
            request_timeout: duration_ms("AUTHZ_REQUEST_TIMEOUT_MS", DEFAULT_REQUEST_TIMEOUT)?,
            operation_timeout: duration_ms("AUTHZ_OPERATION_TIMEOUT_MS", DEFAULT_OPERATION_TIMEOUT)?,
            database_url,
        })
    }
}
