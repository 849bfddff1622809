use crate::auth::{SessionResolver, TrustedHeaderResolver};
use auth_zanzibar::{
    repository::{InMemoryTupleStore, PostgresTupleStore, TupleStore},
    AuthorizationConfig, AuthorizationService, ExpansionLimits, NamespaceRegistry,
};
use chrono::{DateTime, Utc};
use config_engine::{ServiceConfig, StorageBackend};
use error_common::{FreeflowError, Result};
use std::sync::Arc;
use tracing::{error, info, warn};

/// Shared state handed to every handler
#[derive(Clone)]
pub struct AuthzServer {
    /// Authorization engine with its store and schema
    pub service: Arc<AuthorizationService>,
    /// Resolves the acting principal of a request
    pub sessions: Arc<dyn SessionResolver>,
    /// Process start, reported by `/health`
    pub started_at: DateTime<Utc>,
}

impl AuthzServer {
    pub fn new(service: Arc<AuthorizationService>, sessions: Arc<dyn SessionResolver>) -> Self {
        Self {
            service,
            sessions,
            started_at: Utc::now(),
        }
    }

    /// Build the store, schema and engine described by `config`
    pub async fn from_config(config: &ServiceConfig) -> Result<Self> {
        let store = build_store(config).await?;
        let registry = load_registry(config)?;
        let service = AuthorizationService::new(store, Arc::new(registry), authorization_config(config));

        let sessions = TrustedHeaderResolver::new(&config.auth.user_header)
            .map_err(|e| FreeflowError::ConfigError(e.to_string()))?;
        info!(header = %sessions.header(), "Principal resolved from trusted header");

        Ok(Self::new(Arc::new(service), Arc::new(sessions)))
    }

    pub fn uptime_seconds(&self) -> i64 {
        (Utc::now() - self.started_at).num_seconds()
    }
}

async fn build_store(config: &ServiceConfig) -> Result<Arc<dyn TupleStore>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            warn!("Using in-memory tuple store; tuples are lost on restart");
            Ok(Arc::new(InMemoryTupleStore::new()))
        }
        StorageBackend::Postgres => {
            let url = config.storage.database_url.as_deref().ok_or_else(|| {
                FreeflowError::ConfigError("storage.database_url is required for postgres".to_string())
            })?;

            let store = PostgresTupleStore::connect(url, config.storage.max_connections)
                .await
                .map_err(|e| {
                    error!(error = %logger_redacted::redact(&e.to_string()), "Tuple store unavailable");
                    FreeflowError::StorageError(e.to_string())
                })?;
            if config.storage.ensure_schema {
                store
                    .ensure_schema()
                    .await
                    .map_err(|e| FreeflowError::StorageError(e.to_string()))?;
            }

            info!(max_connections = config.storage.max_connections, "Connected to PostgreSQL tuple store");
            Ok(Arc::new(store))
        }
    }
}

fn load_registry(config: &ServiceConfig) -> Result<NamespaceRegistry> {
    match &config.authorization.schema_path {
        Some(path) => {
            let registry = NamespaceRegistry::from_path(path).map_err(|e| {
                error!(path = %path.display(), error = %e, "Failed to load namespace schema");
                FreeflowError::SchemaError(e.to_string())
            })?;
            info!(path = %path.display(), "Namespace schema loaded");
            Ok(registry)
        }
        None => {
            info!("Using built-in namespace schema");
            Ok(NamespaceRegistry::freeflow_default())
        }
    }
}

fn authorization_config(config: &ServiceConfig) -> AuthorizationConfig {
    let settings = &config.authorization;
    AuthorizationConfig {
        grant_relation: settings.grant_relation.clone(),
        principal_namespace: settings.principal_namespace.clone(),
        max_batch_size: settings.max_batch_size,
        check_cache_ttl: settings.check_cache_ttl(),
        limits: ExpansionLimits {
            max_depth: settings.limits.max_depth,
            max_nodes: settings.limits.max_nodes,
            timeout: settings.limits.timeout(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_authorization_config_follows_settings() {
        let mut config = ServiceConfig::default();
        config.authorization.max_batch_size = 10;
        config.authorization.check_cache_ttl_ms = 250;
        config.authorization.limits.max_depth = 8;
        config.authorization.limits.timeout_ms = 500;

        let built = authorization_config(&config);
        assert_eq!(built.grant_relation, "can_delete");
        assert_eq!(built.max_batch_size, 10);
        assert_eq!(built.check_cache_ttl, Duration::from_millis(250));
        assert_eq!(built.limits.max_depth, 8);
        assert_eq!(built.limits.timeout, Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_memory_backend_from_defaults() {
        let server = AuthzServer::from_config(&ServiceConfig::default()).await.unwrap();
        assert!(server.service.health_check().await.is_ok());
        assert!(server.uptime_seconds() >= 0);
    }

    #[tokio::test]
    async fn test_postgres_without_url_is_config_error() {
        let mut config = ServiceConfig::default();
        config.storage.backend = StorageBackend::Postgres;
        config.storage.database_url = None;

        let result = AuthzServer::from_config(&config).await;
        assert!(matches!(result, Err(FreeflowError::ConfigError(_))));
    }

    #[tokio::test]
    async fn test_missing_schema_file_is_schema_error() {
        let mut config = ServiceConfig::default();
        config.authorization.schema_path = Some("/nonexistent/freeflow-schema.yaml".into());

        let result = AuthzServer::from_config(&config).await;
        assert!(matches!(result, Err(FreeflowError::SchemaError(_))));
    }
}
