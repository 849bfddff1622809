use logger_redacted::LoggerConfig;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Complete service configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub auth: AuthConfig,
    pub storage: StorageConfig,
    pub authorization: AuthorizationSettings,
    pub logging: LoggerConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// How the acting principal is resolved from a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Header carrying the principal id set by the upstream gateway
    pub user_header: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            user_header: "x-user-id".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Memory,
    Postgres,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub database_url: Option<String>,
    pub max_connections: u32,
    /// Create the tuple table on start-up if missing
    pub ensure_schema: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Memory,
            database_url: None,
            max_connections: 10,
            ensure_schema: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthorizationSettings {
    /// Namespace schema file (YAML or JSON); built-in schema when unset
    pub schema_path: Option<PathBuf>,
    pub grant_relation: String,
    pub principal_namespace: String,
    pub max_batch_size: usize,
    /// 0 disables the check cache
    pub check_cache_ttl_ms: u64,
    pub limits: LimitsConfig,
}

impl Default for AuthorizationSettings {
    fn default() -> Self {
        Self {
            schema_path: None,
            grant_relation: "can_delete".to_string(),
            principal_namespace: "user".to_string(),
            max_batch_size: 50,
            check_cache_ttl_ms: 0,
            limits: LimitsConfig::default(),
        }
    }
}

impl AuthorizationSettings {
    pub fn check_cache_ttl(&self) -> Duration {
        Duration::from_millis(self.check_cache_ttl_ms)
    }
}

/// Expansion budget per top-level check or expand
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_depth: usize,
    pub max_nodes: usize,
    pub timeout_ms: u64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_depth: 25,
            max_nodes: 10_000,
            timeout_ms: 2_000,
        }
    }
}

impl LimitsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
