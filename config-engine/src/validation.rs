//! Configuration validation
//!
//! Rejects values that would start a service which cannot work

use crate::settings::*;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid server host: must not be empty")]
    EmptyHost,

    #[error("Invalid port: 0")]
    InvalidPort,

    #[error("Invalid user header '{0}'")]
    InvalidUserHeader(String),

    #[error("Missing database_url for backend: postgres")]
    MissingDatabaseUrl,

    #[error("Invalid max_connections: {0} (must be > 0)")]
    InvalidMaxConnections(u32),

    #[error("Invalid {0}: must not be empty")]
    EmptySetting(&'static str),

    #[error("Invalid max_batch_size: {0} (must be > 0)")]
    InvalidBatchSize(usize),

    #[error("Invalid expansion limit {0}: must be > 0")]
    InvalidLimit(&'static str),

    #[error("Invalid log level: {0} (must be one of: trace, debug, info, warn, error)")]
    InvalidLogLevel(String),

    #[error("Multiple validation errors: {0:?}")]
    Multiple(Vec<ValidationError>),
}

/// Result type alias for validation operations
pub type Result<T> = std::result::Result<T, ValidationError>;

/// Validate complete configuration
pub fn validate(config: &ServiceConfig) -> Result<()> {
    let mut errors: Vec<ValidationError> = [
        validate_server(&config.server),
        validate_auth(&config.auth),
        validate_storage(&config.storage),
        validate_authorization(&config.authorization),
        validate_logging(&config.logging.level),
    ]
    .into_iter()
    .filter_map(|r| r.err())
    .collect();

    match errors.len() {
        0 => Ok(()),
        1 => Err(errors.remove(0)),
        _ => Err(ValidationError::Multiple(errors)),
    }
}

pub fn validate_server(config: &ServerConfig) -> Result<()> {
    if config.host.trim().is_empty() {
        return Err(ValidationError::EmptyHost);
    }
    if config.port == 0 {
        return Err(ValidationError::InvalidPort);
    }
    Ok(())
}

pub fn validate_auth(config: &AuthConfig) -> Result<()> {
    let header = &config.user_header;
    let valid = !header.is_empty()
        && header
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if !valid {
        return Err(ValidationError::InvalidUserHeader(header.clone()));
    }
    Ok(())
}

pub fn validate_storage(config: &StorageConfig) -> Result<()> {
    if config.backend == StorageBackend::Postgres
        && config.database_url.as_deref().map_or(true, |url| url.trim().is_empty())
    {
        return Err(ValidationError::MissingDatabaseUrl);
    }
    if config.max_connections == 0 {
        return Err(ValidationError::InvalidMaxConnections(config.max_connections));
    }
    Ok(())
}

pub fn validate_authorization(config: &AuthorizationSettings) -> Result<()> {
    if config.grant_relation.trim().is_empty() {
        return Err(ValidationError::EmptySetting("grant_relation"));
    }
    if config.principal_namespace.trim().is_empty() {
        return Err(ValidationError::EmptySetting("principal_namespace"));
    }
    if config.max_batch_size == 0 {
        return Err(ValidationError::InvalidBatchSize(config.max_batch_size));
    }
    if config.limits.max_depth == 0 {
        return Err(ValidationError::InvalidLimit("max_depth"));
    }
    if config.limits.max_nodes == 0 {
        return Err(ValidationError::InvalidLimit("max_nodes"));
    }
    if config.limits.timeout_ms == 0 {
        return Err(ValidationError::InvalidLimit("timeout_ms"));
    }
    Ok(())
}

/// Validate logging level
pub fn validate_logging(level: &str) -> Result<()> {
    match level.to_lowercase().as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ValidationError::InvalidLogLevel(level.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(validate(&ServiceConfig::default()).is_ok());
    }

    #[test]
    fn test_postgres_requires_url() {
        let mut config = ServiceConfig::default();
        config.storage.backend = StorageBackend::Postgres;
        assert!(matches!(validate(&config), Err(ValidationError::MissingDatabaseUrl)));

        config.storage.database_url = Some("postgres://localhost/freeflow".to_string());
        assert!(validate(&config).is_ok());
    }

    #[test]
    fn test_collects_multiple_errors() {
        let mut config = ServiceConfig::default();
        config.server.port = 0;
        config.authorization.max_batch_size = 0;
        config.logging.level = "loud".to_string();

        match validate(&config) {
            Err(ValidationError::Multiple(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected multiple errors, got {:?}", other),
        }
    }

    #[test]
    fn test_user_header_charset() {
        let config = AuthConfig {
            user_header: "x user".to_string(),
        };
        assert!(validate_auth(&config).is_err());
    }
}
