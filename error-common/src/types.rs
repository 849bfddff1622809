use thiserror::Error;

/// Process-level errors: bootstrap, configuration and infrastructure.
///
/// Request-scoped authorization failures use the engine's own error type;
/// this enum covers everything that can stop the service from running.
#[derive(Error, Debug)]
pub enum FreeflowError {
    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Network bind or listener errors
    #[error("Network error: {0}")]
    NetworkError(String),

    /// Server start-up and shutdown errors
    #[error("Server error: {0}")]
    ServerError(String),

    /// Storage bootstrap errors (connect, schema creation)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Namespace schema could not be loaded
    #[error("Schema error: {0}")]
    SchemaError(String),

    /// Internal system errors
    #[error("Internal error: {0}")]
    InternalError(String),

    /// Wrapped external errors
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FreeflowError {
    /// Stable code for this error, see [`crate::codes`]
    pub fn code(&self) -> &'static str {
        use crate::codes::*;
        match self {
            FreeflowError::ConfigError(_) => system::CONFIGURATION_INVALID,
            FreeflowError::NetworkError(_) => system::BIND_FAILED,
            FreeflowError::ServerError(_) => system::SERVER_FAILURE,
            FreeflowError::StorageError(_) => storage::CONNECTION_FAILED,
            FreeflowError::SchemaError(_) => schema::SCHEMA_INVALID,
            FreeflowError::InternalError(_) | FreeflowError::Other(_) => system::INTERNAL,
        }
    }
}

/// Result type alias for Freeflow service operations
pub type Result<T> = std::result::Result<T, FreeflowError>;

/// Async logging function for errors
pub async fn log_error(context: &str, error: &FreeflowError) {
    tracing::error!(
        context = context,
        error_code = error.code(),
        error = %error,
        "Freeflow error occurred"
    );
}
