// Logger configuration
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,
    /// Structured JSON output instead of human-readable lines
    pub json: bool,
    /// Redact PII from free-text fields logged at the HTTP boundary
    pub redaction_enabled: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            redaction_enabled: true,
        }
    }
}

impl LoggerConfig {
    /// Filter used when `RUST_LOG` is not set: our crates at `level`,
    /// noisy dependencies kept quieter
    pub fn default_directives(&self) -> String {
        format!(
            "authz_server={level},auth_zanzibar={level},config_engine={level},tower_http=info,sqlx=warn",
            level = self.level
        )
    }
}
