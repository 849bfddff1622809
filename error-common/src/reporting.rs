// Error reporting utilities
// Every client-visible failure carries an id that also appears in the logs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Correlatable description of one failure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorReport {
    pub error_id: Uuid,
    pub error_type: String,
    pub code: String,
    pub message: String,
    pub occurred_at: DateTime<Utc>,
}

impl ErrorReport {
    pub fn new(error_type: &str, code: &str, message: impl Into<String>) -> Self {
        Self {
            error_id: Uuid::new_v4(),
            error_type: error_type.to_string(),
            code: code.to_string(),
            message: message.into(),
            occurred_at: Utc::now(),
        }
    }

    /// Log at `error` for server faults, `warn` otherwise
    pub fn log(&self, server_fault: bool) {
        if server_fault {
            tracing::error!(
                error_id = %self.error_id,
                error_type = %self.error_type,
                error_code = %self.code,
                "Error reported: {}",
                self.message
            );
        } else {
            tracing::warn!(
                error_id = %self.error_id,
                error_type = %self.error_type,
                error_code = %self.code,
                "Request rejected: {}",
                self.message
            );
        }
    }
}
