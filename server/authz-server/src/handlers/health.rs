use crate::server::AuthzServer;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::error;

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub version: String,
    pub uptime: i64,
    pub checks: HashMap<String, String>,
}

/// GET /health: liveness plus a tuple store probe
pub async fn health_check(State(server): State<AuthzServer>) -> (StatusCode, Json<HealthResponse>) {
    let mut checks = HashMap::new();

    let healthy = match server.service.health_check().await {
        Ok(()) => {
            checks.insert("tuple_store".to_string(), "healthy".to_string());
            true
        }
        Err(e) => {
            error!(error = %e, "Tuple store health probe failed");
            checks.insert("tuple_store".to_string(), "unhealthy".to_string());
            false
        }
    };

    let (status_code, status) = if healthy {
        (StatusCode::OK, "healthy")
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unhealthy")
    };

    let response = HealthResponse {
        status: status.to_string(),
        timestamp: chrono::Utc::now(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime: server.uptime_seconds(),
        checks,
    };

    (status_code, Json(response))
}
