use crate::{
    handlers::{health, permissions},
    server::AuthzServer,
};
use axum::{
    routing::{get, post},
    Router,
};

pub mod paths {
    pub mod health {
        pub const HEALTH: &str = "/health";
    }

    pub mod permissions {
        pub const GRANT: &str = "/api/auth/permissions/grant";
        pub const CHECK: &str = "/api/auth/permissions/check";
        pub const EXPAND: &str = "/api/auth/permissions/expand";
        pub const MINE: &str = "/api/auth/permissions/mine";
    }
}

/// Create health check routes
pub fn health_routes() -> Router<AuthzServer> {
    Router::new().route(paths::health::HEALTH, get(health::health_check))
}

/// Create permission management routes
pub fn permission_routes() -> Router<AuthzServer> {
    Router::new()
        .route(
            paths::permissions::GRANT,
            post(permissions::grant)
                .put(permissions::grant_batch)
                .delete(permissions::revoke),
        )
        .route(paths::permissions::CHECK, post(permissions::check))
        .route(paths::permissions::EXPAND, post(permissions::expand))
        .route(paths::permissions::MINE, get(permissions::my_tuples))
}

/// Create all application routes
pub fn create_routes() -> Router<AuthzServer> {
    Router::new()
        .merge(health_routes())
        .merge(permission_routes())
}
