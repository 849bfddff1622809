//! Freeflow authorization server
//!
//! HTTP surface over [`auth_zanzibar::AuthorizationService`]: tuple grants,
//! revokes, checks and expansion, plus a health probe. The acting principal
//! is resolved per request by a [`auth::SessionResolver`].

pub mod auth;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;

pub use error::*;
pub use server::AuthzServer;

use axum::Router;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

/// Create the main application router with all routes and middleware
pub fn create_app(server: AuthzServer) -> Router {
    routes::create_routes()
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
        .with_state(server)
}
