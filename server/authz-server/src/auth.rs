//! Principal resolution
//!
//! Session handling lives upstream; this service only needs to know which
//! principal a request acts for. [`SessionResolver`] is the seam, and
//! [`TrustedHeaderResolver`] reads the id from a header set by the gateway.

use crate::error::ApiError;
use crate::server::AuthzServer;
use async_trait::async_trait;
use axum::{
    extract::FromRequestParts,
    http::{header::HeaderName, request::Parts, HeaderMap},
};
use tracing::debug;

/// Resolves the acting principal of a request
#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// `Ok(None)` when the request carries no usable session
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<String>, ApiError>;
}

/// Trusts a header populated by an authenticating proxy
#[derive(Debug, Clone)]
pub struct TrustedHeaderResolver {
    header: HeaderName,
}

impl TrustedHeaderResolver {
    pub const DEFAULT_HEADER: &'static str = "x-user-id";

    pub fn new(header: &str) -> Result<Self, ApiError> {
        let header = HeaderName::from_bytes(header.trim().to_ascii_lowercase().as_bytes())
            .map_err(|e| ApiError::internal(format!("Invalid principal header '{}': {}", header, e)))?;
        Ok(Self { header })
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }
}

impl Default for TrustedHeaderResolver {
    fn default() -> Self {
        Self {
            header: HeaderName::from_static(Self::DEFAULT_HEADER),
        }
    }
}

#[async_trait]
impl SessionResolver for TrustedHeaderResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<String>, ApiError> {
        let principal = headers
            .get(&self.header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        if principal.is_none() {
            debug!(header = %self.header, "No principal on request");
        }
        Ok(principal)
    }
}

/// The authenticated principal id; rejects with 401 when none resolves
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser(pub String);

impl AuthenticatedUser {
    pub fn id(&self) -> &str {
        &self.0
    }
}

#[async_trait]
impl FromRequestParts<AuthzServer> for AuthenticatedUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AuthzServer) -> Result<Self, Self::Rejection> {
        state
            .sessions
            .resolve(&parts.headers)
            .await?
            .map(AuthenticatedUser)
            .ok_or(ApiError::AuthenticationRequired)
    }
}
