//! Permission Management Handlers
//!
//! Tuple grants, revokes and checks over the authorization engine.
//! Request bodies are validated here; malformed shapes never reach it.

use crate::auth::AuthenticatedUser;
use crate::error::ApiError;
use crate::server::AuthzServer;
use auth_zanzibar::{
    BatchWriteResponse, CheckRequest, CheckResponse, Expansion, ObjectRef, StoredTuple, TupleKey,
    WriteResult, WriteTupleRequest, ZanzibarError,
};
use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

// ============================================================================
// Request Bodies
// ============================================================================

/// Grant or revoke body; every field optional until validated
#[derive(Debug, Default, Deserialize)]
pub struct GrantPayload {
    pub namespace: Option<String>,
    pub object_id: Option<String>,
    pub relation: Option<String>,
    /// Defaults to the principal namespace
    pub subject_namespace: Option<String>,
    pub subject_id: Option<String>,
    pub subject_relation: Option<String>,
}

impl GrantPayload {
    pub fn into_key(self, default_subject_namespace: &str) -> Result<TupleKey, ZanzibarError> {
        let mut missing = Vec::new();
        let namespace = required(self.namespace, "namespace", &mut missing);
        let object_id = required(self.object_id, "object_id", &mut missing);
        let relation = required(self.relation, "relation", &mut missing);
        let subject_id = required(self.subject_id, "subject_id", &mut missing);
        ensure_present(&missing)?;

        Ok(TupleKey {
            namespace,
            object_id,
            relation,
            subject_namespace: present(self.subject_namespace)
                .unwrap_or_else(|| default_subject_namespace.to_string()),
            subject_id,
            subject_relation: present(self.subject_relation),
        })
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct CheckPayload {
    pub namespace: Option<String>,
    pub object_id: Option<String>,
    pub relation: Option<String>,
    pub subject_namespace: Option<String>,
    /// Defaults to the authenticated principal
    pub subject_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExpandPayload {
    pub namespace: Option<String>,
    pub object_id: Option<String>,
    pub relation: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct MineQuery {
    pub relation: Option<String>,
}

fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

fn required(value: Option<String>, field: &'static str, missing: &mut Vec<&'static str>) -> String {
    present(value).unwrap_or_else(|| {
        missing.push(field);
        String::new()
    })
}

fn ensure_present(missing: &[&str]) -> Result<(), ZanzibarError> {
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ZanzibarError::Validation(format!(
            "Missing required fields: {}",
            missing.join(", ")
        )))
    }
}

// ============================================================================
// Responses
// ============================================================================

#[derive(Debug, Serialize)]
pub struct GrantResponse {
    pub success: bool,
    pub tuple: StoredTuple,
}

#[derive(Debug, Serialize)]
pub struct BatchGrantResponse {
    pub success: bool,
    #[serde(flatten)]
    pub batch: BatchWriteResponse,
}

#[derive(Debug, Serialize)]
pub struct RevokeResponse {
    pub success: bool,
    pub deleted: bool,
}

#[derive(Debug, Serialize)]
pub struct SubjectTuplesResponse {
    pub success: bool,
    pub tuples: Vec<StoredTuple>,
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/permissions/grant
pub async fn grant(
    State(server): State<AuthzServer>,
    user: AuthenticatedUser,
    payload: Result<Json<GrantPayload>, JsonRejection>,
) -> Result<Json<GrantResponse>, ApiError> {
    let Json(payload) = payload?;
    let key = payload.into_key(&server.service.config().principal_namespace)?;

    let tuple = server
        .service
        .write_tuple(WriteTupleRequest::new(key, user.id()))
        .await?;

    Ok(Json(GrantResponse { success: true, tuple }))
}

/// PUT /api/auth/permissions/grant
///
/// Items are validated and written independently; the response carries
/// one result per submitted grant, in order.
pub async fn grant_batch(
    State(server): State<AuthzServer>,
    user: AuthenticatedUser,
    payload: Result<Json<Value>, JsonRejection>,
) -> Result<Json<BatchGrantResponse>, ApiError> {
    let Json(payload) = payload?;
    let grants = payload
        .get("grants")
        .and_then(Value::as_array)
        .ok_or_else(|| ZanzibarError::Validation("grants must be an array".to_string()))?;

    let max = server.service.config().max_batch_size;
    if grants.len() > max {
        return Err(ZanzibarError::Validation(format!(
            "Batch size {} exceeds maximum of {}",
            grants.len(),
            max
        ))
        .into());
    }

    let principal_namespace = &server.service.config().principal_namespace;
    let parsed: Vec<Result<WriteTupleRequest, String>> = grants
        .iter()
        .map(|item| {
            serde_json::from_value::<GrantPayload>(item.clone())
                .map_err(|e| ZanzibarError::Validation(format!("Invalid grant: {}", e)))
                .and_then(|grant| grant.into_key(principal_namespace))
                .map(|key| WriteTupleRequest::new(key, user.id()))
                .map_err(|e| e.to_string())
        })
        .collect();

    let valid: Vec<WriteTupleRequest> = parsed.iter().filter_map(|r| r.as_ref().ok().cloned()).collect();
    let written = server.service.write_tuples(valid).await?;

    let mut written = written.results.into_iter();
    let results = parsed
        .into_iter()
        .map(|item| match item {
            Ok(_) => written
                .next()
                .unwrap_or_else(|| WriteResult::failed("Internal error: missing batch result")),
            Err(message) => WriteResult::failed(message),
        })
        .collect();

    let batch = BatchWriteResponse::from_results(results);
    info!(
        actor = %user.id(),
        total = batch.summary.total,
        succeeded = batch.summary.succeeded,
        "Batch grant processed"
    );
    Ok(Json(BatchGrantResponse { success: true, batch }))
}

/// DELETE /api/auth/permissions/grant
pub async fn revoke(
    State(server): State<AuthzServer>,
    user: AuthenticatedUser,
    payload: Result<Json<GrantPayload>, JsonRejection>,
) -> Result<Json<RevokeResponse>, ApiError> {
    let Json(payload) = payload?;
    let key = payload.into_key(&server.service.config().principal_namespace)?;

    let deleted = server.service.delete_tuple(&key, user.id()).await?;
    Ok(Json(RevokeResponse { success: true, deleted }))
}

/// POST /api/auth/permissions/check
pub async fn check(
    State(server): State<AuthzServer>,
    user: AuthenticatedUser,
    payload: Result<Json<CheckPayload>, JsonRejection>,
) -> Result<Json<CheckResponse>, ApiError> {
    let Json(payload) = payload?;
    let mut missing = Vec::new();
    let namespace = required(payload.namespace, "namespace", &mut missing);
    let object_id = required(payload.object_id, "object_id", &mut missing);
    let relation = required(payload.relation, "relation", &mut missing);
    ensure_present(&missing)?;

    let request = CheckRequest {
        namespace,
        object_id,
        relation,
        subject_namespace: present(payload.subject_namespace)
            .unwrap_or_else(|| server.service.config().principal_namespace.clone()),
        subject_id: present(payload.subject_id).unwrap_or_else(|| user.id().to_string()),
    };

    let response = server.service.check(&request).await?;
    Ok(Json(response))
}

/// POST /api/auth/permissions/expand
///
/// Listing every holder of a relation is an administrative read, so the
/// principal must hold the grant relation on the object.
pub async fn expand(
    State(server): State<AuthzServer>,
    user: AuthenticatedUser,
    payload: Result<Json<ExpandPayload>, JsonRejection>,
) -> Result<Json<Expansion>, ApiError> {
    let Json(payload) = payload?;
    let mut missing = Vec::new();
    let namespace = required(payload.namespace, "namespace", &mut missing);
    let object_id = required(payload.object_id, "object_id", &mut missing);
    let relation = required(payload.relation, "relation", &mut missing);
    ensure_present(&missing)?;

    server
        .service
        .authorize_actor(user.id(), &ObjectRef::new(&namespace, &object_id))
        .await?;

    let expansion = server.service.expand(&namespace, &object_id, &relation).await?;
    Ok(Json(expansion))
}

/// GET /api/auth/permissions/mine
pub async fn my_tuples(
    State(server): State<AuthzServer>,
    user: AuthenticatedUser,
    Query(query): Query<MineQuery>,
) -> Result<Json<SubjectTuplesResponse>, ApiError> {
    let relation = present(query.relation);
    let tuples = server
        .service
        .list_subject_tuples(
            &server.service.config().principal_namespace,
            user.id(),
            relation.as_deref(),
        )
        .await?;

    Ok(Json(SubjectTuplesResponse { success: true, tuples }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_are_listed_in_order() {
        let payload = GrantPayload {
            namespace: Some("doc".into()),
            relation: Some("  ".into()),
            ..Default::default()
        };
        let error = payload.into_key("user").unwrap_err();
        assert_eq!(
            error.to_string(),
            "Validation error: Missing required fields: object_id, relation, subject_id"
        );
    }

    #[test]
    fn test_subject_namespace_defaults_to_principal_namespace() {
        let payload = GrantPayload {
            namespace: Some("doc".into()),
            object_id: Some("doc-1".into()),
            relation: Some("viewer".into()),
            subject_id: Some("bob".into()),
            subject_relation: Some(String::new()),
            ..Default::default()
        };
        let key = payload.into_key("user").unwrap();
        assert_eq!(key.to_string(), "doc:doc-1#viewer@user:bob");
    }
}
