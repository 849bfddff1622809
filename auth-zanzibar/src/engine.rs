use crate::{
    check::PermissionChecker,
    error::{Result, ZanzibarError},
    expand::{Expansion, ExpansionEngine, ExpansionLimits},
    models::*,
    repository::TupleStore,
    schema::NamespaceRegistry,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Tunables for [`AuthorizationService`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationConfig {
    /// Relation an actor must hold on an object to change its tuples
    pub grant_relation: String,
    /// Namespace actors (`created_by`) live in
    pub principal_namespace: String,
    pub max_batch_size: usize,
    /// Zero disables the check cache
    pub check_cache_ttl: Duration,
    pub limits: ExpansionLimits,
}

impl Default for AuthorizationConfig {
    fn default() -> Self {
        Self {
            grant_relation: "can_delete".to_string(),
            principal_namespace: USER_NAMESPACE.to_string(),
            max_batch_size: 50,
            check_cache_ttl: Duration::ZERO,
            limits: ExpansionLimits::default(),
        }
    }
}

/// Relationship-based authorization service.
///
/// Owns the check path and the guarded write path. Every grant, revoke or
/// replace is authorized by checking the actor's `grant_relation` on the
/// target object before the store is touched.
pub struct AuthorizationService {
    store: Arc<dyn TupleStore>,
    registry: Arc<NamespaceRegistry>,
    expander: Arc<ExpansionEngine>,
    checker: PermissionChecker,
    config: AuthorizationConfig,
}

impl AuthorizationService {
    pub fn new(
        store: Arc<dyn TupleStore>,
        registry: Arc<NamespaceRegistry>,
        config: AuthorizationConfig,
    ) -> Self {
        let expander = Arc::new(ExpansionEngine::new(
            store.clone(),
            registry.clone(),
            config.limits,
        ));
        let checker = PermissionChecker::new(expander.clone()).with_cache_ttl(config.check_cache_ttl);

        Self {
            store,
            registry,
            expander,
            checker,
            config,
        }
    }

    pub fn registry(&self) -> Arc<NamespaceRegistry> {
        self.registry.clone()
    }

    pub fn config(&self) -> &AuthorizationConfig {
        &self.config
    }

    // =========================================================================
    // Checks
    // =========================================================================

    pub async fn check(&self, request: &CheckRequest) -> Result<CheckResponse> {
        self.checker.check(request).await
    }

    pub async fn batch_check(&self, requests: &[CheckRequest]) -> Result<Vec<CheckResponse>> {
        self.checker.batch_check(requests).await
    }

    /// Fail with `PermissionDenied` unless `actor` holds the grant relation
    /// on the object
    pub async fn authorize_actor(&self, actor: &str, object: &ObjectRef) -> Result<()> {
        let principal = Subject::new(&self.config.principal_namespace, actor);
        let request = CheckRequest::new(
            &object.namespace,
            &object.object_id,
            &self.config.grant_relation,
            &principal,
        );

        let response = self.checker.check(&request).await?;
        if response.allowed {
            return Ok(());
        }

        warn!(
            actor = %principal,
            object = %object,
            reason = ?response.reason,
            "Tuple change denied"
        );
        Err(ZanzibarError::PermissionDenied {
            actor: principal.to_string(),
            relation: self.config.grant_relation.clone(),
            object: object.to_string(),
        })
    }

    // =========================================================================
    // Tuple Management
    // =========================================================================

    /// Grant: validate, authorize the actor, then store
    pub async fn write_tuple(&self, request: WriteTupleRequest) -> Result<StoredTuple> {
        let request = WriteTupleRequest {
            key: request.key.normalized(),
            created_by: request.created_by,
        };
        self.validate_write(&request.key, &request.created_by)?;
        self.authorize_actor(&request.created_by, &request.key.object())
            .await?;

        let stored = self.store.put(request).await?;
        self.checker.clear_cache();

        info!(tuple = %stored.key, created_by = %stored.created_by, "Tuple written");
        Ok(stored)
    }

    /// Store a tuple without the actor precondition.
    ///
    /// For trusted provisioning only, e.g. recording the creator of a new
    /// object as its owner. Never reachable from the HTTP surface.
    pub async fn provision_tuple(&self, request: WriteTupleRequest) -> Result<StoredTuple> {
        let request = WriteTupleRequest {
            key: request.key.normalized(),
            created_by: request.created_by,
        };
        self.validate_write(&request.key, &request.created_by)?;

        let stored = self.store.put(request).await?;
        self.checker.clear_cache();

        info!(tuple = %stored.key, created_by = %stored.created_by, "Tuple provisioned");
        Ok(stored)
    }

    /// Batch grant; items succeed or fail independently
    pub async fn write_tuples(&self, requests: Vec<WriteTupleRequest>) -> Result<BatchWriteResponse> {
        if requests.len() > self.config.max_batch_size {
            return Err(ZanzibarError::Validation(format!(
                "Batch size {} exceeds maximum of {}",
                requests.len(),
                self.config.max_batch_size
            )));
        }

        let mut results = Vec::with_capacity(requests.len());
        for request in requests {
            let result = match self.write_tuple(request).await {
                Ok(stored) => WriteResult::succeeded(stored),
                Err(e) => WriteResult::failed(e.to_string()),
            };
            results.push(result);
        }

        let response = BatchWriteResponse::from_results(results);
        info!(
            total = response.summary.total,
            succeeded = response.summary.succeeded,
            failed = response.summary.failed,
            "Batch write complete"
        );
        Ok(response)
    }

    /// Revoke; returns whether the tuple existed
    pub async fn delete_tuple(&self, key: &TupleKey, actor: &str) -> Result<bool> {
        let key = key.clone().normalized();
        self.validate_write(&key, actor)?;
        self.authorize_actor(actor, &key.object()).await?;

        let deleted = self.store.delete(&key).await?;
        self.checker.clear_cache();

        info!(tuple = %key, actor, deleted, "Tuple deleted");
        Ok(deleted)
    }

    /// Atomically swap one tuple for another. The actor (`new.created_by`)
    /// must be authorized on both objects.
    pub async fn replace_tuple(&self, old: &TupleKey, new: WriteTupleRequest) -> Result<StoredTuple> {
        let old = old.clone().normalized();
        let new = WriteTupleRequest {
            key: new.key.normalized(),
            created_by: new.created_by,
        };
        self.validate_write(&old, &new.created_by)?;
        self.validate_write(&new.key, &new.created_by)?;

        let old_object = old.object();
        let new_object = new.key.object();
        self.authorize_actor(&new.created_by, &old_object).await?;
        if new_object != old_object {
            self.authorize_actor(&new.created_by, &new_object).await?;
        }

        let stored = self.store.replace(&old, new).await?;
        self.checker.clear_cache();

        info!(old = %old, new = %stored.key, "Tuple replaced");
        Ok(stored)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Every concrete subject holding `relation` on the object
    pub async fn expand(&self, namespace: &str, object_id: &str, relation: &str) -> Result<Expansion> {
        if namespace.is_empty() || object_id.is_empty() || relation.is_empty() {
            return Err(ZanzibarError::Validation(
                "Missing required fields: namespace, object_id, relation".to_string(),
            ));
        }

        let expansion = self.expander.expand(namespace, object_id, relation).await?;
        if !expansion.diagnostics.is_empty() {
            warn!(
                object = %ObjectRef::new(namespace, object_id),
                relation,
                diagnostics = ?expansion.diagnostics,
                "Expansion pruned cyclic branches"
            );
        }
        debug!(
            subjects = expansion.subjects.len(),
            nodes_visited = expansion.nodes_visited,
            "Expansion complete"
        );
        Ok(expansion)
    }

    /// Tuples naming this subject directly, optionally narrowed to a relation
    pub async fn list_subject_tuples(
        &self,
        subject_namespace: &str,
        subject_id: &str,
        relation: Option<&str>,
    ) -> Result<Vec<StoredTuple>> {
        if subject_namespace.is_empty() || subject_id.is_empty() {
            return Err(ZanzibarError::Validation(
                "Missing required fields: subject_namespace, subject_id".to_string(),
            ));
        }
        self.store
            .find_by_subject(subject_namespace, subject_id, relation)
            .await
    }

    /// Store liveness
    pub async fn health_check(&self) -> Result<()> {
        self.store.ping().await
    }

    // =========================================================================
    // Validation
    // =========================================================================

    fn validate_write(&self, key: &TupleKey, actor: &str) -> Result<()> {
        let fields = [
            ("namespace", key.namespace.as_str()),
            ("object_id", key.object_id.as_str()),
            ("relation", key.relation.as_str()),
            ("subject_namespace", key.subject_namespace.as_str()),
            ("subject_id", key.subject_id.as_str()),
            ("created_by", actor),
        ];
        let missing: Vec<&str> = fields
            .iter()
            .filter(|(_, value)| value.trim().is_empty())
            .map(|(name, _)| *name)
            .collect();
        if !missing.is_empty() {
            return Err(ZanzibarError::Validation(format!(
                "Missing required fields: {}",
                missing.join(", ")
            )));
        }

        self.registry.validate_tuple(key)
    }
}
