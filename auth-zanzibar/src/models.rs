use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Namespace used for concrete user principals
pub const USER_NAMESPACE: &str = "user";

/// A concrete subject (never a userset)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Subject {
    pub namespace: String,
    pub id: String,
}

impl Subject {
    pub fn new(namespace: &str, id: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            id: id.to_string(),
        }
    }

    pub fn user(user_id: &str) -> Self {
        Self::new(USER_NAMESPACE, user_id)
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.id)
    }
}

/// A protected object instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectRef {
    pub namespace: String,
    pub object_id: String,
}

impl ObjectRef {
    pub fn new(namespace: &str, object_id: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            object_id: object_id.to_string(),
        }
    }
}

impl fmt::Display for ObjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.namespace, self.object_id)
    }
}

/// The unique identity of a relationship tuple.
///
/// When `subject_relation` is set the subject is a userset: every entity
/// holding `subject_relation` on `subject_namespace:subject_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TupleKey {
    pub namespace: String,
    pub object_id: String,
    pub relation: String,
    pub subject_namespace: String,
    pub subject_id: String,
    #[serde(default)]
    pub subject_relation: Option<String>,
}

impl TupleKey {
    /// Key granting `relation` on `namespace:object_id` to a concrete subject
    pub fn new(namespace: &str, object_id: &str, relation: &str, subject: &Subject) -> Self {
        Self {
            namespace: namespace.to_string(),
            object_id: object_id.to_string(),
            relation: relation.to_string(),
            subject_namespace: subject.namespace.clone(),
            subject_id: subject.id.clone(),
            subject_relation: None,
        }
    }

    /// Key granting `relation` to everyone holding `subject_relation` on another object
    pub fn userset(
        namespace: &str,
        object_id: &str,
        relation: &str,
        subject_object: &ObjectRef,
        subject_relation: &str,
    ) -> Self {
        Self {
            namespace: namespace.to_string(),
            object_id: object_id.to_string(),
            relation: relation.to_string(),
            subject_namespace: subject_object.namespace.clone(),
            subject_id: subject_object.object_id.clone(),
            subject_relation: Some(subject_relation.to_string()),
        }
    }

    pub fn object(&self) -> ObjectRef {
        ObjectRef::new(&self.namespace, &self.object_id)
    }

    /// The concrete subject, or `None` when the key names a userset
    pub fn concrete_subject(&self) -> Option<Subject> {
        match self.subject_relation {
            Some(_) => None,
            None => Some(Subject::new(&self.subject_namespace, &self.subject_id)),
        }
    }

    /// Empty subject relations are normalized to `None`
    pub fn normalized(mut self) -> Self {
        if self.subject_relation.as_deref().is_some_and(str::is_empty) {
            self.subject_relation = None;
        }
        self
    }
}

impl fmt::Display for TupleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}#{}@{}:{}",
            self.namespace, self.object_id, self.relation, self.subject_namespace, self.subject_id
        )?;
        if let Some(ref relation) = self.subject_relation {
            write!(f, "#{}", relation)?;
        }
        Ok(())
    }
}

/// A tuple write as submitted by an authenticated actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteTupleRequest {
    #[serde(flatten)]
    pub key: TupleKey,
    pub created_by: String,
}

impl WriteTupleRequest {
    pub fn new(key: TupleKey, created_by: &str) -> Self {
        Self {
            key,
            created_by: created_by.to_string(),
        }
    }
}

/// A tuple as persisted by the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredTuple {
    pub id: Uuid,
    #[serde(flatten)]
    pub key: TupleKey,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

impl StoredTuple {
    /// Materialize a new row for a write request
    pub fn from_request(request: WriteTupleRequest) -> Self {
        Self {
            id: Uuid::new_v4(),
            key: request.key,
            created_by: request.created_by,
            created_at: Utc::now(),
        }
    }
}

impl fmt::Display for StoredTuple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.key)
    }
}

/// Authorization check request
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CheckRequest {
    pub namespace: String,
    pub object_id: String,
    pub relation: String,
    pub subject_namespace: String,
    pub subject_id: String,
}

impl CheckRequest {
    pub fn new(namespace: &str, object_id: &str, relation: &str, subject: &Subject) -> Self {
        Self {
            namespace: namespace.to_string(),
            object_id: object_id.to_string(),
            relation: relation.to_string(),
            subject_namespace: subject.namespace.clone(),
            subject_id: subject.id.clone(),
        }
    }

    pub fn subject(&self) -> Subject {
        Subject::new(&self.subject_namespace, &self.subject_id)
    }

    pub fn object(&self) -> ObjectRef {
        ObjectRef::new(&self.namespace, &self.object_id)
    }
}

impl fmt::Display for CheckRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}#{}@{}:{}",
            self.namespace, self.object_id, self.relation, self.subject_namespace, self.subject_id
        )
    }
}

/// Why a check came back negative
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DenialReason {
    /// No direct or derived relationship grants the relation
    NoRelationship,
    /// Only cyclic paths were found
    CycleDetected,
    /// Traversal hit its depth, node or time budget
    ExpansionLimitExceeded,
}

impl DenialReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            DenialReason::NoRelationship => "no_relationship",
            DenialReason::CycleDetected => "cycle_detected",
            DenialReason::ExpansionLimitExceeded => "expansion_limit_exceeded",
        }
    }
}

impl fmt::Display for DenialReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Authorization check response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResponse {
    pub allowed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<DenialReason>,
}

impl CheckResponse {
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: None,
        }
    }

    pub fn denied(reason: DenialReason) -> Self {
        Self {
            allowed: false,
            reason: Some(reason),
        }
    }
}

/// Outcome of one item in a batch write
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WriteResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tuple: Option<StoredTuple>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WriteResult {
    pub fn succeeded(tuple: StoredTuple) -> Self {
        Self {
            success: true,
            tuple: Some(tuple),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            tuple: None,
            error: Some(error.into()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
}

/// Per-item results of a batch write; one denial never fails the batch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchWriteResponse {
    pub results: Vec<WriteResult>,
    pub summary: BatchSummary,
}

impl BatchWriteResponse {
    pub fn from_results(results: Vec<WriteResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        let summary = BatchSummary {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        };
        Self { results, summary }
    }
}
