use thiserror::Error;

/// Which traversal budget was exhausted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitKind {
    Depth,
    Nodes,
    Timeout,
}

impl std::fmt::Display for LimitKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LimitKind::Depth => f.write_str("depth"),
            LimitKind::Nodes => f.write_str("node"),
            LimitKind::Timeout => f.write_str("time"),
        }
    }
}

#[derive(Error, Debug)]
pub enum ZanzibarError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Permission denied: {actor} lacks '{relation}' on {object}")]
    PermissionDenied {
        actor: String,
        relation: String,
        object: String,
    },

    #[error("Unknown namespace: {0}")]
    UnknownNamespace(String),

    #[error("Unknown relation '{relation}' in namespace '{namespace}'")]
    UnknownRelation { namespace: String, relation: String },

    #[error("Expansion {kind} limit exceeded ({limit})")]
    ExpansionLimitExceeded { kind: LimitKind, limit: u64 },

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ZanzibarError {
    /// Missing or malformed caller input
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ZanzibarError::Validation(_) | ZanzibarError::PermissionDenied { .. }
        )
    }

    /// Schema misconfiguration, a deployment bug rather than user error
    pub fn is_schema_error(&self) -> bool {
        matches!(
            self,
            ZanzibarError::UnknownNamespace(_)
                | ZanzibarError::UnknownRelation { .. }
                | ZanzibarError::InvalidSchema(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ZanzibarError>;
