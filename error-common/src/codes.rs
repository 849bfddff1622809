// Error codes implementation
// Stable codes surfaced in API error bodies and logs

pub mod validation {
    pub const INVALID_INPUT: &str = "VALIDATION_1001";
    pub const MISSING_REQUIRED_FIELD: &str = "VALIDATION_1002";
    pub const BATCH_TOO_LARGE: &str = "VALIDATION_1004";
}

pub mod authentication {
    pub const AUTHENTICATION_REQUIRED: &str = "AUTH_2004";
}

pub mod authorization {
    pub const ACCESS_DENIED: &str = "AUTHZ_3001";
    pub const EXPANSION_LIMIT_EXCEEDED: &str = "AUTHZ_3003";
}

pub mod storage {
    pub const CONNECTION_FAILED: &str = "DB_4001";
    pub const QUERY_FAILED: &str = "DB_4002";
}

pub mod schema {
    pub const UNKNOWN_NAMESPACE: &str = "SCHEMA_5001";
    pub const UNKNOWN_RELATION: &str = "SCHEMA_5002";
    pub const SCHEMA_INVALID: &str = "SCHEMA_5003";
}

pub mod system {
    pub const INTERNAL: &str = "SYS_9000";
    pub const CONFIGURATION_INVALID: &str = "SYS_9001";
    pub const BIND_FAILED: &str = "SYS_9002";
    pub const SERVER_FAILURE: &str = "SYS_9003";
}
