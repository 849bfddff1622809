use auth_zanzibar::ZanzibarError;
use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use error_common::{codes, ErrorReport};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error body returned for every failed request
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub success: bool,
    pub error: String,
    pub error_type: String,
    pub error_id: String,
}

/// API errors as seen by HTTP clients
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    Validation { message: String },

    #[error("Authentication required")]
    AuthenticationRequired,

    #[error("{message}")]
    PermissionDenied { message: String },

    #[error("{message}")]
    Schema { code: &'static str, message: String },

    #[error("{message}")]
    LimitExceeded { message: String },

    #[error("{message}")]
    Storage { message: String },

    #[error("{message}")]
    Internal { message: String },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Validation { .. } => StatusCode::BAD_REQUEST,
            ApiError::AuthenticationRequired => StatusCode::UNAUTHORIZED,
            ApiError::PermissionDenied { .. } => StatusCode::FORBIDDEN,
            ApiError::LimitExceeded { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            ApiError::Schema { .. } | ApiError::Storage { .. } | ApiError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn error_type(&self) -> &'static str {
        match self {
            ApiError::Validation { .. } => "validation_error",
            ApiError::AuthenticationRequired => "authentication_required",
            ApiError::PermissionDenied { .. } => "permission_denied",
            ApiError::Schema { .. } => "schema_error",
            ApiError::LimitExceeded { .. } => "expansion_limit_exceeded",
            ApiError::Storage { .. } => "storage_error",
            ApiError::Internal { .. } => "internal_error",
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::Validation { message } if message.contains("Missing required fields") => {
                codes::validation::MISSING_REQUIRED_FIELD
            }
            ApiError::Validation { message } if message.contains("Batch size") => {
                codes::validation::BATCH_TOO_LARGE
            }
            ApiError::Validation { .. } => codes::validation::INVALID_INPUT,
            ApiError::AuthenticationRequired => codes::authentication::AUTHENTICATION_REQUIRED,
            ApiError::PermissionDenied { .. } => codes::authorization::ACCESS_DENIED,
            ApiError::Schema { code, .. } => code,
            ApiError::LimitExceeded { .. } => codes::authorization::EXPANSION_LIMIT_EXCEEDED,
            ApiError::Storage { .. } => codes::storage::QUERY_FAILED,
            ApiError::Internal { .. } => codes::system::INTERNAL,
        }
    }
}

impl From<ZanzibarError> for ApiError {
    fn from(error: ZanzibarError) -> Self {
        let message = error.to_string();
        match error {
            // Clients see the bare validation message
            ZanzibarError::Validation(detail) => ApiError::Validation { message: detail },
            ZanzibarError::PermissionDenied { .. } => ApiError::PermissionDenied { message },
            ZanzibarError::UnknownNamespace(_) => ApiError::Schema {
                code: codes::schema::UNKNOWN_NAMESPACE,
                message,
            },
            ZanzibarError::UnknownRelation { .. } => ApiError::Schema {
                code: codes::schema::UNKNOWN_RELATION,
                message,
            },
            ZanzibarError::InvalidSchema(_) => ApiError::Schema {
                code: codes::schema::SCHEMA_INVALID,
                message,
            },
            ZanzibarError::ExpansionLimitExceeded { .. } => ApiError::LimitExceeded { message },
            ZanzibarError::Storage(_) => ApiError::Storage { message },
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Validation {
            message: format!("Invalid request body: {}", rejection.body_text()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let report = ErrorReport::new(
            self.error_type(),
            self.code(),
            logger_redacted::redact(&self.to_string()),
        );
        report.log(status_code.is_server_error());

        // Internal details stay in the log
        let error = match &self {
            ApiError::Storage { .. } | ApiError::Internal { .. } => "Internal server error".to_string(),
            _ => self.to_string(),
        };

        let body = ApiErrorResponse {
            success: false,
            error,
            error_type: self.error_type().to_string(),
            error_id: report.error_id.to_string(),
        };

        (status_code, Json(body)).into_response()
    }
}
