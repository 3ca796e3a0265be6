// HTTP API Error Types
use axum::{http::StatusCode, response::IntoResponse, Json};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::database::StoreError;
use crate::identity::IdentityError;
use crate::services::ServiceError;
use crate::storage::StorageError;

/// HTTP API error with appropriate status codes and client-friendly messages
#[derive(Debug)]
pub enum ApiError {
    // 400 Bad Request
    BadRequest(String),
    ValidationError {
        message: String,
        field_errors: Option<HashMap<String, String>>,
    },

    // 401 Unauthorized
    Unauthorized(String),

    // 403 Forbidden
    Forbidden(String),

    // 404 Not Found
    NotFound(String),

    // 409 Conflict
    Conflict(String),

    // 500 Internal Server Error
    InternalServerError(String),

    // 502 Bad Gateway (identity provider or storage misbehaving)
    BadGateway(String),

    // 503 Service Unavailable
    ServiceUnavailable(String),
}

impl ApiError {
    pub fn status_code(&self) -> u16 {
        match self {
            ApiError::BadRequest(_) => 400,
            ApiError::ValidationError { .. } => 400,
            ApiError::Unauthorized(_) => 401,
            ApiError::Forbidden(_) => 403,
            ApiError::NotFound(_) => 404,
            ApiError::Conflict(_) => 409,
            ApiError::InternalServerError(_) => 500,
            ApiError::BadGateway(_) => 502,
            ApiError::ServiceUnavailable(_) => 503,
        }
    }

    /// Get client-safe error message
    pub fn message(&self) -> &str {
        match self {
            ApiError::BadRequest(msg) => msg,
            ApiError::ValidationError { message, .. } => message,
            ApiError::Unauthorized(msg) => msg,
            ApiError::Forbidden(msg) => msg,
            ApiError::NotFound(msg) => msg,
            ApiError::Conflict(msg) => msg,
            ApiError::InternalServerError(msg) => msg,
            ApiError::BadGateway(msg) => msg,
            ApiError::ServiceUnavailable(msg) => msg,
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            ApiError::ValidationError { message, field_errors } => {
                let mut response = json!({
                    "success": false,
                    "error": true,
                    "message": message,
                    "code": "VALIDATION_ERROR"
                });

                if let Some(field_errors) = field_errors {
                    response["field_errors"] = json!(field_errors);
                }

                response
            }
            _ => {
                json!({
                    "success": false,
                    "error": true,
                    "message": self.message(),
                    "code": self.error_code()
                })
            }
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::ValidationError { .. } => "VALIDATION_ERROR",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::Forbidden(_) => "FORBIDDEN",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::Conflict(_) => "CONFLICT",
            ApiError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
            ApiError::BadGateway(_) => "BAD_GATEWAY",
            ApiError::ServiceUnavailable(_) => "SERVICE_UNAVAILABLE",
        }
    }
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn validation_error(message: impl Into<String>, field_errors: Option<HashMap<String, String>>) -> Self {
        ApiError::ValidationError {
            message: message.into(),
            field_errors,
        }
    }

    /// Validation failure on a single field
    pub fn field_error(field: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        let mut field_errors = HashMap::new();
        field_errors.insert(field.to_string(), message.clone());
        ApiError::validation_error(message, Some(field_errors))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict(message.into())
    }

    pub fn internal_server_error(message: impl Into<String>) -> Self {
        ApiError::InternalServerError(message.into())
    }

    pub fn bad_gateway(message: impl Into<String>) -> Self {
        ApiError::BadGateway(message.into())
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        ApiError::ServiceUnavailable(message.into())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(msg) => ApiError::not_found(msg),
            StoreError::DuplicateKey(_) => ApiError::conflict("Record already exists"),
            StoreError::InvalidIdentifier(msg) | StoreError::InvalidRecord(msg) => {
                ApiError::bad_request(msg)
            }
            StoreError::ConnectionError(msg) => {
                tracing::error!("Record store connection error: {}", msg);
                ApiError::service_unavailable("Database temporarily unavailable")
            }
            StoreError::QueryError(msg) => {
                // Don't expose internal SQL errors to clients
                tracing::error!("Record store query error: {}", msg);
                ApiError::internal_server_error("An error occurred while processing your request")
            }
        }
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::InvalidPath(msg) => ApiError::bad_request(format!("Invalid file path: {}", msg)),
            StorageError::AlreadyExists(msg) => ApiError::conflict(format!("File already exists: {}", msg)),
            StorageError::Rejected(msg) => {
                tracing::warn!("Upload rejected: {}", msg);
                ApiError::bad_gateway("File upload was rejected")
            }
            StorageError::Unavailable(msg) => {
                tracing::error!("Storage unavailable: {}", msg);
                ApiError::service_unavailable("File storage temporarily unavailable")
            }
        }
    }
}

impl From<IdentityError> for ApiError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::InvalidCredentials => ApiError::unauthorized("Invalid login credentials"),
            IdentityError::InvalidToken(_) => ApiError::unauthorized("Invalid or expired session"),
            IdentityError::Rejected(msg) => ApiError::bad_request(msg),
            IdentityError::Unavailable(msg) => {
                tracing::error!("Identity provider unavailable: {}", msg);
                ApiError::service_unavailable("Authentication service temporarily unavailable")
            }
            IdentityError::Protocol(msg) => {
                tracing::error!("Identity provider protocol error: {}", msg);
                ApiError::bad_gateway("Authentication service returned an unexpected response")
            }
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Validation(msg) => ApiError::validation_error(msg, None),
            ServiceError::NotFound(msg) => ApiError::not_found(msg),
            ServiceError::Store(e) => e.into(),
            ServiceError::Storage(e) => e.into(),
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message())
    }
}

impl std::error::Error for ApiError {}

// Automatic HTTP response conversion for Axum
impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(self.to_json())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_hide_sql_details() {
        let err: ApiError = StoreError::QueryError("syntax error at or near \"FROM\"".into()).into();
        assert_eq!(err.status_code(), 500);
        assert!(!err.message().contains("syntax"));
    }

    #[test]
    fn duplicate_key_is_conflict() {
        let err: ApiError = StoreError::DuplicateKey("profiles_pkey".into()).into();
        assert_eq!(err.status_code(), 409);
        assert_eq!(err.error_code(), "CONFLICT");
    }

    #[test]
    fn field_errors_are_included() {
        let body = ApiError::field_error("password", "Password must be at least 6 characters").to_json();
        assert_eq!(body["code"], "VALIDATION_ERROR");
        assert_eq!(body["field_errors"]["password"], "Password must be at least 6 characters");
    }

    #[test]
    fn error_bodies_carry_failed_envelope() {
        for err in [
            ApiError::not_found("Ticket t1"),
            ApiError::field_error("email", "Email is required"),
        ] {
            let body = err.to_json();
            assert_eq!(body["success"], json!(false));
            assert_eq!(body["error"], json!(true));
        }
    }

    #[test]
    fn bad_credentials_are_unauthorized() {
        let err: ApiError = IdentityError::InvalidCredentials.into();
        assert_eq!(err.status_code(), 401);
    }
}
