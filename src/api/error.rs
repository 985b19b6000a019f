//! Unified API error handling.
//!
//! Every failure leaves the API as `{"error": "<code>", "message": "..."}`
//! with the status code implied by the error code.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::services::AuthError;

/// Error codes for API responses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Client errors (4xx)
    EmailAndPasswordRequired,
    EmailRequired,
    TokenAndPasswordRequired,
    NameRequired,
    InvalidRequest,
    InvalidToken,
    InvalidCredentials,
    Unauthorized,
    NotFound,
    EmailInUse,
    SessionConflict,
    Conflict,
    TooManyRequests,

    // Server errors (5xx)
    InternalError,
    DatabaseError,
}

impl ErrorCode {
    /// Get the default HTTP status code for this error code
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::EmailAndPasswordRequired
            | ErrorCode::EmailRequired
            | ErrorCode::TokenAndPasswordRequired
            | ErrorCode::NameRequired
            | ErrorCode::InvalidRequest
            | ErrorCode::InvalidToken => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidCredentials | ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::EmailInUse | ErrorCode::SessionConflict | ErrorCode::Conflict => {
                StatusCode::CONFLICT
            }
            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Get the string representation of the error code
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::EmailAndPasswordRequired => "email_and_password_required",
            ErrorCode::EmailRequired => "email_required",
            ErrorCode::TokenAndPasswordRequired => "token_and_password_required",
            ErrorCode::NameRequired => "name_required",
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::InvalidToken => "invalid_token",
            ErrorCode::InvalidCredentials => "invalid_credentials",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::NotFound => "not_found",
            ErrorCode::EmailInUse => "email_in_use",
            ErrorCode::SessionConflict => "session_conflict",
            ErrorCode::Conflict => "conflict",
            ErrorCode::TooManyRequests => "too_many_requests",
            ErrorCode::InternalError => "internal_error",
            ErrorCode::DatabaseError => "database_error",
        }
    }
}

/// Error response body: the machine-readable code sits directly under
/// `error` so clients can compare it as a string
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Human-readable error message
    pub message: String,
}

/// Unified API error type
#[derive(Debug)]
pub struct ApiError {
    code: ErrorCode,
    status: StatusCode,
    message: String,
}

impl ApiError {
    /// Create a new API error with a specific code and message
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code(),
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    // -------------------------------------------------------------------------
    // Convenience constructors for common error types
    // -------------------------------------------------------------------------

    /// Malformed or out-of-range input (400)
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, message)
    }

    /// Unauthorized error (401) - authentication required
    pub fn unauthorized() -> Self {
        Self::new(ErrorCode::Unauthorized, "Authentication required")
    }

    /// Not found error (404)
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::NotFound, message)
    }

    /// Conflict error (409) - resource already exists
    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Conflict, message)
    }

    /// Internal server error (500)
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    /// Database error (500)
    pub fn database(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DatabaseError, message)
    }

    /// Too many requests error (429)
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TooManyRequests, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let response = ErrorResponse {
            error: self.code.as_str().to_string(),
            message: self.message,
        };

        (self.status, Json(response)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code.as_str(), self.message)
    }
}

impl std::error::Error for ApiError {}

// -------------------------------------------------------------------------
// Conversion implementations for common error types
// -------------------------------------------------------------------------

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => ApiError::not_found("Resource not found"),
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                if msg.contains("UNIQUE constraint failed") {
                    ApiError::conflict("A resource with this name already exists")
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    ApiError::invalid_request("Referenced resource does not exist")
                } else {
                    tracing::error!("Database error: {}", err);
                    ApiError::database("A database error occurred")
                }
            }
            _ => {
                tracing::error!("Database error: {}", err);
                ApiError::database("A database error occurred")
            }
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::EmailInUse => ApiError::new(ErrorCode::EmailInUse, err.to_string()),
            AuthError::InvalidCredentials => {
                ApiError::new(ErrorCode::InvalidCredentials, err.to_string())
            }
            AuthError::SessionConflict => {
                ApiError::new(ErrorCode::SessionConflict, err.to_string())
            }
            AuthError::Unauthenticated => ApiError::unauthorized(),
            AuthError::InvalidResetToken => ApiError::new(ErrorCode::InvalidToken, err.to_string()),
            AuthError::Database(e) => ApiError::from(e),
            AuthError::PasswordHash(e) => {
                tracing::error!("{}", e);
                ApiError::internal("Failed to process password")
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast::<sqlx::Error>() {
            Ok(db_err) => ApiError::from(db_err),
            Err(err) => {
                tracing::error!("Internal error: {:#}", err);
                ApiError::internal("An internal error occurred")
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::invalid_request(rejection.body_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn test_error_code_status_codes() {
        assert_eq!(
            ErrorCode::EmailAndPasswordRequired.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ErrorCode::InvalidToken.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::Unauthorized.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ErrorCode::NotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::SessionConflict.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::EmailInUse.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::TooManyRequests.status_code(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn test_auth_error_mapping() {
        let err = ApiError::from(AuthError::EmailInUse);
        assert_eq!(err.code(), ErrorCode::EmailInUse);
        assert_eq!(err.status(), StatusCode::CONFLICT);

        let err = ApiError::from(AuthError::InvalidResetToken);
        assert_eq!(err.code().as_str(), "invalid_token");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = ApiError::from(AuthError::Unauthenticated);
        assert_eq!(err.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_anyhow_wrapping_sqlx_keeps_mapping() {
        let err = ApiError::from(anyhow::Error::from(sqlx::Error::RowNotFound));
        assert_eq!(err.code(), ErrorCode::NotFound);
    }

    #[tokio::test]
    async fn test_response_envelope() {
        let response = ApiError::new(ErrorCode::NameRequired, "Name is required").into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "name_required");
        assert_eq!(json["message"], "Name is required");
    }

    #[tokio::test]
    async fn test_session_conflict_code_is_a_plain_string() {
        let response = ApiError::from(AuthError::SessionConflict).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["error"], "session_conflict");
        assert!(json["message"].is_string());
    }
}
