//! Standardized API error responses for the license endpoints.
//!
//! # Response Format
//!
//! All error responses follow this JSON structure, so the UI can always tell
//! a rejected request from an unreachable server:
//!
//! ```json
//! {
//!   "success": false,
//!   "error": {
//!     "code": "LICENSE_EXPIRED",
//!     "message": "License has expired",
//!     "details": { "reason": "expired" }
//!   }
//! }
//! ```
//!
//! The `details` field is optional and may contain additional context.

use axum::{
    extract::{rejection::JsonRejection, FromRequest},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::errors::{InvalidReason, LicenseError};

/// Machine-readable error codes for API responses.
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // === Input Errors (400) ===
    /// Email or day count failed validation
    InvalidInput,
    /// Request body is not valid JSON or is missing fields
    InvalidRequest,
    /// License key does not match the key grammar
    LicenseMalformed,

    // === License State Errors (4xx) ===
    /// License key was never issued
    LicenseNotFound,
    /// License has expired
    LicenseExpired,
    /// License has been revoked
    LicenseRevoked,
    /// License belongs to a different email address
    EmailMismatch,
    /// Deactivation requested with nothing active
    NoActiveLicense,

    // === Routing and Throttling ===
    /// No endpoint at this path
    RouteNotFound,
    /// Endpoint exists but not for this HTTP method
    MethodNotAllowed,
    /// Too many requests from this client
    RateLimited,

    // === Server Errors (5xx) ===
    /// Store operation failed
    DatabaseError,
    /// Server configuration error
    ConfigError,
    /// Unexpected internal server error
    InternalError,
}

impl ErrorCode {
    /// Returns the HTTP status code for this error code.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::InvalidInput | ErrorCode::InvalidRequest | ErrorCode::LicenseMalformed => {
                StatusCode::BAD_REQUEST
            }
            ErrorCode::LicenseExpired | ErrorCode::LicenseRevoked | ErrorCode::EmailMismatch => {
                StatusCode::FORBIDDEN
            }
            ErrorCode::LicenseNotFound | ErrorCode::RouteNotFound => StatusCode::NOT_FOUND,
            ErrorCode::NoActiveLicense => StatusCode::CONFLICT,
            ErrorCode::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorCode::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::DatabaseError | ErrorCode::ConfigError | ErrorCode::InternalError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Returns a default human-readable message for this error code.
    pub fn default_message(&self) -> &'static str {
        match self {
            ErrorCode::InvalidInput => "Request contains invalid values",
            ErrorCode::InvalidRequest => "Request payload is invalid",
            ErrorCode::LicenseMalformed => "License key format is invalid",
            ErrorCode::LicenseNotFound => "The requested license does not exist",
            ErrorCode::LicenseExpired => "License has expired",
            ErrorCode::LicenseRevoked => "License has been revoked",
            ErrorCode::EmailMismatch => "License is registered to a different email address",
            ErrorCode::NoActiveLicense => "No license is currently active",
            ErrorCode::RouteNotFound => "No such endpoint",
            ErrorCode::MethodNotAllowed => "Method not allowed for this endpoint",
            ErrorCode::RateLimited => "Too many requests",
            ErrorCode::DatabaseError => "Database operation failed",
            ErrorCode::ConfigError => "Server configuration error",
            ErrorCode::InternalError => "An unexpected error occurred",
        }
    }
}

impl From<InvalidReason> for ErrorCode {
    fn from(reason: InvalidReason) -> Self {
        match reason {
            InvalidReason::Malformed => ErrorCode::LicenseMalformed,
            InvalidReason::NotFound => ErrorCode::LicenseNotFound,
            InvalidReason::Expired => ErrorCode::LicenseExpired,
            InvalidReason::Revoked => ErrorCode::LicenseRevoked,
            InvalidReason::EmailMismatch => ErrorCode::EmailMismatch,
        }
    }
}

/// The inner error object containing code, message, and optional details.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Standardized API error response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Always `false`; mirrors the `success` flag of successful responses
    pub success: bool,
    pub error: ErrorBody,
}

impl ApiError {
    /// Creates a new API error with the default message for `code`.
    pub fn new(code: ErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }

    pub fn with_message(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: ErrorBody {
                code,
                message: message.into(),
                details: None,
            },
        }
    }

    /// Adds details to an existing error.
    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.error.code.status_code()
    }

    pub fn license_not_found_key(key: &str) -> Self {
        Self::with_message(
            ErrorCode::LicenseNotFound,
            format!("License '{}' not found", key),
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(self)).into_response()
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}: {}", self.error.code, self.error.message)
    }
}

impl std::error::Error for ApiError {}

impl From<LicenseError> for ApiError {
    fn from(err: LicenseError) -> Self {
        match err {
            LicenseError::InvalidInput(msg) => ApiError::with_message(ErrorCode::InvalidInput, msg),
            LicenseError::InvalidLicense(reason) => {
                ApiError::new(reason.into()).details(serde_json::json!({ "reason": reason }))
            }
            LicenseError::NoActiveLicense => ApiError::new(ErrorCode::NoActiveLicense),
            LicenseError::NotFound(key) => ApiError::license_not_found_key(&key),
            LicenseError::ConfigError(msg) => ApiError::with_message(ErrorCode::ConfigError, msg),
            // Storage details are logged where they happen, not sent to clients.
            LicenseError::StorageError(_) => ApiError::new(ErrorCode::DatabaseError),
            LicenseError::ServerError(_) => ApiError::new(ErrorCode::InternalError),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::with_message(ErrorCode::InvalidRequest, rejection.body_text())
    }
}

/// JSON extractor whose rejections use the [`ApiError`] envelope.
#[derive(Debug, FromRequest)]
#[from_request(via(Json), rejection(ApiError))]
pub struct ApiJson<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_code_status_mapping() {
        assert_eq!(ErrorCode::LicenseNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::InvalidInput.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::LicenseMalformed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::LicenseExpired.status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ErrorCode::NoActiveLicense.status_code(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::RouteNotFound.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ErrorCode::MethodNotAllowed.status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            ErrorCode::RateLimited.status_code(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(
            ErrorCode::DatabaseError.status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn invalid_license_carries_reason() {
        let api_err: ApiError = LicenseError::InvalidLicense(InvalidReason::Revoked).into();
        let json = serde_json::to_value(&api_err).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["code"], "LICENSE_REVOKED");
        assert_eq!(json["error"]["details"]["reason"], "revoked");
    }

    #[test]
    fn storage_errors_hide_details() {
        let api_err: ApiError =
            LicenseError::StorageError("disk I/O error at /secret/path".to_string()).into();
        assert_eq!(api_err.error.code, ErrorCode::DatabaseError);
        assert!(!api_err.error.message.contains("/secret/path"));
    }

    #[test]
    fn details_are_omitted_when_absent() {
        let json = serde_json::to_string(&ApiError::new(ErrorCode::NoActiveLicense)).unwrap();
        assert!(json.contains("NO_ACTIVE_LICENSE"));
        assert!(!json.contains("details"));
    }
}
