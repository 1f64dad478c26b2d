//! Structured API error responses with error codes
//!
//! This module provides consistent error handling across all API endpoints
//! with machine-readable error codes and human-readable messages.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::infra::EngineError;

// ============================================================================
// Error Codes
// ============================================================================

/// Error codes for API responses
///
/// These codes are stable and can be used by clients for programmatic error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Authentication errors (1xxx)
    /// No authentication credentials provided
    AuthRequired,
    /// Invalid API key format or value
    InvalidApiKey,
    /// Insufficient permissions for this operation
    InsufficientPermissions,

    // Rate limiting errors (2xxx)
    /// Too many requests, rate limit exceeded
    RateLimitExceeded,

    // Validation errors (3xxx)
    /// Request body is malformed
    InvalidRequestBody,
    /// Field value is invalid
    InvalidFieldValue,
    /// Uploaded media exceeds size limit
    MediaTooLarge,
    /// Uploaded media has an unsupported content type
    UnsupportedMediaType,

    // Resource errors (4xxx)
    /// Session not found
    SessionNotFound,
    /// Proof not found
    ProofNotFound,

    // Conflict errors (5xxx)
    /// Transition not present in the session state graph
    InvalidStateTransition,
    /// Concurrent transition lost a compare-and-swap race
    StateConflict,
    /// Proof was already revoked
    ProofRevoked,

    // Expiry errors (6xxx)
    /// Session deadline passed
    SessionExpired,
    /// Proof deadline passed
    ProofExpired,

    // Upstream errors (7xxx)
    /// Interpretation service did not answer within the deadline
    InterpretationTimeout,
    /// Interpretation service answered with an error
    InterpretationFailed,
    /// Interpretation output failed validation
    MalformedInterpretation,

    // Infrastructure errors (8xxx)
    /// Storage operation failed
    StorageError,
    /// Internal server error
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn numeric_code(&self) -> u32 {
        match self {
            // Auth (1xxx)
            ErrorCode::AuthRequired => 1001,
            ErrorCode::InvalidApiKey => 1002,
            ErrorCode::InsufficientPermissions => 1003,

            // Rate limiting (2xxx)
            ErrorCode::RateLimitExceeded => 2001,

            // Validation (3xxx)
            ErrorCode::InvalidRequestBody => 3001,
            ErrorCode::InvalidFieldValue => 3002,
            ErrorCode::MediaTooLarge => 3003,
            ErrorCode::UnsupportedMediaType => 3004,

            // Resource (4xxx)
            ErrorCode::SessionNotFound => 4001,
            ErrorCode::ProofNotFound => 4002,

            // Conflict (5xxx)
            ErrorCode::InvalidStateTransition => 5001,
            ErrorCode::StateConflict => 5002,
            ErrorCode::ProofRevoked => 5003,

            // Expiry (6xxx)
            ErrorCode::SessionExpired => 6001,
            ErrorCode::ProofExpired => 6002,

            // Upstream (7xxx)
            ErrorCode::InterpretationTimeout => 7001,
            ErrorCode::InterpretationFailed => 7002,
            ErrorCode::MalformedInterpretation => 7003,

            // Infrastructure (8xxx)
            ErrorCode::StorageError => 8001,
            ErrorCode::InternalError => 8999,
        }
    }

    /// Get the HTTP status code for this error
    pub fn http_status(&self) -> StatusCode {
        match self {
            // Auth errors -> 401/403
            ErrorCode::AuthRequired => StatusCode::UNAUTHORIZED,
            ErrorCode::InvalidApiKey => StatusCode::UNAUTHORIZED,
            ErrorCode::InsufficientPermissions => StatusCode::FORBIDDEN,

            // Rate limiting -> 429
            ErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,

            // Validation -> 400/413/415
            ErrorCode::InvalidRequestBody => StatusCode::BAD_REQUEST,
            ErrorCode::InvalidFieldValue => StatusCode::BAD_REQUEST,
            ErrorCode::MediaTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::UnsupportedMediaType => StatusCode::UNSUPPORTED_MEDIA_TYPE,

            // Resource -> 404
            ErrorCode::SessionNotFound => StatusCode::NOT_FOUND,
            ErrorCode::ProofNotFound => StatusCode::NOT_FOUND,

            // Conflict -> 409
            ErrorCode::InvalidStateTransition => StatusCode::CONFLICT,
            ErrorCode::StateConflict => StatusCode::CONFLICT,
            ErrorCode::ProofRevoked => StatusCode::CONFLICT,

            // Expiry -> 410
            ErrorCode::SessionExpired => StatusCode::GONE,
            ErrorCode::ProofExpired => StatusCode::GONE,

            // Upstream -> 502
            ErrorCode::InterpretationTimeout => StatusCode::BAD_GATEWAY,
            ErrorCode::InterpretationFailed => StatusCode::BAD_GATEWAY,
            ErrorCode::MalformedInterpretation => StatusCode::BAD_GATEWAY,

            // Infrastructure -> 500
            ErrorCode::StorageError => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let code_str = match self {
            ErrorCode::AuthRequired => "AUTH_REQUIRED",
            ErrorCode::InvalidApiKey => "INVALID_API_KEY",
            ErrorCode::InsufficientPermissions => "INSUFFICIENT_PERMISSIONS",
            ErrorCode::RateLimitExceeded => "RATE_LIMIT_EXCEEDED",
            ErrorCode::InvalidRequestBody => "INVALID_REQUEST_BODY",
            ErrorCode::InvalidFieldValue => "INVALID_FIELD_VALUE",
            ErrorCode::MediaTooLarge => "MEDIA_TOO_LARGE",
            ErrorCode::UnsupportedMediaType => "UNSUPPORTED_MEDIA_TYPE",
            ErrorCode::SessionNotFound => "SESSION_NOT_FOUND",
            ErrorCode::ProofNotFound => "PROOF_NOT_FOUND",
            ErrorCode::InvalidStateTransition => "INVALID_STATE_TRANSITION",
            ErrorCode::StateConflict => "STATE_CONFLICT",
            ErrorCode::ProofRevoked => "PROOF_REVOKED",
            ErrorCode::SessionExpired => "SESSION_EXPIRED",
            ErrorCode::ProofExpired => "PROOF_EXPIRED",
            ErrorCode::InterpretationTimeout => "INTERPRETATION_TIMEOUT",
            ErrorCode::InterpretationFailed => "INTERPRETATION_FAILED",
            ErrorCode::MalformedInterpretation => "MALFORMED_INTERPRETATION",
            ErrorCode::StorageError => "STORAGE_ERROR",
            ErrorCode::InternalError => "INTERNAL_ERROR",
        };
        write!(f, "{}", code_str)
    }
}

// ============================================================================
// Structured Error Response
// ============================================================================

/// Structured error response for API endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiError {
    /// Error details
    pub error: ErrorDetails,
}

/// Detailed error information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Numeric error code for easy categorization
    pub numeric_code: u32,

    /// Human-readable error message
    pub message: String,

    /// Additional error details
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,

    /// Retry information for rate limiting
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,

    /// Related resource ID (session id or proof code)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
}

impl ApiError {
    /// Create a new API error
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            error: ErrorDetails {
                code,
                numeric_code: code.numeric_code(),
                message: message.into(),
                details: None,
                retry_after: None,
                resource_id: None,
            },
        }
    }

    /// Set additional details
    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.error.details = Some(details);
        self
    }

    /// Set retry-after seconds (for rate limiting)
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.error.retry_after = Some(seconds);
        self
    }

    /// Set related resource ID
    pub fn with_resource_id(mut self, id: impl Into<String>) -> Self {
        self.error.resource_id = Some(id.into());
        self
    }

    /// Get the HTTP status code
    pub fn status(&self) -> StatusCode {
        self.error.code.http_status()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let code_str = self.error.code.to_string();
        let mut response = (status, Json(self)).into_response();

        // Add error code header for easier debugging
        if let Ok(code_value) = axum::http::HeaderValue::from_str(&code_str) {
            response.headers_mut().insert(
                axum::http::header::HeaderName::from_static("x-error-code"),
                code_value,
            );
        }

        response
    }
}

// ============================================================================
// Conversion from EngineError
// ============================================================================

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Validation(msg) => ApiError::new(ErrorCode::InvalidFieldValue, msg),
            EngineError::MediaTooLarge { size, max } => ApiError::new(
                ErrorCode::MediaTooLarge,
                format!("media too large: {} bytes exceeds maximum of {}", size, max),
            )
            .with_details(serde_json::json!({
                "size_bytes": size,
                "max_bytes": max,
            })),
            EngineError::UnsupportedMediaType(content_type) => ApiError::new(
                ErrorCode::UnsupportedMediaType,
                format!("unsupported media type: {}", content_type),
            ),
            EngineError::SessionNotFound(id) => {
                ApiError::new(ErrorCode::SessionNotFound, format!("session not found: {}", id))
                    .with_resource_id(id.to_string())
            }
            EngineError::ProofNotFound(code) => {
                ApiError::new(ErrorCode::ProofNotFound, format!("proof not found: {}", code))
                    .with_resource_id(code)
            }
            EngineError::StateConflict { expected, actual } => ApiError::new(
                ErrorCode::StateConflict,
                format!("state conflict: expected status {}, found {}", expected, actual),
            )
            .with_details(serde_json::json!({
                "expected_status": expected,
                "actual_status": actual,
            })),
            EngineError::InvalidTransition { from, to } => ApiError::new(
                ErrorCode::InvalidStateTransition,
                format!("invalid state transition: {} -> {}", from, to),
            )
            .with_details(serde_json::json!({
                "from_status": from,
                "to_status": to,
            })),
            EngineError::SessionExpired(id) => {
                ApiError::new(ErrorCode::SessionExpired, format!("session expired: {}", id))
                    .with_resource_id(id.to_string())
            }
            EngineError::ProofExpired(code) => {
                ApiError::new(ErrorCode::ProofExpired, format!("proof expired: {}", code))
                    .with_resource_id(code)
            }
            EngineError::ProofRevoked(code) => {
                ApiError::new(ErrorCode::ProofRevoked, format!("proof revoked: {}", code))
                    .with_resource_id(code)
            }
            EngineError::Forbidden(msg) => {
                ApiError::new(ErrorCode::InsufficientPermissions, msg)
            }
            EngineError::InterpretationTimeout { elapsed_ms } => ApiError::new(
                ErrorCode::InterpretationTimeout,
                format!("interpretation timed out after {}ms", elapsed_ms),
            ),
            EngineError::InterpretationFailed(msg) => ApiError::new(
                ErrorCode::InterpretationFailed,
                format!("interpretation failed: {}", msg),
            ),
            EngineError::MalformedOutput(msg) => ApiError::new(
                ErrorCode::MalformedInterpretation,
                format!("malformed interpretation output: {}", msg),
            ),
            EngineError::CodeCollision => ApiError::new(
                ErrorCode::InternalError,
                "proof code generation failed".to_string(),
            ),
            EngineError::Storage(msg) => {
                ApiError::new(ErrorCode::StorageError, format!("storage error: {}", msg))
            }
            EngineError::RateLimited => {
                ApiError::new(ErrorCode::RateLimitExceeded, "rate limit exceeded")
                    .with_retry_after(60)
            }
            EngineError::Configuration(msg) => ApiError::new(
                ErrorCode::InternalError,
                format!("configuration error: {}", msg),
            ),
            EngineError::Internal(msg) => ApiError::new(ErrorCode::InternalError, msg),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::SessionId;

    #[test]
    fn test_error_code_numeric() {
        assert_eq!(ErrorCode::AuthRequired.numeric_code(), 1001);
        assert_eq!(ErrorCode::RateLimitExceeded.numeric_code(), 2001);
        assert_eq!(ErrorCode::InvalidRequestBody.numeric_code(), 3001);
        assert_eq!(ErrorCode::SessionNotFound.numeric_code(), 4001);
        assert_eq!(ErrorCode::StateConflict.numeric_code(), 5002);
        assert_eq!(ErrorCode::SessionExpired.numeric_code(), 6001);
        assert_eq!(ErrorCode::InterpretationTimeout.numeric_code(), 7001);
        assert_eq!(ErrorCode::InternalError.numeric_code(), 8999);
    }

    #[test]
    fn test_error_code_http_status() {
        assert_eq!(ErrorCode::AuthRequired.http_status(), StatusCode::UNAUTHORIZED);
        assert_eq!(
            ErrorCode::InsufficientPermissions.http_status(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            ErrorCode::RateLimitExceeded.http_status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        assert_eq!(ErrorCode::InvalidFieldValue.http_status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorCode::MediaTooLarge.http_status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(ErrorCode::ProofNotFound.http_status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorCode::StateConflict.http_status(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::ProofRevoked.http_status(), StatusCode::CONFLICT);
        assert_eq!(ErrorCode::ProofExpired.http_status(), StatusCode::GONE);
        assert_eq!(ErrorCode::InterpretationTimeout.http_status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ErrorCode::InternalError.http_status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_api_error_builder() {
        let error = ApiError::new(ErrorCode::ProofNotFound, "Proof not found")
            .with_resource_id("VC-ABC123-XYZ789")
            .with_details(serde_json::json!({"extra": "info"}));

        assert_eq!(error.error.code, ErrorCode::ProofNotFound);
        assert_eq!(error.error.resource_id, Some("VC-ABC123-XYZ789".to_string()));
        assert!(error.error.details.is_some());
    }

    #[test]
    fn test_error_serialization() {
        let error = ApiError::new(ErrorCode::ProofNotFound, "Proof not found");
        let json = serde_json::to_string(&error).unwrap();

        assert!(json.contains("PROOF_NOT_FOUND"));
        assert!(json.contains("Proof not found"));
        assert!(json.contains("4002")); // numeric_code
    }

    #[test]
    fn test_engine_error_conversion() {
        let id = SessionId::new();
        let api_error = ApiError::from(EngineError::SessionNotFound(id));
        assert_eq!(api_error.error.code, ErrorCode::SessionNotFound);
        assert_eq!(api_error.status(), StatusCode::NOT_FOUND);
        assert_eq!(api_error.error.resource_id, Some(id.to_string()));

        let api_error = ApiError::from(EngineError::StateConflict {
            expected: "verifying".to_string(),
            actual: "completed".to_string(),
        });
        assert_eq!(api_error.status(), StatusCode::CONFLICT);
        assert!(api_error.error.details.is_some());

        let api_error = ApiError::from(EngineError::RateLimited);
        assert_eq!(api_error.error.retry_after, Some(60));
    }

    #[test]
    fn test_expiry_maps_to_gone() {
        let api_error = ApiError::from(EngineError::ProofExpired("VC-1A2B-ABCDEF".to_string()));
        assert_eq!(api_error.status(), StatusCode::GONE);

        let api_error = ApiError::from(EngineError::SessionExpired(SessionId::new()));
        assert_eq!(api_error.status(), StatusCode::GONE);
    }
}
