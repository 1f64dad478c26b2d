//! Error types for the verification engine infrastructure

use thiserror::Error;

use crate::domain::SessionId;

/// Errors that can occur in the verification engine
#[derive(Error, Debug)]
pub enum EngineError {
    /// Request failed validation
    #[error("validation error: {0}")]
    Validation(String),

    /// Uploaded media exceeds the size ceiling
    #[error("media too large: {size} bytes exceeds maximum of {max}")]
    MediaTooLarge { size: u64, max: u64 },

    /// Uploaded media has a content type outside the allow-list
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Session not found
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    /// Proof not found
    #[error("proof not found: {0}")]
    ProofNotFound(String),

    /// Concurrent transition lost a compare-and-swap race
    #[error("state conflict: expected status {expected}, found {actual}")]
    StateConflict { expected: String, actual: String },

    /// Transition not present in the state graph
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },

    /// Session deadline passed
    #[error("session expired: {0}")]
    SessionExpired(SessionId),

    /// Proof deadline passed
    #[error("proof expired: {0}")]
    ProofExpired(String),

    /// Proof was revoked
    #[error("proof revoked: {0}")]
    ProofRevoked(String),

    /// Requester lacks the capability for this operation
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Interpretation service did not answer within the deadline
    #[error("interpretation timed out after {elapsed_ms}ms")]
    InterpretationTimeout { elapsed_ms: u64 },

    /// Interpretation service answered with an error
    #[error("interpretation failed: {0}")]
    InterpretationFailed(String),

    /// Interpretation service answered with output that failed validation
    #[error("malformed interpretation output: {0}")]
    MalformedOutput(String),

    /// Generated proof code collided with a live record
    #[error("proof code collision")]
    CodeCollision,

    /// Storage layer error
    #[error("storage error: {0}")]
    Storage(String),

    /// Rate limit exceeded
    #[error("rate limit exceeded")]
    RateLimited,

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
