//! Trait definitions for verification engine collaborators

use async_trait::async_trait;
#[cfg(test)]
use mockall::automock;

use crate::domain::{
    MediaRef, ProofCode, ProofRecord, ProofStatus, RawInterpretation, SessionId, SessionStatus,
    UserId, VerificationSession,
};

use super::audit::AuditEntry;
use super::Result;

/// Durable storage for verification sessions.
///
/// Invariant: every mutation lands together with its audit entries in one
/// atomic commit. A status change that cannot carry its audit trail must
/// not happen at all.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Insert a freshly created session together with its creation audit.
    async fn insert_session(
        &self,
        session: VerificationSession,
        audit: Vec<AuditEntry>,
    ) -> Result<()>;

    /// Fetch a session by id
    async fn get_session(&self, id: SessionId) -> Result<Option<VerificationSession>>;

    /// Commit a mutated session with compare-and-swap on status.
    ///
    /// The write only lands if the stored status still equals `expected`;
    /// a concurrent winner surfaces as `StateConflict` carrying the status
    /// actually found.
    async fn commit_session(
        &self,
        session: VerificationSession,
        expected: SessionStatus,
        audit: Vec<AuditEntry>,
    ) -> Result<()>;
}

/// Append-only storage for proof records.
///
/// Invariant: the proof code is unique among non-expired records; insertion
/// of a colliding code fails with `CodeCollision` so the issuer can
/// regenerate and retry. At most one live record exists per session; a
/// duplicate insert fails with `StateConflict`.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ProofStore: Send + Sync {
    /// Insert a new proof record together with its issuance audit
    async fn insert_proof(&self, record: ProofRecord, audit: Vec<AuditEntry>) -> Result<()>;

    /// Fetch a proof by its shareable code
    async fn get_proof_by_code(&self, code: &ProofCode) -> Result<Option<ProofRecord>>;

    /// Fetch the proof issued for a session, if any
    async fn get_proof_by_session(&self, session_id: SessionId) -> Result<Option<ProofRecord>>;

    /// Commit a proof status change with compare-and-swap on status
    async fn commit_proof_status(
        &self,
        record: ProofRecord,
        expected: ProofStatus,
        audit: Vec<AuditEntry>,
    ) -> Result<()>;
}

/// Append-only audit trail.
///
/// Entries written through the stores land atomically with their mutation;
/// `append` exists for events with no accompanying state change (denied
/// reads, rejected uploads). Entries are never updated or deleted.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append a standalone audit entry
    async fn append(&self, entry: AuditEntry) -> Result<()>;

    /// List all entries for a session in creation order
    async fn list_for_session(&self, session_id: SessionId) -> Result<Vec<AuditEntry>>;
}

/// Opaque blob storage for uploaded recordings.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store bytes, returning an opaque reference
    async fn write(&self, bytes: Vec<u8>, content_type: &str) -> Result<MediaRef>;

    /// Read bytes back by reference
    async fn read(&self, media_ref: &MediaRef) -> Result<Vec<u8>>;

    /// Delete a stored blob (explicit cleanup only)
    async fn delete(&self, media_ref: &MediaRef) -> Result<()>;
}

/// Upstream interpretation service.
///
/// Callers enforce their own deadline; implementations may block for the
/// full duration of the upstream call.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Interpreter: Send + Sync {
    /// Interpret a stored recording into raw recognition output
    async fn interpret(&self, media_ref: &MediaRef) -> Result<RawInterpretation>;
}

/// Out-of-band message sent to a user.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    /// A proof was issued for one of the user's sessions
    ProofIssued { code: ProofCode },
    /// One of the user's sessions failed
    SessionFailed { session_id: SessionId, reason: String },
    /// Short-lived numeric code for step-up verification
    StepUpCode { code: String, expires_in_secs: u64 },
}

/// Notification dispatcher for out-of-band delivery.
///
/// Delivery is best-effort; a failed notification never rolls back the
/// state change that triggered it.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a notification to a user
    async fn notify(&self, user_id: UserId, notification: Notification) -> Result<()>;
}

/// Health check for components
#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub session_store: ComponentHealth,
    pub blob_store: ComponentHealth,
    pub interpreter: ComponentHealth,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.session_store.is_healthy()
            && self.blob_store.is_healthy()
            && self.interpreter.is_healthy()
    }
}

/// Individual component health
#[derive(Debug, Clone)]
pub enum ComponentHealth {
    Healthy,
    Degraded { reason: String },
    Unhealthy { reason: String },
}

impl ComponentHealth {
    pub fn is_healthy(&self) -> bool {
        matches!(self, ComponentHealth::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, ComponentHealth::Unhealthy { .. })
    }
}
