//! Audit trail for session and proof mutations
//!
//! Every committed mutation carries its audit entry into the store in the
//! same atomic write; a mutation that succeeds without its entry is a
//! correctness bug. Standalone events (denied reads, rejected uploads) go
//! through `AuditSink::append`.
//!
//! Entries are immutable once written and are returned in creation order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::SessionId;

/// Audit entry action types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Session inserted in the `created` state
    SessionCreated,
    /// Plain status transition with no payload attached
    StatusChanged,
    /// Recording stored and attached (`created -> uploading`)
    MediaAttached,
    /// Interpretation attached (`processing -> transforming`)
    ResultAttached,
    /// Proof issued for the completing session (`verifying -> completed`)
    ProofIssued,
    /// Proof revoked by its owner or a service account
    ProofRevoked,
    /// Read request denied by the access gateway
    AccessDenied,
    /// Anything else
    Custom(String),
}

impl std::fmt::Display for AuditAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditAction::SessionCreated => write!(f, "session_created"),
            AuditAction::StatusChanged => write!(f, "status_changed"),
            AuditAction::MediaAttached => write!(f, "media_attached"),
            AuditAction::ResultAttached => write!(f, "result_attached"),
            AuditAction::ProofIssued => write!(f, "proof_issued"),
            AuditAction::ProofRevoked => write!(f, "proof_revoked"),
            AuditAction::AccessDenied => write!(f, "access_denied"),
            AuditAction::Custom(s) => write!(f, "custom:{}", s),
        }
    }
}

/// Audit trail entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Unique entry ID
    pub id: Uuid,
    /// Session this entry belongs to
    pub session_id: SessionId,
    /// When the mutation was committed
    pub timestamp: DateTime<Utc>,
    /// The action that was performed
    pub action: AuditAction,
    /// Field that changed, if the entry records a field mutation
    pub field: Option<String>,
    /// Value before the mutation
    pub old_value: Option<String>,
    /// Value after the mutation
    pub new_value: Option<String>,
    /// Actor who performed the action (user ID, API key label, "dispatcher")
    pub actor: String,
    /// Actor type (user, service, system)
    pub actor_type: String,
    /// Whether the recorded action succeeded
    pub success: bool,
    /// Error message if failed
    pub error_message: Option<String>,
}

impl AuditEntry {
    /// Emit the entry as a structured tracing event.
    ///
    /// Store implementations call this once per persisted entry so the log
    /// stream mirrors the durable trail.
    pub fn emit(&self) {
        if self.success {
            tracing::info!(
                session_id = %self.session_id,
                action = %self.action,
                actor = %self.actor,
                actor_type = %self.actor_type,
                field = ?self.field,
                old_value = ?self.old_value,
                new_value = ?self.new_value,
                "audit entry"
            );
        } else {
            tracing::warn!(
                session_id = %self.session_id,
                action = %self.action,
                actor = %self.actor,
                actor_type = %self.actor_type,
                error = ?self.error_message,
                "audit entry (failed)"
            );
        }
    }
}

/// Identity recorded on audit entries.
#[derive(Debug, Clone, PartialEq)]
pub struct Actor {
    /// Stable identifier (user UUID, API key label, "system")
    pub id: String,
    /// Actor type (user, service, system)
    pub kind: String,
}

impl Actor {
    pub fn user(user_id: impl std::fmt::Display) -> Self {
        Self {
            id: user_id.to_string(),
            kind: "user".to_string(),
        }
    }

    pub fn service(label: impl Into<String>) -> Self {
        Self {
            id: label.into(),
            kind: "service".to_string(),
        }
    }

    /// The engine itself (dispatcher, lazy expiry)
    pub fn system() -> Self {
        Self {
            id: "system".to_string(),
            kind: "system".to_string(),
        }
    }
}

/// Builder for creating audit entries
pub struct AuditEntryBuilder {
    session_id: SessionId,
    action: AuditAction,
    field: Option<String>,
    old_value: Option<String>,
    new_value: Option<String>,
    actor: String,
    actor_type: String,
    success: bool,
    error_message: Option<String>,
}

impl AuditEntryBuilder {
    /// Create a new audit entry builder
    pub fn new(
        session_id: SessionId,
        action: AuditAction,
        actor: impl Into<String>,
        actor_type: impl Into<String>,
    ) -> Self {
        Self {
            session_id,
            action,
            field: None,
            old_value: None,
            new_value: None,
            actor: actor.into(),
            actor_type: actor_type.into(),
            success: true,
            error_message: None,
        }
    }

    /// Record a field mutation with its before/after values
    pub fn field_change(
        mut self,
        field: impl Into<String>,
        old_value: Option<String>,
        new_value: impl Into<String>,
    ) -> Self {
        self.field = Some(field.into());
        self.old_value = old_value;
        self.new_value = Some(new_value.into());
        self
    }

    /// Mark as failed with error message
    pub fn failed(mut self, error: impl Into<String>) -> Self {
        self.success = false;
        self.error_message = Some(error.into());
        self
    }

    /// Build the audit entry
    pub fn build(self) -> AuditEntry {
        AuditEntry {
            id: Uuid::new_v4(),
            session_id: self.session_id,
            timestamp: Utc::now(),
            action: self.action,
            field: self.field,
            old_value: self.old_value,
            new_value: self.new_value,
            actor: self.actor,
            actor_type: self.actor_type,
            success: self.success,
            error_message: self.error_message,
        }
    }
}
