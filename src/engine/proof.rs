//! Proof issuance and lifecycle.
//!
//! Confirming a session is a three-step commit: insert the proof record as
//! `pending`, complete the session (the issuance audit entry rides on that
//! commit), then flip the record to `verified`. Each step is idempotent, so
//! a confirm interrupted at any point resumes cleanly on retry.

use std::sync::Arc;

use chrono::Utc;

use crate::crypto::{compute_media_signature, MediaSignatureParams};
use crate::domain::{
    ProofCode, ProofRecord, ProofStatus, SessionCommand, SessionStatus, VerificationSession,
};
use crate::infra::{
    Actor, AuditAction, AuditEntryBuilder, EngineError, Notification, Notifier, ProofStore,
    Result,
};
use crate::metrics::{metric_names, MetricsRegistry};

use super::state::SessionService;

/// Attempts to find a free code before giving up.
///
/// Codes embed the issuance millisecond, so a collision means the random
/// suffix repeated within one millisecond or the clock jumped backwards
/// into the window of a live record. Either way a fresh draw almost always
/// clears it.
pub const MAX_CODE_ATTEMPTS: usize = 5;

/// Issues, finalizes and revokes proof records.
#[derive(Clone)]
pub struct ProofIssuer {
    sessions: Arc<SessionService>,
    proofs: Arc<dyn ProofStore>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<MetricsRegistry>,
}

impl ProofIssuer {
    pub fn new(
        sessions: Arc<SessionService>,
        proofs: Arc<dyn ProofStore>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            sessions,
            proofs,
            notifier,
            metrics,
        }
    }

    /// Confirm a session and produce its verified proof.
    ///
    /// Accepts a session in `verifying` (fresh confirm, or resume of one
    /// interrupted mid-flow) or `completed` (idempotent re-confirm). Anything
    /// else is a state conflict.
    pub async fn confirm(
        &self,
        session: &VerificationSession,
        actor: &Actor,
    ) -> Result<ProofRecord> {
        match session.status {
            SessionStatus::Verifying => {}
            SessionStatus::Completed => {
                let record = self
                    .proofs
                    .get_proof_by_session(session.id)
                    .await?
                    .ok_or_else(|| {
                        EngineError::Internal(format!(
                            "completed session {} has no proof record",
                            session.id
                        ))
                    })?;
                return self.ensure_verified(record).await;
            }
            other => {
                return Err(EngineError::StateConflict {
                    expected: SessionStatus::Verifying.to_string(),
                    actual: other.to_string(),
                })
            }
        }

        let record = match self.proofs.get_proof_by_session(session.id).await? {
            Some(existing) => existing,
            None => self.issue_pending(session).await?,
        };

        // Completing the session carries the issuance entry; a crash after
        // this commit leaves a pending record that the resume path flips.
        self.sessions
            .apply(session.id, SessionCommand::Confirm, actor)
            .await?;
        let record = self.ensure_verified(record).await?;

        self.metrics.inc_counter(metric_names::PROOFS_ISSUED).await;

        let notification = Notification::ProofIssued {
            code: record.code.clone(),
        };
        if let Err(e) = self.notifier.notify(session.user_id, notification).await {
            tracing::warn!(
                session_id = %session.id,
                error = %e,
                "proof notification not delivered"
            );
        }

        tracing::info!(
            code = %record.code,
            session_id = %session.id,
            user_id = %session.user_id,
            action = %record.action,
            "proof issued"
        );
        Ok(record)
    }

    /// Fetch a record by code, resolving a passed deadline to `expired`.
    pub async fn resolve(&self, code: &ProofCode) -> Result<ProofRecord> {
        let record = self
            .proofs
            .get_proof_by_code(code)
            .await?
            .ok_or_else(|| EngineError::ProofNotFound(code.to_string()))?;

        let now = Utc::now();
        if record.status.is_terminal() || !record.is_expired_at(now) {
            return Ok(record);
        }

        let from = record.status;
        let mut expired = record;
        expired.status = ProofStatus::Expired;
        match self
            .proofs
            .commit_proof_status(expired.clone(), from, vec![])
            .await
        {
            Ok(()) => Ok(expired),
            // Another reader resolved it first; take their outcome
            Err(EngineError::StateConflict { .. }) => self
                .proofs
                .get_proof_by_code(code)
                .await?
                .ok_or_else(|| EngineError::ProofNotFound(code.to_string())),
            Err(e) => Err(e),
        }
    }

    /// Revoke a proof. Terminal records cannot be revoked again.
    pub async fn revoke(&self, record: ProofRecord, actor: &Actor) -> Result<ProofRecord> {
        match record.status {
            ProofStatus::Revoked => {
                return Err(EngineError::ProofRevoked(record.code.to_string()))
            }
            ProofStatus::Expired => {
                return Err(EngineError::ProofExpired(record.code.to_string()))
            }
            ProofStatus::Pending | ProofStatus::Verified => {}
        }

        let from = record.status;
        let mut revoked = record;
        revoked.status = ProofStatus::Revoked;
        revoked.revoked_at = Some(Utc::now());

        let entry = AuditEntryBuilder::new(
            revoked.session_id,
            AuditAction::ProofRevoked,
            actor.id.clone(),
            actor.kind.clone(),
        )
        .field_change("status", Some(from.to_string()), ProofStatus::Revoked.to_string())
        .build();

        self.proofs
            .commit_proof_status(revoked.clone(), from, vec![entry])
            .await?;
        self.metrics.inc_counter(metric_names::PROOFS_REVOKED).await;
        tracing::info!(
            code = %revoked.code,
            session_id = %revoked.session_id,
            actor = %actor.id,
            "proof revoked"
        );
        Ok(revoked)
    }

    /// Build and insert a pending record, regenerating the code on collision.
    async fn issue_pending(&self, session: &VerificationSession) -> Result<ProofRecord> {
        let media_ref = session.media_ref.as_ref().ok_or_else(|| {
            EngineError::Internal(format!("session {} has no media to bind", session.id))
        })?;
        let result = session.interpreted.as_ref().ok_or_else(|| {
            EngineError::Internal(format!(
                "session {} has no interpreted result to bind",
                session.id
            ))
        })?;
        let result_value = serde_json::to_value(result)
            .map_err(|e| EngineError::Internal(format!("result not serializable: {}", e)))?;

        let mut attempts = 0;
        loop {
            let issued_at = Utc::now();
            let code = ProofCode::generate(issued_at);
            let media_signature = compute_media_signature(&MediaSignatureParams {
                media_ref: media_ref.as_str(),
                result: &result_value,
                issued_at_millis: issued_at.timestamp_millis(),
            });
            let record = ProofRecord::issue(
                code,
                session.id,
                session.user_id,
                session.action.clone(),
                media_signature,
                result.clone(),
                issued_at,
            );

            match self.proofs.insert_proof(record.clone(), vec![]).await {
                Ok(()) => return Ok(record),
                Err(EngineError::CodeCollision) => {
                    attempts += 1;
                    self.metrics
                        .inc_counter(metric_names::CODE_COLLISIONS)
                        .await;
                    tracing::warn!(
                        session_id = %session.id,
                        attempts,
                        "proof code collided with a live record, regenerating"
                    );
                    if attempts >= MAX_CODE_ATTEMPTS {
                        return Err(EngineError::CodeCollision);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Flip a pending record to `verified`; already-verified records pass
    /// through untouched.
    async fn ensure_verified(&self, record: ProofRecord) -> Result<ProofRecord> {
        match record.status {
            ProofStatus::Verified => Ok(record),
            ProofStatus::Pending => {
                let mut verified = record;
                verified.status = ProofStatus::Verified;
                verified.verified_at = Some(Utc::now());
                self.proofs
                    .commit_proof_status(verified.clone(), ProofStatus::Pending, vec![])
                    .await?;
                Ok(verified)
            }
            ProofStatus::Expired => Err(EngineError::ProofExpired(record.code.to_string())),
            ProofStatus::Revoked => Err(EngineError::ProofRevoked(record.code.to_string())),
        }
    }
}
