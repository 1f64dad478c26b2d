//! Session state machine.
//!
//! All session mutations flow through [`SessionService::apply`]: the expiry
//! deadline is evaluated first, the requested transition is checked against
//! the legal graph, the field mutations are applied, and the result is
//! committed with compare-and-swap on status together with its audit entry.
//! A concurrent loser observes `StateConflict` and must re-read.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::domain::{
    DomainTag, FailureReason, SessionCommand, SessionId, SessionStatus, UserId,
    VerificationSession, DEFAULT_SESSION_TTL_MINUTES, MAX_SESSION_TTL_MINUTES,
    MIN_SESSION_TTL_MINUTES,
};
use crate::infra::{Actor, AuditAction, AuditEntryBuilder, EngineError, Result, SessionStore};
use crate::metrics::{metric_names, MetricsRegistry};

use super::trust::TrustPolicy;

/// States a session in `status` may legally move to.
pub fn allowed_transitions(status: SessionStatus) -> &'static [SessionStatus] {
    status.allowed_next()
}

/// Check one edge against the legal transition graph.
pub fn validate_transition(from: SessionStatus, to: SessionStatus) -> Result<()> {
    if from.can_transition_to(to) {
        Ok(())
    } else {
        Err(EngineError::InvalidTransition {
            from: from.to_string(),
            to: to.to_string(),
        })
    }
}

/// The authoritative owner of session lifecycle.
///
/// Also the single place lifecycle counters are incremented, so callers
/// driving the same transition from different paths cannot double-count.
pub struct SessionService {
    store: Arc<dyn SessionStore>,
    trust: TrustPolicy,
    metrics: Arc<MetricsRegistry>,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn SessionStore>,
        trust: TrustPolicy,
        metrics: Arc<MetricsRegistry>,
    ) -> Self {
        Self {
            store,
            trust,
            metrics,
        }
    }

    /// Create a session in the `created` state with a fixed deadline.
    pub async fn create(
        &self,
        user_id: UserId,
        domain: DomainTag,
        action: impl Into<String>,
        context: serde_json::Value,
        ttl_minutes: Option<i64>,
        actor: &Actor,
    ) -> Result<VerificationSession> {
        let ttl_minutes = ttl_minutes.unwrap_or(DEFAULT_SESSION_TTL_MINUTES);
        if !(MIN_SESSION_TTL_MINUTES..=MAX_SESSION_TTL_MINUTES).contains(&ttl_minutes) {
            return Err(EngineError::Validation(format!(
                "session ttl must be between {} and {} minutes, got {}",
                MIN_SESSION_TTL_MINUTES, MAX_SESSION_TTL_MINUTES, ttl_minutes
            )));
        }

        let session = VerificationSession::new(
            user_id,
            domain,
            action,
            context,
            Duration::minutes(ttl_minutes),
        );
        let entry = AuditEntryBuilder::new(
            session.id,
            AuditAction::SessionCreated,
            actor.id.clone(),
            actor.kind.clone(),
        )
        .field_change("status", None, SessionStatus::Created.to_string())
        .build();

        self.store.insert_session(session.clone(), vec![entry]).await?;
        self.metrics
            .inc_counter(metric_names::SESSIONS_CREATED)
            .await;
        Ok(session)
    }

    /// Fetch a session, resolving a passed deadline to `expired` first.
    pub async fn get(&self, id: SessionId) -> Result<VerificationSession> {
        let session = self
            .store
            .get_session(id)
            .await?
            .ok_or(EngineError::SessionNotFound(id))?;
        self.expire_if_due(session).await
    }

    /// Apply one command to a session.
    ///
    /// The deadline check runs before the transition is evaluated, so an
    /// expired session cannot be advanced even by a late async result.
    pub async fn apply(
        &self,
        id: SessionId,
        command: SessionCommand,
        actor: &Actor,
    ) -> Result<VerificationSession> {
        let session = self
            .store
            .get_session(id)
            .await?
            .ok_or(EngineError::SessionNotFound(id))?;

        let session = self.expire_if_due(session).await?;
        if session.status == SessionStatus::Expired {
            return Err(EngineError::SessionExpired(id));
        }

        let from = session.status;
        let to = command.target_status();
        validate_transition(from, to)?;

        let now = Utc::now();
        let mut next = session;
        next.status = to;
        next.updated_at = now;

        let entry = match command {
            SessionCommand::AttachMedia {
                media_ref,
                size_bytes,
            } => {
                if next.has_media() {
                    return Err(EngineError::Validation(
                        "media reference is write-once".to_string(),
                    ));
                }
                next.media_ref = Some(media_ref);
                next.media_size_bytes = Some(size_bytes);
                transition_entry(id, AuditAction::MediaAttached, from, to, actor).build()
            }
            SessionCommand::BeginProcessing => {
                transition_entry(id, AuditAction::StatusChanged, from, to, actor).build()
            }
            SessionCommand::AttachResult { result } => {
                let assessment = self.trust.evaluate(&result);
                next.trust_score = Some(assessment.score);
                next.requires_human_review = assessment.requires_human_review;
                next.interpreted = Some(result);
                transition_entry(id, AuditAction::ResultAttached, from, to, actor).build()
            }
            SessionCommand::MarkReady => {
                if next.interpreted.is_none() {
                    return Err(EngineError::Internal(
                        "cannot mark ready without an interpreted result".to_string(),
                    ));
                }
                transition_entry(id, AuditAction::StatusChanged, from, to, actor).build()
            }
            SessionCommand::Confirm => {
                next.completed_at = Some(now);
                transition_entry(id, AuditAction::ProofIssued, from, to, actor).build()
            }
            SessionCommand::Reject => {
                let reason = FailureReason::UserRejected;
                next.failure_reason = Some(reason.to_string());
                transition_entry(id, AuditAction::StatusChanged, from, to, actor)
                    .failed(reason.to_string())
                    .build()
            }
            SessionCommand::RecordFailure { reason } => {
                next.failure_reason = Some(reason.to_string());
                transition_entry(id, AuditAction::StatusChanged, from, to, actor)
                    .failed(reason.to_string())
                    .build()
            }
        };

        self.store
            .commit_session(next.clone(), from, vec![entry])
            .await?;
        match to {
            SessionStatus::Completed => {
                self.metrics
                    .inc_counter(metric_names::SESSIONS_COMPLETED)
                    .await
            }
            SessionStatus::Failed => {
                self.metrics
                    .inc_counter(metric_names::SESSIONS_FAILED)
                    .await
            }
            _ => {}
        }
        Ok(next)
    }

    /// Resolve a passed deadline to `expired`, once, via compare-and-swap.
    ///
    /// Returns the session as stored after the check. A lost race means
    /// another caller committed first; their outcome stands.
    async fn expire_if_due(&self, session: VerificationSession) -> Result<VerificationSession> {
        let now = Utc::now();
        if session.status.is_terminal() || !session.is_expired_at(now) {
            return Ok(session);
        }

        let id = session.id;
        let from = session.status;
        let mut expired = session;
        expired.status = SessionStatus::Expired;
        expired.updated_at = now;

        let system = Actor::system();
        let entry = transition_entry(id, AuditAction::StatusChanged, from, SessionStatus::Expired, &system)
            .build();

        match self
            .store
            .commit_session(expired.clone(), from, vec![entry])
            .await
        {
            Ok(()) => {
                self.metrics
                    .inc_counter(metric_names::SESSIONS_EXPIRED)
                    .await;
                Ok(expired)
            }
            Err(EngineError::StateConflict { .. }) => self
                .store
                .get_session(id)
                .await?
                .ok_or(EngineError::SessionNotFound(id)),
            Err(e) => Err(e),
        }
    }
}

fn transition_entry(
    session_id: SessionId,
    action: AuditAction,
    from: SessionStatus,
    to: SessionStatus,
    actor: &Actor,
) -> AuditEntryBuilder {
    AuditEntryBuilder::new(session_id, action, actor.id.clone(), actor.kind.clone())
        .field_change("status", Some(from.to_string()), to.to_string())
}
