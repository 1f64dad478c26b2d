//! The verification pipeline behind one facade.
//!
//! [`VerificationEngine`] wires the session state machine, media intake,
//! interpretation dispatch and proof issuance together and is the only type
//! the API layer talks to. Every entry point takes the caller's
//! [`AuthContext`] and runs the access gateway before touching state;
//! denials are themselves audited.

use std::sync::Arc;

use crate::auth::AuthContext;
use crate::crypto::{verify_media_signature, MediaSignatureParams};
use crate::domain::{
    DomainTag, ProofCode, ProofRecord, SessionCommand, SessionId, SessionStatus, UserId,
    VerificationSession,
};
use crate::infra::{
    AuditAction, AuditEntryBuilder, AuditSink, BlobStore, ComponentHealth, EngineError,
    HealthStatus, Interpreter, Notifier, ProofStore, Result, SessionStore,
};
use crate::metrics::{metric_names, MetricsRegistry, TimerGuard};

use super::dispatcher::{DispatcherConfig, InterpretationDispatcher};
use super::intake::{IntakeConfig, MediaIntake};
use super::proof::ProofIssuer;
use super::state::SessionService;
use super::trust::TrustPolicy;

/// Tunables for the assembled engine.
#[derive(Debug, Clone, Default)]
pub struct EngineConfig {
    pub intake: IntakeConfig,
    pub dispatcher: DispatcherConfig,
    pub trust: TrustPolicy,
}

/// What a confirm call produced.
#[derive(Debug, Clone)]
pub enum ConfirmOutcome {
    /// User accepted; the verified proof record
    Issued(ProofRecord),
    /// User declined; the failed session
    Rejected(VerificationSession),
}

/// A proof read, with the signature checked against the stored media.
#[derive(Debug, Clone)]
pub struct ProofReadout {
    pub record: ProofRecord,
    /// Whether the stored signature still matches the media reference,
    /// result snapshot and issuance instant it claims to bind
    pub signature_valid: bool,
}

/// Facade over the whole verification pipeline.
pub struct VerificationEngine {
    sessions: Arc<SessionService>,
    session_store: Arc<dyn SessionStore>,
    intake: MediaIntake,
    dispatcher: InterpretationDispatcher,
    issuer: ProofIssuer,
    audit: Arc<dyn AuditSink>,
    blobs: Arc<dyn BlobStore>,
    metrics: Arc<MetricsRegistry>,
}

impl VerificationEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        session_store: Arc<dyn SessionStore>,
        proof_store: Arc<dyn ProofStore>,
        audit: Arc<dyn AuditSink>,
        blobs: Arc<dyn BlobStore>,
        interpreter: Arc<dyn Interpreter>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<MetricsRegistry>,
        config: EngineConfig,
    ) -> Self {
        let sessions = Arc::new(SessionService::new(
            session_store.clone(),
            config.trust,
            metrics.clone(),
        ));
        let intake = MediaIntake::new(config.intake, blobs.clone());
        let dispatcher = InterpretationDispatcher::new(
            sessions.clone(),
            interpreter,
            notifier.clone(),
            metrics.clone(),
            config.dispatcher,
        );
        let issuer = ProofIssuer::new(sessions.clone(), proof_store, notifier, metrics.clone());

        Self {
            sessions,
            session_store,
            intake,
            dispatcher,
            issuer,
            audit,
            blobs,
            metrics,
        }
    }

    /// Create a session.
    ///
    /// `owner` lets a service caller open a session on another user's
    /// behalf; everyone else may only create sessions for themselves.
    pub async fn create_session(
        &self,
        auth: &AuthContext,
        owner: Option<UserId>,
        domain: DomainTag,
        action: impl Into<String>,
        context: serde_json::Value,
        ttl_minutes: Option<i64>,
    ) -> Result<VerificationSession> {
        let action = action.into();
        if action.trim().is_empty() {
            return Err(EngineError::Validation("action must not be empty".to_string()));
        }
        if domain.as_str().trim().is_empty() {
            return Err(EngineError::Validation("domain must not be empty".to_string()));
        }

        let user_id = match owner {
            Some(target) if target != auth.user_id => {
                if !auth.capabilities.service {
                    return Err(EngineError::Forbidden(
                        "only service callers may create sessions for another user".to_string(),
                    ));
                }
                target
            }
            Some(target) => target,
            None => auth.user_id,
        };

        self.sessions
            .create(user_id, domain, action, context, ttl_minutes, &auth.actor())
            .await
    }

    /// Fetch a session for polling.
    pub async fn session(
        &self,
        auth: &AuthContext,
        session_id: SessionId,
    ) -> Result<VerificationSession> {
        let session = self.sessions.get(session_id).await?;
        if !auth.can_manage_session(session.user_id) {
            return Err(self.deny(session_id, auth, "session access").await);
        }
        Ok(session)
    }

    /// Validate and store a recording, then hand it to the dispatcher.
    ///
    /// Returns with the session in `processing`; interpretation continues in
    /// the background and the caller polls for the outcome.
    pub async fn submit_media(
        &self,
        auth: &AuthContext,
        session_id: SessionId,
        content_type: &str,
        declared_len: Option<u64>,
        bytes: Vec<u8>,
    ) -> Result<VerificationSession> {
        let _timer = TimerGuard::new(self.metrics.clone(), metric_names::INTAKE_LATENCY);

        let session = self.sessions.get(session_id).await?;
        if !auth.can_manage_session(session.user_id) {
            return Err(self.deny(session_id, auth, "session access").await);
        }
        if session.status == SessionStatus::Expired {
            return Err(EngineError::SessionExpired(session_id));
        }
        if session.status != SessionStatus::Created {
            return Err(EngineError::InvalidTransition {
                from: session.status.to_string(),
                to: SessionStatus::Uploading.to_string(),
            });
        }

        let (media_ref, size_bytes) = match self
            .intake
            .accept(content_type, declared_len, bytes)
            .await
        {
            Ok(stored) => stored,
            Err(e) => {
                self.metrics
                    .inc_counter(metric_names::MEDIA_REJECTED)
                    .await;
                return Err(e);
            }
        };
        self.metrics
            .inc_counter(metric_names::MEDIA_ACCEPTED)
            .await;

        let actor = auth.actor();
        if let Err(e) = self
            .sessions
            .apply(
                session_id,
                SessionCommand::AttachMedia {
                    media_ref: media_ref.clone(),
                    size_bytes,
                },
                &actor,
            )
            .await
        {
            // Lost a race after storing the blob; drop the orphan
            if let Err(del) = self.blobs.delete(&media_ref).await {
                tracing::warn!(
                    media_ref = %media_ref,
                    error = %del,
                    "orphaned media blob not deleted"
                );
            }
            return Err(e);
        }

        let processing = self
            .sessions
            .apply(session_id, SessionCommand::BeginProcessing, &actor)
            .await?;
        self.dispatcher.dispatch(&processing)?;
        Ok(processing)
    }

    /// Record the user's verdict on the presented interpretation.
    pub async fn confirm(
        &self,
        auth: &AuthContext,
        session_id: SessionId,
        accept: bool,
    ) -> Result<ConfirmOutcome> {
        let _timer = TimerGuard::new(self.metrics.clone(), metric_names::CONFIRM_LATENCY);

        let session = self.sessions.get(session_id).await?;
        if !auth.can_manage_session(session.user_id) {
            return Err(self.deny(session_id, auth, "session access").await);
        }
        if session.status == SessionStatus::Expired {
            return Err(EngineError::SessionExpired(session_id));
        }

        let actor = auth.actor();
        if accept {
            let record = self.issuer.confirm(&session, &actor).await?;
            Ok(ConfirmOutcome::Issued(record))
        } else {
            let failed = self
                .sessions
                .apply(session_id, SessionCommand::Reject, &actor)
                .await?;
            Ok(ConfirmOutcome::Rejected(failed))
        }
    }

    /// Look up a proof by its shareable code.
    pub async fn read_proof(&self, auth: &AuthContext, code: &str) -> Result<ProofReadout> {
        if !ProofCode::is_well_formed(code) {
            return Err(EngineError::Validation(format!(
                "malformed proof code: {}",
                code
            )));
        }

        let record = self.issuer.resolve(&ProofCode::from(code)).await?;
        if !auth.can_read_proof(record.user_id) {
            return Err(self.deny(record.session_id, auth, "proof access").await);
        }
        self.metrics.inc_counter(metric_names::PROOF_LOOKUPS).await;

        let signature_valid = self.check_signature(&record).await;
        Ok(ProofReadout {
            record,
            signature_valid,
        })
    }

    /// Revoke a proof.
    pub async fn revoke_proof(&self, auth: &AuthContext, code: &str) -> Result<ProofRecord> {
        if !ProofCode::is_well_formed(code) {
            return Err(EngineError::Validation(format!(
                "malformed proof code: {}",
                code
            )));
        }

        let record = self.issuer.resolve(&ProofCode::from(code)).await?;
        if !auth.can_revoke_proof(record.user_id) {
            return Err(self.deny(record.session_id, auth, "proof revocation").await);
        }
        self.issuer.revoke(record, &auth.actor()).await
    }

    /// Component health for the liveness endpoint.
    pub async fn health(&self) -> HealthStatus {
        let session_store = match self
            .session_store
            .get_session(SessionId::from_uuid(uuid::Uuid::nil()))
            .await
        {
            Ok(_) => ComponentHealth::Healthy,
            Err(e) => ComponentHealth::Unhealthy {
                reason: e.to_string(),
            },
        };

        let blob_store = match self
            .blobs
            .write(b"probe".to_vec(), "application/octet-stream")
            .await
        {
            Ok(probe_ref) => {
                if let Err(e) = self.blobs.delete(&probe_ref).await {
                    tracing::warn!(error = %e, "health probe blob not deleted");
                }
                ComponentHealth::Healthy
            }
            Err(e) => ComponentHealth::Unhealthy {
                reason: e.to_string(),
            },
        };

        // No cheap interpreter probe exists; failures surface per session
        let interpreter = ComponentHealth::Healthy;

        HealthStatus {
            session_store,
            blob_store,
            interpreter,
        }
    }

    /// Recompute the signature binding from stored state.
    async fn check_signature(&self, record: &ProofRecord) -> bool {
        let session = match self.session_store.get_session(record.session_id).await {
            Ok(Some(session)) => session,
            Ok(None) => {
                tracing::warn!(
                    code = %record.code,
                    session_id = %record.session_id,
                    "proof references a missing session"
                );
                return false;
            }
            Err(e) => {
                tracing::warn!(code = %record.code, error = %e, "signature check read failed");
                return false;
            }
        };

        let Some(media_ref) = session.media_ref else {
            return false;
        };
        let Ok(result_value) = serde_json::to_value(&record.result) else {
            return false;
        };

        verify_media_signature(
            &MediaSignatureParams {
                media_ref: media_ref.as_str(),
                result: &result_value,
                issued_at_millis: record.created_at.timestamp_millis(),
            },
            &record.media_signature,
        )
    }

    /// Record a denial and produce the error the caller gets.
    async fn deny(&self, session_id: SessionId, auth: &AuthContext, what: &str) -> EngineError {
        let actor = auth.actor();
        let entry = AuditEntryBuilder::new(
            session_id,
            AuditAction::AccessDenied,
            actor.id,
            actor.kind,
        )
        .failed(format!("{} denied", what))
        .build();
        if let Err(e) = self.audit.append(entry).await {
            tracing::warn!(session_id = %session_id, error = %e, "access denial not recorded");
        }
        self.metrics
            .inc_counter(metric_names::ACCESS_DENIED)
            .await;
        EngineError::Forbidden(format!("{} denied", what))
    }
}
