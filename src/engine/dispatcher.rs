//! Async interpretation dispatch.
//!
//! Submitting media returns immediately; the interpretation call runs in a
//! detached task under a deadline. The task reports back exclusively through
//! [`SessionService::apply`], so a session that expired while the task was
//! in flight rejects the late result instead of resurrecting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::crypto::compute_raw_output_checksum;
use crate::domain::{
    FailureReason, InterpretedResult, MediaRef, SessionCommand, SessionId, UserId,
    VerificationSession,
};
use crate::infra::{Actor, EngineError, Interpreter, Notification, Notifier, Result};
use crate::metrics::{metric_names, MetricsRegistry};

use super::state::SessionService;

/// Deadline for one interpretation call.
pub const DEFAULT_INTERPRETATION_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// How long to wait for the interpretation service before failing the
    /// session with a timeout.
    pub timeout: Duration,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_INTERPRETATION_TIMEOUT_SECS),
        }
    }
}

/// Hands stored media to the interpretation service and feeds the outcome
/// back into the session state machine.
#[derive(Clone)]
pub struct InterpretationDispatcher {
    sessions: Arc<SessionService>,
    interpreter: Arc<dyn Interpreter>,
    notifier: Arc<dyn Notifier>,
    metrics: Arc<MetricsRegistry>,
    config: DispatcherConfig,
}

impl InterpretationDispatcher {
    pub fn new(
        sessions: Arc<SessionService>,
        interpreter: Arc<dyn Interpreter>,
        notifier: Arc<dyn Notifier>,
        metrics: Arc<MetricsRegistry>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            sessions,
            interpreter,
            notifier,
            metrics,
            config,
        }
    }

    /// Spawn the interpretation task for a session already in `processing`.
    ///
    /// Returns as soon as the task is spawned. The task is detached: shutdown
    /// does not await it, and a session it never reports back to resolves
    /// through lazy expiry.
    pub fn dispatch(&self, session: &VerificationSession) -> Result<()> {
        let media_ref = session.media_ref.clone().ok_or_else(|| {
            EngineError::Internal("cannot dispatch interpretation without media".to_string())
        })?;

        let this = self.clone();
        let session_id = session.id;
        let user_id = session.user_id;
        tokio::spawn(async move {
            this.run(session_id, user_id, media_ref).await;
        });
        Ok(())
    }

    async fn run(self, session_id: SessionId, user_id: UserId, media_ref: MediaRef) {
        self.metrics
            .inc_counter(metric_names::INTERPRETATIONS_DISPATCHED)
            .await;

        let started = Instant::now();
        let outcome =
            tokio::time::timeout(self.config.timeout, self.interpreter.interpret(&media_ref))
                .await;
        let elapsed = started.elapsed();
        self.metrics
            .observe_histogram(metric_names::INTERPRET_LATENCY, elapsed.as_secs_f64())
            .await;

        let raw = match outcome {
            Err(_) => {
                self.metrics
                    .inc_counter(metric_names::INTERPRETATIONS_TIMED_OUT)
                    .await;
                let reason = FailureReason::InterpretationTimeout {
                    elapsed_ms: elapsed.as_millis() as u64,
                };
                return self.fail(session_id, user_id, reason).await;
            }
            Ok(Err(e)) => {
                self.metrics
                    .inc_counter(metric_names::INTERPRETATIONS_FAILED)
                    .await;
                let reason = FailureReason::InterpretationUpstream(e.to_string());
                return self.fail(session_id, user_id, reason).await;
            }
            Ok(Ok(raw)) => raw,
        };

        if let Err(violation) = raw.validate() {
            self.metrics
                .inc_counter(metric_names::INTERPRETATIONS_FAILED)
                .await;
            return self
                .fail(session_id, user_id, FailureReason::MalformedOutput(violation))
                .await;
        }

        let raw_value = match serde_json::to_value(&raw) {
            Ok(value) => value,
            Err(e) => {
                self.metrics
                    .inc_counter(metric_names::INTERPRETATIONS_FAILED)
                    .await;
                return self
                    .fail(
                        session_id,
                        user_id,
                        FailureReason::MalformedOutput(e.to_string()),
                    )
                    .await;
            }
        };
        let checksum = compute_raw_output_checksum(&raw_value);
        let result = InterpretedResult::from_raw(&raw, checksum);
        let unit_count = result.unit_count();

        let session = match self
            .sessions
            .apply(
                session_id,
                SessionCommand::AttachResult { result },
                &Actor::system(),
            )
            .await
        {
            Ok(session) => session,
            Err(e) => return self.discard(session_id, "attach_result", e).await,
        };

        if session.requires_human_review {
            self.metrics
                .inc_counter(metric_names::REVIEW_FLAGGED)
                .await;
        }

        if let Err(e) = self
            .sessions
            .apply(session_id, SessionCommand::MarkReady, &Actor::system())
            .await
        {
            return self.discard(session_id, "mark_ready", e).await;
        }

        self.metrics
            .inc_counter(metric_names::INTERPRETATIONS_SUCCEEDED)
            .await;
        tracing::info!(
            session_id = %session_id,
            units = unit_count,
            trust_score = ?session.trust_score,
            requires_human_review = session.requires_human_review,
            "interpretation ready for confirmation"
        );
    }

    /// Drive the session to `failed` and tell the user.
    async fn fail(&self, session_id: SessionId, user_id: UserId, reason: FailureReason) {
        tracing::warn!(session_id = %session_id, reason = %reason, "interpretation failed");

        match self
            .sessions
            .apply(
                session_id,
                SessionCommand::RecordFailure {
                    reason: reason.clone(),
                },
                &Actor::system(),
            )
            .await
        {
            Ok(_) => {
                let notification = Notification::SessionFailed {
                    session_id,
                    reason: reason.to_string(),
                };
                if let Err(e) = self.notifier.notify(user_id, notification).await {
                    tracing::warn!(
                        session_id = %session_id,
                        error = %e,
                        "failure notification not delivered"
                    );
                }
            }
            Err(e) => self.discard(session_id, "record_failure", e).await,
        }
    }

    /// The state machine refused the outcome; log why and drop it.
    async fn discard(&self, session_id: SessionId, step: &str, err: EngineError) {
        match err {
            EngineError::SessionExpired(_) => {
                self.metrics
                    .inc_counter(metric_names::LATE_RESULTS_DISCARDED)
                    .await;
                tracing::warn!(
                    session_id = %session_id,
                    step,
                    "late interpretation result discarded, session expired"
                );
            }
            EngineError::StateConflict { .. } | EngineError::InvalidTransition { .. } => {
                tracing::warn!(
                    session_id = %session_id,
                    step,
                    error = %err,
                    "interpretation outcome superseded by a concurrent transition"
                );
            }
            other => {
                tracing::error!(
                    session_id = %session_id,
                    step,
                    error = %other,
                    "failed to record interpretation outcome"
                );
            }
        }
    }
}
