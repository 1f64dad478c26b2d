//! End-to-end verification flows through the engine facade.
//!
//! These exercise the full path a client sees: create a session, upload a
//! recording, wait for interpretation, confirm, then read and revoke the
//! proof. The in-memory stores are the real implementations the dev server
//! runs on.

mod common;

use chrono::{Duration as ChronoDuration, Utc};
use serde_json::json;

use vproof_engine::domain::{
    DomainTag, ProofStatus, SessionStatus, UserId, VerificationSession,
};
use vproof_engine::engine::{ConfirmOutcome, DispatcherConfig, EngineConfig, IntakeConfig};
use vproof_engine::infra::{
    AuditAction, AuditSink, EngineError, ProofStore, ScriptedInterpreter, SessionStore,
};
use vproof_engine::metrics::metric_names;

use common::*;

#[tokio::test]
async fn test_recorded_approval_end_to_end() {
    let h = EngineHarness::new();
    let auth = owner_ctx();

    let session = h
        .engine
        .create_session(
            &auth,
            None,
            healthcare_domain(),
            "approve_payment",
            json!({"invoice": "inv-889"}),
            Some(10),
        )
        .await
        .unwrap();
    assert_eq!(session.status, SessionStatus::Created);
    assert_eq!(
        session.expires_at - session.created_at,
        ChronoDuration::minutes(10)
    );

    let uploaded = h
        .engine
        .submit_media(
            &auth,
            session.id,
            "video/mp4",
            Some(2 * 1024 * 1024),
            mp4_bytes(2 * 1024 * 1024),
        )
        .await
        .unwrap();
    assert_eq!(uploaded.status, SessionStatus::Processing);
    assert_eq!(uploaded.media_size_bytes, Some(2 * 1024 * 1024));

    let ready = h.wait_for_status(session.id, SessionStatus::Verifying).await;
    let result = ready.interpreted.as_ref().unwrap();
    assert_eq!(result.glosses(), vec!["i", "approve", "payment"]);
    assert!(!ready.requires_human_review);

    let outcome = h.engine.confirm(&auth, session.id, true).await.unwrap();
    let record = match outcome {
        ConfirmOutcome::Issued(record) => record,
        ConfirmOutcome::Rejected(_) => panic!("expected issuance"),
    };
    assert_eq!(record.status, ProofStatus::Verified);
    assert_eq!(
        record.expires_at - record.created_at,
        ChronoDuration::hours(24)
    );

    let readout = h
        .engine
        .read_proof(&auth, record.code.as_str())
        .await
        .unwrap();
    assert!(readout.signature_valid);
    assert_eq!(readout.record.result.unit_count(), 3);

    let trail = h.store.list_for_session(session.id).await.unwrap();
    let actions: Vec<_> = trail.iter().map(|e| e.action.clone()).collect();
    assert_eq!(
        actions,
        vec![
            AuditAction::SessionCreated,
            AuditAction::MediaAttached,
            AuditAction::StatusChanged,
            AuditAction::ResultAttached,
            AuditAction::StatusChanged,
            AuditAction::ProofIssued,
        ]
    );

    assert_eq!(h.metrics.get_counter(metric_names::SESSIONS_CREATED).await, 1);
    assert_eq!(h.metrics.get_counter(metric_names::MEDIA_ACCEPTED).await, 1);
    assert_eq!(h.metrics.get_counter(metric_names::PROOFS_ISSUED).await, 1);
    assert_eq!(
        h.metrics.get_counter(metric_names::SESSIONS_COMPLETED).await,
        1
    );
}

#[tokio::test]
async fn test_rejection_fails_session_without_proof() {
    let h = EngineHarness::new();
    let auth = owner_ctx();

    let session = h
        .engine
        .create_session(
            &auth,
            None,
            DomainTag::legal(),
            "approve_contract",
            json!({}),
            None,
        )
        .await
        .unwrap();
    h.engine
        .submit_media(&auth, session.id, "video/webm", None, mp4_bytes(4096))
        .await
        .unwrap();
    h.wait_for_status(session.id, SessionStatus::Verifying).await;

    let outcome = h.engine.confirm(&auth, session.id, false).await.unwrap();
    let failed = match outcome {
        ConfirmOutcome::Rejected(session) => session,
        ConfirmOutcome::Issued(_) => panic!("expected rejection"),
    };
    assert_eq!(failed.status, SessionStatus::Failed);
    assert_eq!(
        failed.failure_reason.as_deref(),
        Some("user rejected interpretation")
    );

    assert!(h
        .store
        .get_proof_by_session(session.id)
        .await
        .unwrap()
        .is_none());
    assert_eq!(h.metrics.get_counter(metric_names::PROOFS_ISSUED).await, 0);
    assert_eq!(h.metrics.get_counter(metric_names::SESSIONS_FAILED).await, 1);
}

#[tokio::test]
async fn test_low_confidence_flags_review_without_blocking() {
    let h = EngineHarness::with_interpretation(hesitant_interpretation());
    let auth = owner_ctx();

    let session = h
        .engine
        .create_session(&auth, None, healthcare_domain(), "refill_rx", json!({}), None)
        .await
        .unwrap();
    h.engine
        .submit_media(&auth, session.id, "video/mp4", None, mp4_bytes(8192))
        .await
        .unwrap();

    let ready = h.wait_for_status(session.id, SessionStatus::Verifying).await;
    assert!(ready.requires_human_review);
    assert!(ready.trust_score.unwrap() < 0.75);
    assert_eq!(h.metrics.get_counter(metric_names::REVIEW_FLAGGED).await, 1);

    // The flag is advisory; the owner can still confirm
    let outcome = h.engine.confirm(&auth, session.id, true).await.unwrap();
    assert!(matches!(outcome, ConfirmOutcome::Issued(_)));
}

#[tokio::test]
async fn test_malformed_upstream_output_fails_session() {
    let h = EngineHarness::with_interpretation(mismatched_interpretation());
    let auth = owner_ctx();

    let session = h
        .engine
        .create_session(&auth, None, DomainTag::general(), "sign_waiver", json!({}), None)
        .await
        .unwrap();
    h.engine
        .submit_media(&auth, session.id, "video/mp4", None, mp4_bytes(2048))
        .await
        .unwrap();

    let failed = h.wait_for_status(session.id, SessionStatus::Failed).await;
    assert!(failed
        .failure_reason
        .as_deref()
        .unwrap()
        .starts_with("malformed interpretation output"));
    assert_eq!(
        h.metrics
            .get_counter(metric_names::INTERPRETATIONS_FAILED)
            .await,
        1
    );
}

#[tokio::test]
async fn test_interpretation_timeout_fails_session() {
    let interpreter = ScriptedInterpreter::new(approval_interpretation())
        .with_delay(std::time::Duration::from_millis(200));
    let config = EngineConfig {
        dispatcher: DispatcherConfig {
            timeout: std::time::Duration::from_millis(20),
        },
        ..EngineConfig::default()
    };
    let h = EngineHarness::with_interpreter(std::sync::Arc::new(interpreter), config);
    let auth = owner_ctx();

    let session = h
        .engine
        .create_session(&auth, None, DomainTag::general(), "sign_waiver", json!({}), None)
        .await
        .unwrap();
    h.engine
        .submit_media(&auth, session.id, "video/mp4", None, mp4_bytes(2048))
        .await
        .unwrap();

    let failed = h.wait_for_status(session.id, SessionStatus::Failed).await;
    assert!(failed
        .failure_reason
        .as_deref()
        .unwrap()
        .starts_with("interpretation timed out after"));
    assert_eq!(
        h.metrics
            .get_counter(metric_names::INTERPRETATIONS_TIMED_OUT)
            .await,
        1
    );
}

#[tokio::test]
async fn test_intake_rejections_leave_session_retryable() {
    let h = EngineHarness::new();
    let auth = owner_ctx();

    let session = h
        .engine
        .create_session(&auth, None, healthcare_domain(), "approve_payment", json!({}), None)
        .await
        .unwrap();

    let err = h
        .engine
        .submit_media(&auth, session.id, "image/png", None, mp4_bytes(100))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnsupportedMediaType(_)));

    let err = h
        .engine
        .submit_media(&auth, session.id, "video/mp4", Some(999), mp4_bytes(100))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    let err = h
        .engine
        .submit_media(&auth, session.id, "video/mp4", None, Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Validation(_)));

    assert_eq!(h.metrics.get_counter(metric_names::MEDIA_REJECTED).await, 3);
    assert_eq!(h.metrics.get_counter(metric_names::MEDIA_ACCEPTED).await, 0);

    // The session never left `created`; a corrected upload still works
    let retried = h
        .engine
        .submit_media(&auth, session.id, "video/mp4", None, mp4_bytes(100))
        .await
        .unwrap();
    assert_eq!(retried.status, SessionStatus::Processing);
}

#[tokio::test]
async fn test_oversized_upload_reports_both_sizes() {
    let config = EngineConfig {
        intake: IntakeConfig {
            max_bytes: 1024,
            ..IntakeConfig::default()
        },
        ..EngineConfig::default()
    };
    let h = EngineHarness::with_config(config);
    let auth = owner_ctx();

    let session = h
        .engine
        .create_session(&auth, None, DomainTag::general(), "sign_waiver", json!({}), None)
        .await
        .unwrap();

    let err = h
        .engine
        .submit_media(&auth, session.id, "video/mp4", None, mp4_bytes(2048))
        .await
        .unwrap_err();
    match err {
        EngineError::MediaTooLarge { size, max } => {
            assert_eq!(size, 2048);
            assert_eq!(max, 1024);
        }
        other => panic!("expected MediaTooLarge, got {other:?}"),
    }
}

#[tokio::test]
async fn test_second_upload_refused_after_first() {
    let h = EngineHarness::new();
    let auth = owner_ctx();

    let session = h
        .engine
        .create_session(&auth, None, healthcare_domain(), "approve_payment", json!({}), None)
        .await
        .unwrap();
    h.engine
        .submit_media(&auth, session.id, "video/mp4", None, mp4_bytes(4096))
        .await
        .unwrap();

    let err = h
        .engine
        .submit_media(&auth, session.id, "video/mp4", None, mp4_bytes(4096))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidTransition { .. }));
}

#[tokio::test]
async fn test_expired_session_refuses_media_and_confirm() {
    let h = EngineHarness::new();
    let auth = owner_ctx();

    let mut stale = VerificationSession::new(
        UserId::from_uuid(test_owner_id()),
        healthcare_domain(),
        "approve_payment",
        json!({}),
        ChronoDuration::minutes(10),
    );
    stale.expires_at = Utc::now() - ChronoDuration::minutes(1);
    let id = stale.id;
    h.store.insert_session(stale, vec![]).await.unwrap();

    let err = h
        .engine
        .submit_media(&auth, id, "video/mp4", None, mp4_bytes(100))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::SessionExpired(_)));

    let err = h.engine.confirm(&auth, id, true).await.unwrap_err();
    assert!(matches!(err, EngineError::SessionExpired(_)));

    let session = h.engine.session(&auth, id).await.unwrap();
    assert_eq!(session.status, SessionStatus::Expired);
    assert_eq!(h.metrics.get_counter(metric_names::SESSIONS_EXPIRED).await, 1);
}

#[tokio::test]
async fn test_ttl_bounds_enforced_at_creation() {
    let h = EngineHarness::new();
    let auth = owner_ctx();

    for ttl in [4, 61] {
        let err = h
            .engine
            .create_session(
                &auth,
                None,
                DomainTag::general(),
                "sign_waiver",
                json!({}),
                Some(ttl),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Validation(_)), "ttl {}", ttl);
    }

    let session = h
        .engine
        .create_session(&auth, None, DomainTag::general(), "sign_waiver", json!({}), None)
        .await
        .unwrap();
    assert_eq!(
        session.expires_at - session.created_at,
        ChronoDuration::minutes(30)
    );
}

#[tokio::test]
async fn test_concurrent_confirms_converge_on_one_proof() {
    let h = EngineHarness::new();
    let auth = owner_ctx();

    let session = h
        .engine
        .create_session(&auth, None, healthcare_domain(), "approve_payment", json!({}), None)
        .await
        .unwrap();
    h.engine
        .submit_media(&auth, session.id, "video/mp4", None, mp4_bytes(4096))
        .await
        .unwrap();
    h.wait_for_status(session.id, SessionStatus::Verifying).await;

    let (a, b) = tokio::join!(
        h.engine.confirm(&auth, session.id, true),
        h.engine.confirm(&auth, session.id, true)
    );

    let mut codes = Vec::new();
    for outcome in [a, b] {
        match outcome {
            Ok(ConfirmOutcome::Issued(record)) => codes.push(record.code),
            Ok(ConfirmOutcome::Rejected(_)) => panic!("accept must not reject"),
            // A loser may observe the compare-and-swap conflict
            Err(EngineError::StateConflict { .. }) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert!(!codes.is_empty(), "at least one confirm must win");
    codes.dedup();
    assert_eq!(codes.len(), 1, "all winners must return the same proof");

    assert_eq!(h.store.proof_count().await, 1);
    assert_eq!(h.metrics.get_counter(metric_names::SESSIONS_COMPLETED).await, 1);
}

#[tokio::test]
async fn test_proof_lifecycle_read_then_revoke() {
    let h = EngineHarness::new();
    let auth = owner_ctx();

    let session = h
        .engine
        .create_session(&auth, None, healthcare_domain(), "approve_payment", json!({}), None)
        .await
        .unwrap();
    h.engine
        .submit_media(&auth, session.id, "video/mp4", None, mp4_bytes(4096))
        .await
        .unwrap();
    h.wait_for_status(session.id, SessionStatus::Verifying).await;
    let record = match h.engine.confirm(&auth, session.id, true).await.unwrap() {
        ConfirmOutcome::Issued(record) => record,
        ConfirmOutcome::Rejected(_) => panic!("expected issuance"),
    };
    let code = record.code.as_str().to_string();

    let revoked = h.engine.revoke_proof(&auth, &code).await.unwrap();
    assert_eq!(revoked.status, ProofStatus::Revoked);
    assert!(revoked.revoked_at.is_some());

    // Revoked proofs stay readable; their status tells the story
    let readout = h.engine.read_proof(&auth, &code).await.unwrap();
    assert_eq!(readout.record.status, ProofStatus::Revoked);

    let err = h.engine.revoke_proof(&auth, &code).await.unwrap_err();
    assert!(matches!(err, EngineError::ProofRevoked(_)));

    let trail = h.store.list_for_session(session.id).await.unwrap();
    assert_eq!(trail.last().unwrap().action, AuditAction::ProofRevoked);
    assert_eq!(h.metrics.get_counter(metric_names::PROOFS_REVOKED).await, 1);
}
