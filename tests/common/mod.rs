//! Common test utilities and fixtures for integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use vproof_engine::auth::{AuthContext, Capabilities};
use vproof_engine::domain::{
    DomainTag, RawInterpretation, SessionId, SessionStatus, UserId, VerificationSession,
};
use vproof_engine::engine::{EngineConfig, VerificationEngine};
use vproof_engine::infra::{
    Interpreter, LogNotifier, MemoryBlobStore, MemoryStore, ScriptedInterpreter, SessionStore,
};
use vproof_engine::metrics::MetricsRegistry;

/// Test session owner
pub fn test_owner_id() -> Uuid {
    Uuid::parse_str("11111111-1111-1111-1111-111111111111").unwrap()
}

/// Test reviewer (no sessions of their own)
pub fn test_reviewer_id() -> Uuid {
    Uuid::parse_str("22222222-2222-2222-2222-222222222222").unwrap()
}

/// Test service account
pub fn test_service_id() -> Uuid {
    Uuid::parse_str("33333333-3333-3333-3333-333333333333").unwrap()
}

/// Unrelated user with no special capabilities
pub fn test_stranger_id() -> Uuid {
    Uuid::parse_str("44444444-4444-4444-4444-444444444444").unwrap()
}

pub fn owner_ctx() -> AuthContext {
    AuthContext {
        user_id: UserId::from_uuid(test_owner_id()),
        capabilities: Capabilities::owner_only(),
    }
}

pub fn reviewer_ctx() -> AuthContext {
    AuthContext {
        user_id: UserId::from_uuid(test_reviewer_id()),
        capabilities: Capabilities::reviewer(),
    }
}

pub fn service_ctx() -> AuthContext {
    AuthContext {
        user_id: UserId::from_uuid(test_service_id()),
        capabilities: Capabilities::service(),
    }
}

pub fn stranger_ctx() -> AuthContext {
    AuthContext {
        user_id: UserId::from_uuid(test_stranger_id()),
        capabilities: Capabilities::owner_only(),
    }
}

/// Confident three-unit interpretation, the happy-path script.
pub fn approval_interpretation() -> RawInterpretation {
    RawInterpretation {
        glosses: vec!["i".into(), "approve".into(), "payment".into()],
        confidences: vec![0.95, 0.87, 0.92],
        media_duration_secs: 4.1,
        frame_count: 123,
        processing_ms: 2600,
    }
}

/// Low-confidence interpretation that should land below review thresholds.
pub fn hesitant_interpretation() -> RawInterpretation {
    RawInterpretation {
        glosses: vec!["maybe".into(), "cancel".into()],
        confidences: vec![0.52, 0.48],
        media_duration_secs: 2.8,
        frame_count: 84,
        processing_ms: 1900,
    }
}

/// Structurally broken upstream output (parallel arrays disagree).
pub fn mismatched_interpretation() -> RawInterpretation {
    RawInterpretation {
        glosses: vec!["yes".into(), "confirm".into()],
        confidences: vec![0.9],
        media_duration_secs: 1.5,
        frame_count: 45,
        processing_ms: 800,
    }
}

/// Synthetic MP4 payload of the requested length, starting with an ftyp box.
pub fn mp4_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![
        0x00, 0x00, 0x00, 0x18, b'f', b't', b'y', b'p', b'i', b's', b'o', b'm',
    ];
    bytes.resize(len, 0xAB);
    bytes
}

pub fn healthcare_domain() -> DomainTag {
    DomainTag::healthcare()
}

/// Fully wired in-memory engine for pipeline-level tests.
///
/// The same [`MemoryStore`] backs sessions, proofs, and the audit trail, so
/// tests can inspect all three through `store`.
pub struct EngineHarness {
    pub engine: VerificationEngine,
    pub store: Arc<MemoryStore>,
    pub blobs: Arc<MemoryBlobStore>,
    pub metrics: Arc<MetricsRegistry>,
}

impl EngineHarness {
    pub fn new() -> Self {
        Self::build(approval_interpretation(), EngineConfig::default())
    }

    pub fn with_interpretation(raw: RawInterpretation) -> Self {
        Self::build(raw, EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        Self::build(approval_interpretation(), config)
    }

    fn build(raw: RawInterpretation, config: EngineConfig) -> Self {
        Self::with_interpreter(Arc::new(ScriptedInterpreter::new(raw)), config)
    }

    pub fn with_interpreter(interpreter: Arc<dyn Interpreter>, config: EngineConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let blobs = Arc::new(MemoryBlobStore::new());
        let metrics = Arc::new(MetricsRegistry::new());
        let engine = VerificationEngine::new(
            store.clone(),
            store.clone(),
            store.clone(),
            blobs.clone(),
            interpreter,
            Arc::new(LogNotifier),
            metrics.clone(),
            config,
        );
        Self {
            engine,
            store,
            blobs,
            metrics,
        }
    }

    /// Poll until the session reaches `status`, or panic after ~2s.
    ///
    /// Interpretation runs on a background task, so tests wait for the
    /// dispatcher to land rather than sleeping a fixed amount.
    pub async fn wait_for_status(
        &self,
        session_id: SessionId,
        status: SessionStatus,
    ) -> VerificationSession {
        for _ in 0..200 {
            let session = self
                .store
                .get_session(session_id)
                .await
                .expect("session store read failed")
                .expect("session disappeared");
            if session.status == status {
                return session;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("session {} never reached {:?}", session_id, status);
    }
}

impl Default for EngineHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Assert that a result is Ok and return the value
#[macro_export]
macro_rules! assert_ok {
    ($result:expr) => {
        match $result {
            Ok(v) => v,
            Err(e) => panic!("Expected Ok, got Err: {:?}", e),
        }
    };
}

/// Assert that a result is Err
#[macro_export]
macro_rules! assert_err {
    ($result:expr) => {
        match $result {
            Ok(v) => panic!("Expected Err, got Ok: {:?}", v),
            Err(e) => e,
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mp4_bytes_has_requested_length() {
        let bytes = mp4_bytes(1024);
        assert_eq!(bytes.len(), 1024);
        assert_eq!(&bytes[4..8], b"ftyp");
    }

    #[test]
    fn test_fixture_interpretations_validate() {
        assert!(approval_interpretation().validate().is_ok());
        assert!(hesitant_interpretation().validate().is_ok());
        assert!(mismatched_interpretation().validate().is_err());
    }
}
