//! In-memory implementations of the storage collaborators
//!
//! One `MemoryStore` implements `SessionStore`, `ProofStore` and
//! `AuditSink` over a single lock, so a mutation and its audit entries
//! land atomically exactly as a transactional database would commit them.
//! Compare-and-swap on status happens inside the write lock, which makes
//! the concurrency tests meaningful rather than cosmetic.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::domain::{
    MediaRef, ProofCode, ProofRecord, ProofStatus, RawInterpretation, SessionId, SessionStatus,
    UserId, VerificationSession,
};

use super::audit::AuditEntry;
use super::traits::{
    AuditSink, BlobStore, Interpreter, Notification, Notifier, ProofStore, SessionStore,
};
use super::{EngineError, Result};

#[derive(Default)]
struct MemoryStoreInner {
    sessions: HashMap<SessionId, VerificationSession>,
    proofs: HashMap<String, ProofRecord>,
    proof_code_by_session: HashMap<SessionId, String>,
    // Records displaced by code reuse; proof writes never drop a record.
    superseded_proofs: Vec<ProofRecord>,
    audit: Vec<AuditEntry>,
}

impl MemoryStoreInner {
    fn push_audit(&mut self, entries: Vec<AuditEntry>) {
        for entry in entries {
            entry.emit();
            self.audit.push(entry);
        }
    }
}

/// Shared in-memory store backing the dev server and the integration suite.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryStoreInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of sessions currently held (for health reporting)
    pub async fn session_count(&self) -> usize {
        self.inner.read().await.sessions.len()
    }

    /// Number of proof records held, superseded ones included (for health
    /// reporting)
    pub async fn proof_count(&self) -> usize {
        let inner = self.inner.read().await;
        inner.proofs.len() + inner.superseded_proofs.len()
    }
}

#[async_trait]
impl SessionStore for MemoryStore {
    async fn insert_session(
        &self,
        session: VerificationSession,
        audit: Vec<AuditEntry>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.sessions.contains_key(&session.id) {
            return Err(EngineError::Internal(format!(
                "session {} already exists",
                session.id
            )));
        }
        inner.sessions.insert(session.id, session);
        inner.push_audit(audit);
        Ok(())
    }

    async fn get_session(&self, id: SessionId) -> Result<Option<VerificationSession>> {
        Ok(self.inner.read().await.sessions.get(&id).cloned())
    }

    async fn commit_session(
        &self,
        session: VerificationSession,
        expected: SessionStatus,
        audit: Vec<AuditEntry>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .sessions
            .get(&session.id)
            .ok_or(EngineError::SessionNotFound(session.id))?;
        if stored.status != expected {
            return Err(EngineError::StateConflict {
                expected: expected.to_string(),
                actual: stored.status.to_string(),
            });
        }
        inner.sessions.insert(session.id, session);
        inner.push_audit(audit);
        Ok(())
    }
}

#[async_trait]
impl ProofStore for MemoryStore {
    async fn insert_proof(&self, record: ProofRecord, audit: Vec<AuditEntry>) -> Result<()> {
        let mut inner = self.inner.write().await;
        let now = Utc::now();
        // Codes must be unique among non-expired records.
        if let Some(existing) = inner.proofs.get(record.code.as_str()) {
            if !existing.is_expired_at(now) {
                return Err(EngineError::CodeCollision);
            }
        }
        // At most one live record per session; a concurrent issuer that
        // lost the race observes the conflict instead of orphaning a record.
        if let Some(code) = inner.proof_code_by_session.get(&record.session_id) {
            if let Some(existing) = inner.proofs.get(code) {
                if !existing.is_expired_at(now) {
                    return Err(EngineError::StateConflict {
                        expected: "no live proof for session".to_string(),
                        actual: format!("proof {} already issued", code),
                    });
                }
            }
        }
        // All checks passed; a failed insert must leave the store untouched.
        // Reusing a stale record's code moves that record to the superseded
        // list rather than dropping it; writes stay append-only.
        if let Some(stale) = inner.proofs.remove(record.code.as_str()) {
            inner.proof_code_by_session.remove(&stale.session_id);
            inner.superseded_proofs.push(stale);
        }
        inner
            .proof_code_by_session
            .insert(record.session_id, record.code.as_str().to_string());
        inner.proofs.insert(record.code.as_str().to_string(), record);
        inner.push_audit(audit);
        Ok(())
    }

    async fn get_proof_by_code(&self, code: &ProofCode) -> Result<Option<ProofRecord>> {
        Ok(self.inner.read().await.proofs.get(code.as_str()).cloned())
    }

    async fn get_proof_by_session(&self, session_id: SessionId) -> Result<Option<ProofRecord>> {
        let inner = self.inner.read().await;
        Ok(inner
            .proof_code_by_session
            .get(&session_id)
            .and_then(|code| inner.proofs.get(code))
            .cloned())
    }

    async fn commit_proof_status(
        &self,
        record: ProofRecord,
        expected: ProofStatus,
        audit: Vec<AuditEntry>,
    ) -> Result<()> {
        let mut inner = self.inner.write().await;
        let stored = inner
            .proofs
            .get(record.code.as_str())
            .ok_or_else(|| EngineError::ProofNotFound(record.code.as_str().to_string()))?;
        if stored.status != expected {
            return Err(EngineError::StateConflict {
                expected: expected.to_string(),
                actual: stored.status.to_string(),
            });
        }
        inner.proofs.insert(record.code.as_str().to_string(), record);
        inner.push_audit(audit);
        Ok(())
    }
}

#[async_trait]
impl AuditSink for MemoryStore {
    async fn append(&self, entry: AuditEntry) -> Result<()> {
        self.inner.write().await.push_audit(vec![entry]);
        Ok(())
    }

    async fn list_for_session(&self, session_id: SessionId) -> Result<Vec<AuditEntry>> {
        Ok(self
            .inner
            .read()
            .await
            .audit
            .iter()
            .filter(|e| e.session_id == session_id)
            .cloned()
            .collect())
    }
}

/// In-memory blob storage keyed by opaque reference.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    blobs: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn extension_for(content_type: &str) -> &'static str {
        match content_type {
            "video/mp4" => "mp4",
            "video/webm" => "webm",
            "video/quicktime" => "mov",
            _ => "bin",
        }
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn write(&self, bytes: Vec<u8>, content_type: &str) -> Result<MediaRef> {
        let reference = format!(
            "media/{}.{}",
            uuid::Uuid::new_v4(),
            Self::extension_for(content_type)
        );
        self.blobs.write().await.insert(reference.clone(), bytes);
        Ok(MediaRef::from(reference))
    }

    async fn read(&self, media_ref: &MediaRef) -> Result<Vec<u8>> {
        self.blobs
            .read()
            .await
            .get(media_ref.as_str())
            .cloned()
            .ok_or_else(|| EngineError::Storage(format!("blob not found: {}", media_ref)))
    }

    async fn delete(&self, media_ref: &MediaRef) -> Result<()> {
        self.blobs
            .write()
            .await
            .remove(media_ref.as_str())
            .map(|_| ())
            .ok_or_else(|| EngineError::Storage(format!("blob not found: {}", media_ref)))
    }
}

/// Interpreter that replays a fixed script, optionally after a delay.
///
/// Serves the dev server and latency-sensitive tests; mock-based tests use
/// the generated `MockInterpreter` instead.
#[derive(Clone)]
pub struct ScriptedInterpreter {
    script: RawInterpretation,
    delay: std::time::Duration,
}

impl ScriptedInterpreter {
    pub fn new(script: RawInterpretation) -> Self {
        Self {
            script,
            delay: std::time::Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: std::time::Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[async_trait]
impl Interpreter for ScriptedInterpreter {
    async fn interpret(&self, _media_ref: &MediaRef) -> Result<RawInterpretation> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(self.script.clone())
    }
}

/// Notifier that only logs; stands in for a real delivery channel.
#[derive(Clone, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, user_id: UserId, notification: Notification) -> Result<()> {
        tracing::info!(user_id = %user_id, notification = ?notification, "notification dispatched");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DomainTag;
    use crate::infra::audit::{AuditAction, AuditEntryBuilder};
    use chrono::Duration;
    use serde_json::json;

    fn session() -> VerificationSession {
        VerificationSession::new(
            UserId::new(),
            DomainTag::healthcare(),
            "confirm_appointment",
            json!({}),
            Duration::minutes(30),
        )
    }

    fn status_entry(session_id: SessionId, new_value: &str) -> AuditEntry {
        AuditEntryBuilder::new(session_id, AuditAction::StatusChanged, "test", "user")
            .field_change("status", None, new_value)
            .build()
    }

    fn proof_for(session: &VerificationSession, code: &str) -> ProofRecord {
        let raw = RawInterpretation {
            glosses: vec!["hello".to_string()],
            confidences: vec![0.95],
            media_duration_secs: 1.0,
            frame_count: 30,
            processing_ms: 500,
        };
        ProofRecord::issue(
            ProofCode::from(code),
            session.id,
            session.user_id,
            session.action.clone(),
            [3u8; 32],
            crate::domain::InterpretedResult::from_raw(&raw, [9u8; 32]),
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn test_insert_and_get_session() {
        let store = MemoryStore::new();
        let s = session();
        let id = s.id;
        store.insert_session(s, vec![]).await.unwrap();

        let loaded = store.get_session(id).await.unwrap().unwrap();
        assert_eq!(loaded.id, id);
        assert_eq!(loaded.status, SessionStatus::Created);
        assert!(store.get_session(SessionId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_commit_cas_detects_conflict() {
        let store = MemoryStore::new();
        let mut s = session();
        let id = s.id;
        store.insert_session(s.clone(), vec![]).await.unwrap();

        s.status = SessionStatus::Uploading;
        store
            .commit_session(s.clone(), SessionStatus::Created, vec![])
            .await
            .unwrap();

        // Second writer still expects `created` and must lose
        let mut racer = store.get_session(id).await.unwrap().unwrap();
        racer.status = SessionStatus::Failed;
        let err = store
            .commit_session(racer, SessionStatus::Created, vec![])
            .await
            .unwrap_err();
        match err {
            EngineError::StateConflict { expected, actual } => {
                assert_eq!(expected, "created");
                assert_eq!(actual, "uploading");
            }
            other => panic!("expected StateConflict, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_audit_entries_land_with_commit_in_order() {
        let store = MemoryStore::new();
        let mut s = session();
        let id = s.id;
        store
            .insert_session(s.clone(), vec![status_entry(id, "created")])
            .await
            .unwrap();

        s.status = SessionStatus::Uploading;
        store
            .commit_session(s, SessionStatus::Created, vec![status_entry(id, "uploading")])
            .await
            .unwrap();

        let trail = store.list_for_session(id).await.unwrap();
        assert_eq!(trail.len(), 2);
        assert_eq!(trail[0].new_value.as_deref(), Some("created"));
        assert_eq!(trail[1].new_value.as_deref(), Some("uploading"));
    }

    #[tokio::test]
    async fn test_failed_commit_writes_no_audit() {
        let store = MemoryStore::new();
        let mut s = session();
        let id = s.id;
        store.insert_session(s.clone(), vec![]).await.unwrap();

        s.status = SessionStatus::Uploading;
        let err = store
            .commit_session(s, SessionStatus::Processing, vec![status_entry(id, "uploading")])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StateConflict { .. }));
        assert!(store.list_for_session(id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_proof_code_collision_on_live_record() {
        let store = MemoryStore::new();
        let s1 = session();
        let s2 = session();

        store
            .insert_proof(proof_for(&s1, "VC-1A2B3C-ABC123"), vec![])
            .await
            .unwrap();
        let err = store
            .insert_proof(proof_for(&s2, "VC-1A2B3C-ABC123"), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CodeCollision));
    }

    #[tokio::test]
    async fn test_expired_proof_code_can_be_reused() {
        let store = MemoryStore::new();
        let s1 = session();
        let s2 = session();

        let mut stale = proof_for(&s1, "VC-STALE0-ABC123");
        stale.created_at = Utc::now() - Duration::hours(48);
        stale.expires_at = stale.created_at + Duration::hours(24);
        store.insert_proof(stale, vec![]).await.unwrap();

        store
            .insert_proof(proof_for(&s2, "VC-STALE0-ABC123"), vec![])
            .await
            .unwrap();
        let live = store
            .get_proof_by_code(&ProofCode::from("VC-STALE0-ABC123"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(live.session_id, s2.id);
        assert!(store.get_proof_by_session(s1.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_code_reuse_retains_superseded_record() {
        let store = MemoryStore::new();
        let s1 = session();
        let s2 = session();

        let mut stale = proof_for(&s1, "VC-STALE0-ABC123");
        stale.created_at = Utc::now() - Duration::hours(48);
        stale.expires_at = stale.created_at + Duration::hours(24);
        store.insert_proof(stale, vec![]).await.unwrap();
        assert_eq!(store.proof_count().await, 1);

        store
            .insert_proof(proof_for(&s2, "VC-STALE0-ABC123"), vec![])
            .await
            .unwrap();

        // Code lookup resolves to the new record, but the displaced one
        // is kept rather than dropped.
        assert_eq!(store.proof_count().await, 2);
        let inner = store.inner.read().await;
        assert_eq!(inner.superseded_proofs.len(), 1);
        assert_eq!(inner.superseded_proofs[0].session_id, s1.id);
        assert_eq!(inner.superseded_proofs[0].code.as_str(), "VC-STALE0-ABC123");
    }

    #[tokio::test]
    async fn test_second_live_proof_for_session_refused() {
        let store = MemoryStore::new();
        let s = session();

        store
            .insert_proof(proof_for(&s, "VC-CCC333-AAA111"), vec![])
            .await
            .unwrap();
        let err = store
            .insert_proof(proof_for(&s, "VC-CCC333-BBB222"), vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StateConflict { .. }));

        // The original record and mapping are untouched
        let live = store.get_proof_by_session(s.id).await.unwrap().unwrap();
        assert_eq!(live.code.as_str(), "VC-CCC333-AAA111");
    }

    #[tokio::test]
    async fn test_proof_lookup_by_session() {
        let store = MemoryStore::new();
        let s = session();
        store
            .insert_proof(proof_for(&s, "VC-AAA111-ZZZ999"), vec![])
            .await
            .unwrap();

        let found = store.get_proof_by_session(s.id).await.unwrap().unwrap();
        assert_eq!(found.code.as_str(), "VC-AAA111-ZZZ999");
    }

    #[tokio::test]
    async fn test_proof_status_cas() {
        let store = MemoryStore::new();
        let s = session();
        let mut p = proof_for(&s, "VC-BBB222-YYY888");
        store.insert_proof(p.clone(), vec![]).await.unwrap();

        p.status = ProofStatus::Verified;
        p.verified_at = Some(Utc::now());
        store
            .commit_proof_status(p.clone(), ProofStatus::Pending, vec![])
            .await
            .unwrap();

        // Stale expectation loses
        p.status = ProofStatus::Revoked;
        let err = store
            .commit_proof_status(p, ProofStatus::Pending, vec![])
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::StateConflict { .. }));
    }

    #[tokio::test]
    async fn test_blob_store_roundtrip() {
        let store = MemoryBlobStore::new();
        let bytes = vec![0u8; 1024];
        let media_ref = store.write(bytes.clone(), "video/mp4").await.unwrap();
        assert!(media_ref.as_str().starts_with("media/"));
        assert!(media_ref.as_str().ends_with(".mp4"));

        assert_eq!(store.read(&media_ref).await.unwrap(), bytes);
        store.delete(&media_ref).await.unwrap();
        assert!(store.read(&media_ref).await.is_err());
        assert!(store.delete(&media_ref).await.is_err());
    }

    #[tokio::test]
    async fn test_scripted_interpreter_replays_script() {
        let raw = RawInterpretation {
            glosses: vec!["hello".to_string(), "world".to_string()],
            confidences: vec![0.95, 0.87],
            media_duration_secs: 2.0,
            frame_count: 60,
            processing_ms: 900,
        };
        let interpreter = ScriptedInterpreter::new(raw.clone());
        let out = interpreter
            .interpret(&MediaRef::from("media/any.mp4"))
            .await
            .unwrap();
        assert_eq!(out.glosses, raw.glosses);
        assert_eq!(out.confidences, raw.confidences);
    }
}
