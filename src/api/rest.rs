//! REST API endpoints for the verification engine.

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Extension, Path, State};
use axum::http::{header, HeaderMap};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use uuid::Uuid;

use crate::auth::AuthContextExt;
use crate::domain::{DomainTag, ProofRecord, SessionId, UserId, VerificationSession};
use crate::engine::{ConfirmOutcome, DEFAULT_MAX_MEDIA_BYTES};
use crate::server::AppState;

use super::error::{ApiError, ErrorCode};

/// Build the `/v1` router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/sessions", post(create_session))
        .route("/v1/sessions/:session_id", get(get_session))
        .route(
            "/v1/sessions/:session_id/media",
            post(submit_media)
                // Leave headroom above the intake ceiling so oversized uploads
                // reach the engine and get a structured MEDIA_TOO_LARGE reply
                .layer(DefaultBodyLimit::max(DEFAULT_MAX_MEDIA_BYTES as usize + 64 * 1024)),
        )
        .route("/v1/sessions/:session_id/confirm", post(confirm_session))
        .route("/v1/proofs/:code", get(read_proof).delete(revoke_proof))
}

fn session_json(session: &VerificationSession) -> serde_json::Value {
    serde_json::json!({
        "session_id": session.id,
        "user_id": session.user_id,
        "domain": session.domain,
        "action": session.action,
        "status": session.status,
        "media_size_bytes": session.media_size_bytes,
        "interpreted": session.interpreted,
        "trust_score": session.trust_score,
        "requires_human_review": session.requires_human_review,
        "failure_reason": session.failure_reason,
        "created_at": session.created_at,
        "updated_at": session.updated_at,
        "expires_at": session.expires_at,
        "completed_at": session.completed_at,
    })
}

fn proof_json(record: &ProofRecord, signature_valid: Option<bool>) -> serde_json::Value {
    serde_json::json!({
        "code": record.code,
        "session_id": record.session_id,
        "user_id": record.user_id,
        "action": record.action,
        "status": record.status,
        "media_signature": hex::encode(record.media_signature),
        "result": record.result,
        "signature_valid": signature_valid,
        "created_at": record.created_at,
        "verified_at": record.verified_at,
        "expires_at": record.expires_at,
        "revoked_at": record.revoked_at,
    })
}

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    domain: String,
    action: String,
    #[serde(default)]
    context: serde_json::Value,
    /// Service callers may open a session for another user
    user_id: Option<Uuid>,
    ttl_minutes: Option<i64>,
}

async fn create_session(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Json(request): Json<CreateSessionRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state
        .engine
        .create_session(
            &auth,
            request.user_id.map(UserId::from_uuid),
            DomainTag::new(request.domain),
            request.action,
            request.context,
            request.ttl_minutes,
        )
        .await?;

    let mut body = session_json(&session);
    body["upload_url"] = serde_json::json!(format!("/v1/sessions/{}/media", session.id));
    Ok(Json(body))
}

async fn get_session(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Path(session_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let session = state
        .engine
        .session(&auth, SessionId::from_uuid(session_id))
        .await?;
    Ok(Json(session_json(&session)))
}

async fn submit_media(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Path(session_id): Path<Uuid>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiError::new(
                ErrorCode::InvalidRequestBody,
                "content-type header is required",
            )
        })?;
    let declared_len = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok());

    let session = state
        .engine
        .submit_media(
            &auth,
            SessionId::from_uuid(session_id),
            content_type,
            declared_len,
            body.to_vec(),
        )
        .await?;
    Ok(Json(session_json(&session)))
}

#[derive(Debug, Deserialize)]
struct ConfirmRequest {
    accept: bool,
}

async fn confirm_session(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<ConfirmRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = state
        .engine
        .confirm(&auth, SessionId::from_uuid(session_id), request.accept)
        .await?;

    match outcome {
        ConfirmOutcome::Issued(record) => Ok(Json(serde_json::json!({
            "outcome": "issued",
            "proof": proof_json(&record, None),
        }))),
        ConfirmOutcome::Rejected(session) => Ok(Json(serde_json::json!({
            "outcome": "rejected",
            "session": session_json(&session),
        }))),
    }
}

async fn read_proof(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Path(code): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let readout = state.engine.read_proof(&auth, &code).await?;
    Ok(Json(proof_json(
        &readout.record,
        Some(readout.signature_valid),
    )))
}

async fn revoke_proof(
    State(state): State<AppState>,
    Extension(AuthContextExt(auth)): Extension<AuthContextExt>,
    Path(code): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let record = state.engine.revoke_proof(&auth, &code).await?;
    Ok(Json(proof_json(&record, None)))
}
