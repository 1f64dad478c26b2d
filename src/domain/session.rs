//! Verification session: the authoritative workflow record.
//!
//! A session tracks one verification attempt from creation through proof
//! issuance. Its status only moves forward through the pipeline graph, or
//! jumps to `failed`/`expired` from any non-terminal state.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{DomainTag, InterpretedResult, MediaRef, SessionId, UserId};

/// Minimum session lifetime accepted at creation
pub const MIN_SESSION_TTL_MINUTES: i64 = 5;

/// Maximum session lifetime accepted at creation
pub const MAX_SESSION_TTL_MINUTES: i64 = 60;

/// Session lifetime applied when the caller does not choose one
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 30;

/// Lifecycle state of a verification session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Created,
    Uploading,
    Processing,
    Transforming,
    Verifying,
    Completed,
    Failed,
    Expired,
}

impl SessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Created => "created",
            SessionStatus::Uploading => "uploading",
            SessionStatus::Processing => "processing",
            SessionStatus::Transforming => "transforming",
            SessionStatus::Verifying => "verifying",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
            SessionStatus::Expired => "expired",
        }
    }

    /// Terminal states admit no further transitions.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionStatus::Completed | SessionStatus::Failed | SessionStatus::Expired
        )
    }

    /// States this status may legally transition to.
    ///
    /// Every non-terminal state can fail or expire; the forward edge follows
    /// the pipeline order.
    pub fn allowed_next(&self) -> &'static [SessionStatus] {
        use SessionStatus::*;
        match self {
            Created => &[Uploading, Failed, Expired],
            Uploading => &[Processing, Failed, Expired],
            Processing => &[Transforming, Failed, Expired],
            Transforming => &[Verifying, Failed, Expired],
            Verifying => &[Completed, Failed, Expired],
            Completed | Failed | Expired => &[],
        }
    }

    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        self.allowed_next().contains(&next)
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single verification attempt, owned by one user for its entire life.
///
/// Sessions are never deleted; they end in exactly one of the terminal
/// states. The media reference is write-once and `expires_at` is fixed at
/// creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationSession {
    /// Session identifier
    pub id: SessionId,

    /// Owning user
    pub user_id: UserId,

    /// Domain classification (healthcare, legal, ...)
    pub domain: DomainTag,

    /// What the user is proving intent for (e.g. "confirm_appointment")
    pub action: String,

    /// Free-form request context supplied at creation
    pub context: serde_json::Value,

    /// Current lifecycle state
    pub status: SessionStatus,

    /// Reference to the stored recording, set once by intake
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_ref: Option<MediaRef>,

    /// Size of the stored recording in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_size_bytes: Option<u64>,

    /// Structured interpretation, attached after processing
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interpreted: Option<InterpretedResult>,

    /// Trust score derived from the interpretation confidence
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trust_score: Option<f64>,

    /// Whether the result fell below the review threshold
    pub requires_human_review: bool,

    /// Why the session failed, when it did
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_reason: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last mutation timestamp
    pub updated_at: DateTime<Utc>,

    /// Hard deadline; fixed at creation, never extended
    pub expires_at: DateTime<Utc>,

    /// Set when the session reaches `completed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl VerificationSession {
    /// Create a new session in the `created` state with a fixed deadline.
    pub fn new(
        user_id: UserId,
        domain: DomainTag,
        action: impl Into<String>,
        context: serde_json::Value,
        ttl: Duration,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            user_id,
            domain,
            action: action.into(),
            context,
            status: SessionStatus::Created,
            media_ref: None,
            media_size_bytes: None,
            interpreted: None,
            trust_score: None,
            requires_human_review: false,
            failure_reason: None,
            created_at: now,
            updated_at: now,
            expires_at: now + ttl,
            completed_at: None,
        }
    }

    /// Whether the deadline has passed at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn has_media(&self) -> bool {
        self.media_ref.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
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

    #[test]
    fn test_new_session_starts_created() {
        let s = session();
        assert_eq!(s.status, SessionStatus::Created);
        assert!(s.media_ref.is_none());
        assert!(!s.requires_human_review);
        assert_eq!(s.expires_at - s.created_at, Duration::minutes(30));
    }

    #[test]
    fn test_forward_path_is_legal() {
        use SessionStatus::*;
        let path = [Created, Uploading, Processing, Transforming, Verifying, Completed];
        for pair in path.windows(2) {
            assert!(
                pair[0].can_transition_to(pair[1]),
                "{} -> {} should be legal",
                pair[0],
                pair[1]
            );
        }
    }

    #[test]
    fn test_no_skipping_forward() {
        use SessionStatus::*;
        assert!(!Created.can_transition_to(Processing));
        assert!(!Uploading.can_transition_to(Verifying));
        assert!(!Processing.can_transition_to(Completed));
    }

    #[test]
    fn test_failure_and_expiry_reachable_from_any_non_terminal() {
        use SessionStatus::*;
        for from in [Created, Uploading, Processing, Transforming, Verifying] {
            assert!(from.can_transition_to(Failed), "{} -> failed", from);
            assert!(from.can_transition_to(Expired), "{} -> expired", from);
        }
    }

    #[test]
    fn test_terminal_states_admit_nothing() {
        use SessionStatus::*;
        for terminal in [Completed, Failed, Expired] {
            assert!(terminal.is_terminal());
            assert!(terminal.allowed_next().is_empty());
        }
    }

    #[test]
    fn test_no_backward_edges() {
        use SessionStatus::*;
        assert!(!Verifying.can_transition_to(Processing));
        assert!(!Processing.can_transition_to(Uploading));
        assert!(!Uploading.can_transition_to(Created));
    }

    #[test]
    fn test_expiry_is_strict() {
        let s = session();
        assert!(!s.is_expired_at(s.expires_at));
        assert!(s.is_expired_at(s.expires_at + Duration::milliseconds(1)));
    }

    #[test]
    fn test_status_serde_snake_case() {
        let json = serde_json::to_string(&SessionStatus::Transforming).unwrap();
        assert_eq!(json, "\"transforming\"");
        let back: SessionStatus = serde_json::from_str("\"verifying\"").unwrap();
        assert_eq!(back, SessionStatus::Verifying);
    }
}
