//! Proof records (vCodes): the signed artifact a completed session produces.
//!
//! A proof binds a stored recording to its interpreted meaning through the
//! media signature. Once verified, content fields are frozen; only the
//! status may still move to `expired` or `revoked`.

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::hash256_hex;
use super::{Hash256, InterpretedResult, SessionId, UserId};

/// Fixed proof lifetime; expiry is the sole staleness authority, there is
/// no renewal operation.
pub const PROOF_TTL_HOURS: i64 = 24;

/// Characters allowed in the random portion of a proof code.
const CODE_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Length of the random portion of a proof code.
const CODE_SUFFIX_LEN: usize = 6;

/// Lifecycle state of a proof record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProofStatus {
    Pending,
    Verified,
    Expired,
    Revoked,
}

impl ProofStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProofStatus::Pending => "pending",
            ProofStatus::Verified => "verified",
            ProofStatus::Expired => "expired",
            ProofStatus::Revoked => "revoked",
        }
    }

    /// Expired and revoked proofs never change status again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProofStatus::Expired | ProofStatus::Revoked)
    }

    pub fn can_transition_to(&self, next: ProofStatus) -> bool {
        use ProofStatus::*;
        matches!(
            (self, next),
            (Pending, Verified) | (Pending, Expired) | (Pending, Revoked)
                | (Verified, Expired)
                | (Verified, Revoked)
        )
    }
}

impl fmt::Display for ProofStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Human-shareable proof code: `VC-<issuance millis, base36>-<6 random chars>`.
///
/// The embedded timestamp makes codes roughly sortable by issuance time; the
/// random suffix disambiguates codes issued within the same millisecond.
/// Uniqueness among live records is enforced at insertion, not here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProofCode(String);

impl ProofCode {
    /// Generate a fresh code stamped with `issued_at`.
    pub fn generate(issued_at: DateTime<Utc>) -> Self {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..CODE_SUFFIX_LEN)
            .map(|_| {
                let idx = rng.gen_range(0..CODE_CHARSET.len());
                CODE_CHARSET[idx] as char
            })
            .collect();
        Self(format!(
            "VC-{}-{}",
            base36_upper(issued_at.timestamp_millis().max(0) as u64),
            suffix
        ))
    }

    /// Whether `candidate` matches the `VC-<base36>-<6 alnum>` shape.
    ///
    /// Lookups for malformed codes can be refused without touching storage.
    pub fn is_well_formed(candidate: &str) -> bool {
        let mut parts = candidate.splitn(3, '-');
        let (Some(prefix), Some(stamp), Some(suffix)) =
            (parts.next(), parts.next(), parts.next())
        else {
            return false;
        };
        prefix == "VC"
            && !stamp.is_empty()
            && stamp.bytes().all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
            && suffix.len() == CODE_SUFFIX_LEN
            && suffix
                .bytes()
                .all(|b| b.is_ascii_digit() || b.is_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProofCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProofCode {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ProofCode {
    fn from(value: String) -> Self {
        Self(value)
    }
}

fn base36_upper(mut value: u64) -> String {
    const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8(digits).unwrap_or_default()
}

/// The final proof artifact, created exactly once per completed session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProofRecord {
    /// Shareable code, unique among non-expired records
    pub code: ProofCode,

    /// Originating session
    pub session_id: SessionId,

    /// User the proof attests for
    pub user_id: UserId,

    /// Action tag copied from the session
    pub action: String,

    /// Digest binding media, interpreted result and issuance time
    #[serde(with = "hash256_hex")]
    pub media_signature: Hash256,

    /// Snapshot of the interpretation the user confirmed
    pub result: InterpretedResult,

    /// Current lifecycle state
    pub status: ProofStatus,

    /// Issuance timestamp; also the timestamp bound into the signature
    pub created_at: DateTime<Utc>,

    /// Fixed staleness deadline, creation + 24h
    pub expires_at: DateTime<Utc>,

    /// Set when the proof reached `verified`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verified_at: Option<DateTime<Utc>>,

    /// Set when the proof was revoked
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revoked_at: Option<DateTime<Utc>>,
}

impl ProofRecord {
    /// Assemble a pending record issued at `created_at`.
    ///
    /// The caller computes the media signature over the same `created_at`
    /// instant so the stamped code, the signature and the record agree.
    pub fn issue(
        code: ProofCode,
        session_id: SessionId,
        user_id: UserId,
        action: impl Into<String>,
        media_signature: Hash256,
        result: InterpretedResult,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            code,
            session_id,
            user_id,
            action: action.into(),
            media_signature,
            result,
            status: ProofStatus::Pending,
            created_at,
            expires_at: created_at + Duration::hours(PROOF_TTL_HOURS),
            verified_at: None,
            revoked_at: None,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}
