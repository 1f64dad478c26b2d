//! Deterministic hashing with domain separation
//!
//! This module computes the digests that bind a proof to its inputs:
//! - RFC 8785 JSON Canonicalization Scheme (JCS) for structured values
//! - Domain separation prefixes for all hash operations
//! - Big-endian encoding for integers
//! - Reproducible digests across implementations
//!
//! # RFC 8785 Compliance
//!
//! This module uses `serde_json_canonicalizer` for RFC 8785 compliant JSON
//! canonicalization, ensuring consistent hashing across implementations
//! in different languages. Key properties:
//! - Deterministic key ordering (lexicographic UTF-8)
//! - ES6-compatible number serialization (handles floats, -0, etc.)
//! - Proper Unicode handling

use sha2::{Digest, Sha256};

/// 32-byte SHA-256 hash
pub type Hash256 = [u8; 32];

// ============================================================================
// Domain Separation Constants
// ============================================================================

/// Domain prefix for the media signature bound into a proof record
pub const DOMAIN_MEDIA_SIG: &[u8] = b"VPROOF_MEDIA_SIG_V1";

/// Domain prefix for the raw interpreter output checksum
pub const DOMAIN_RAW_OUTPUT: &[u8] = b"VPROOF_RAW_OUTPUT_V1";

// ============================================================================
// Binary Encoding Helpers
// ============================================================================

/// Encode a u32 as 4 bytes big-endian
#[inline]
pub fn u32_be(n: u32) -> [u8; 4] {
    n.to_be_bytes()
}

/// Encode an i64 as 8 bytes big-endian
#[inline]
pub fn i64_be(n: i64) -> [u8; 8] {
    n.to_be_bytes()
}

/// Encode a string as length-prefixed UTF-8 bytes
/// Format: U32_BE(len) || UTF8_bytes
pub fn encode_string(s: &str) -> Vec<u8> {
    let utf8_bytes = s.as_bytes();
    let mut result = Vec::with_capacity(4 + utf8_bytes.len());
    result.extend_from_slice(&u32_be(utf8_bytes.len() as u32));
    result.extend_from_slice(utf8_bytes);
    result
}

// ============================================================================
// Canonical JSON (RFC 8785 JCS)
// ============================================================================

/// Convert JSON value to canonical string representation per RFC 8785 (JCS).
///
/// Uses `serde_json_canonicalizer` for strict RFC 8785 compliance, ensuring:
/// - Keys sorted alphabetically (lexicographic UTF-8)
/// - No extra whitespace
/// - Numbers normalized per ES6/RFC 8785 rules (handles -0, exponents, etc.)
/// - Strings properly escaped per JSON spec
///
/// # Panics
///
/// Panics if the JSON value contains a float that cannot be represented
/// (NaN or Infinity). Per RFC 8785, these are not valid JSON.
pub fn canonicalize_json(value: &serde_json::Value) -> String {
    serde_json_canonicalizer::to_string(value)
        .expect("Failed to canonicalize JSON - contains invalid values (NaN or Infinity)")
}

// ============================================================================
// Media Signature
// ============================================================================

/// Parameters for computing a media signature
pub struct MediaSignatureParams<'a> {
    /// Opaque reference to the stored recording
    pub media_ref: &'a str,
    /// Serialized interpreted result the user confirmed
    pub result: &'a serde_json::Value,
    /// Proof issuance instant, milliseconds since the Unix epoch
    pub issued_at_millis: i64,
}

/// Compute the media signature bound into a proof record.
///
/// ```text
/// media_sig_preimage =
///   b"VPROOF_MEDIA_SIG_V1" ||
///   ENC_STR(media_ref) ||
///   JCS(result) ||
///   I64_BE(issued_at_millis)
///
/// media_signature = SHA256(media_sig_preimage)
/// ```
///
/// The preimage is unambiguous without delimiting the JCS segment: the
/// media reference is length-prefixed and the trailing timestamp is a
/// fixed 8 bytes.
pub fn compute_media_signature(params: &MediaSignatureParams) -> Hash256 {
    let canonical = canonicalize_json(params.result);

    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_MEDIA_SIG);
    hasher.update(encode_string(params.media_ref));
    hasher.update(canonical.as_bytes());
    hasher.update(i64_be(params.issued_at_millis));
    hasher.finalize().into()
}

/// Recompute a media signature and compare it against a stored one.
pub fn verify_media_signature(params: &MediaSignatureParams, expected: &Hash256) -> bool {
    compute_media_signature(params) == *expected
}

// ============================================================================
// Raw Output Checksum
// ============================================================================

/// Compute the checksum of the raw interpreter output.
///
/// raw_output_checksum = SHA256(b"VPROOF_RAW_OUTPUT_V1" || JCS(raw))
///
/// Recorded on every interpreted result so a stored result can be tied
/// back to the exact upstream response it was derived from.
pub fn compute_raw_output_checksum(raw: &serde_json::Value) -> Hash256 {
    let canonical = canonicalize_json(raw);

    let mut hasher = Sha256::new();
    hasher.update(DOMAIN_RAW_OUTPUT);
    hasher.update(canonical.as_bytes());
    hasher.finalize().into()
}

// ============================================================================
// Utility Functions
// ============================================================================

/// Hash raw bytes with SHA-256 (no domain prefix)
pub fn sha256(data: &[u8]) -> Hash256 {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().into()
}

// ============================================================================
// Tests
// ============================================================================
