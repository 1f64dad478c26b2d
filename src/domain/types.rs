//! Core type definitions for the verification engine.
//!
//! Identifier newtypes, the opaque media reference, and serde helpers for
//! fixed-size hash fields.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 32-byte hash (SHA-256)
pub type Hash256 = [u8; 32];

/// Verification session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub uuid::Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Owning user identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub uuid::Uuid);

impl UserId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    pub fn from_uuid(id: uuid::Uuid) -> Self {
        Self(id)
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque, stable reference to a stored media object.
///
/// Issued by the blob store on write. The engine never interprets its
/// contents; it only passes it back to the blob store and binds it into the
/// proof signature.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaRef(pub String);

impl MediaRef {
    pub fn new(reference: impl Into<String>) -> Self {
        Self(reference.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MediaRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MediaRef {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for MediaRef {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Domain/context classification tag for a session.
///
/// Free-form string wrapper with constructors for the common domains.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DomainTag(pub String);

impl DomainTag {
    pub fn new(domain: impl Into<String>) -> Self {
        Self(domain.into())
    }

    pub fn healthcare() -> Self {
        Self("healthcare".to_string())
    }

    pub fn legal() -> Self {
        Self("legal".to_string())
    }

    pub fn education() -> Self {
        Self("education".to_string())
    }

    pub fn general() -> Self {
        Self("general".to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DomainTag {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for DomainTag {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Serde module for serializing Hash256 as hex strings
pub mod hash256_hex {
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8; 32], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<[u8; 32], D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let bytes = hex::decode(&s).map_err(serde::de::Error::custom)?;
        bytes
            .try_into()
            .map_err(|_| serde::de::Error::custom("expected 32 bytes for Hash256"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_id_display_roundtrip() {
        let id = SessionId::new();
        let parsed = uuid::Uuid::parse_str(&id.to_string()).unwrap();
        assert_eq!(SessionId::from_uuid(parsed), id);
    }

    #[test]
    fn test_media_ref_transparent_serde() {
        let media = MediaRef::new("blob://sessions/abc123.mp4");
        let json = serde_json::to_string(&media).unwrap();
        assert_eq!(json, "\"blob://sessions/abc123.mp4\"");

        let back: MediaRef = serde_json::from_str(&json).unwrap();
        assert_eq!(back, media);
    }

    #[test]
    fn test_domain_tag_constructors() {
        assert_eq!(DomainTag::healthcare().as_str(), "healthcare");
        assert_eq!(DomainTag::new("custom-domain").as_str(), "custom-domain");
    }

    #[test]
    fn test_hash256_hex_roundtrip() {
        #[derive(Serialize, Deserialize)]
        struct Wrapper {
            #[serde(with = "hash256_hex")]
            hash: Hash256,
        }

        let wrapper = Wrapper { hash: [7u8; 32] };
        let json = serde_json::to_string(&wrapper).unwrap();
        assert!(json.contains(&hex::encode([7u8; 32])));

        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back.hash, [7u8; 32]);
    }
}
