//! API key authentication.
//!
//! Keys are formatted as `vp_<user_prefix><random>` and stored as SHA-256
//! hashes; the plaintext exists only in the issuance response.

use super::{AuthContext, AuthError, Capabilities};
use crate::domain::UserId;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::RwLock;

/// API key prefix
pub const API_KEY_PREFIX: &str = "vp_";

/// API key metadata kept by the validator
#[derive(Debug, Clone)]
pub struct ApiKeyRecord {
    /// Hash of the API key (never store plaintext)
    pub key_hash: String,

    /// User this key acts as
    pub user_id: UserId,

    /// Capabilities granted by this key
    pub capabilities: Capabilities,

    /// Human-readable label for audit trails
    pub label: String,

    /// Whether the key is active
    pub active: bool,

    /// Rate limit override (requests per minute)
    pub rate_limit: Option<u32>,
}

/// API key validator
pub struct ApiKeyValidator {
    /// In-memory key store (for development)
    /// In production, this would query the database
    keys: RwLock<HashMap<String, ApiKeyRecord>>,
}

impl ApiKeyValidator {
    pub fn new() -> Self {
        Self {
            keys: RwLock::new(HashMap::new()),
        }
    }

    /// Generate a new API key
    ///
    /// Returns (plaintext_key, key_hash)
    pub fn generate_key(user_id: &UserId) -> (String, String) {
        use rand::Rng;
        let mut rng = rand::thread_rng();

        let random_bytes: [u8; 24] = rng.gen();
        let random_part = base64::Engine::encode(
            &base64::engine::general_purpose::URL_SAFE_NO_PAD,
            random_bytes,
        );

        // Key carries a user hint so support can tell keys apart
        let user_prefix = &user_id.to_string()[..8];
        let plaintext_key = format!("{}{}{}", API_KEY_PREFIX, user_prefix, random_part);

        let key_hash = Self::hash_key(&plaintext_key);

        (plaintext_key, key_hash)
    }

    /// Hash an API key for storage
    pub fn hash_key(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Register a new API key
    pub fn register_key(&self, record: ApiKeyRecord) {
        let mut keys = self.keys.write().unwrap();
        keys.insert(record.key_hash.clone(), record);
    }

    /// Validate an API key and return auth context
    pub fn validate(&self, key: &str) -> Result<AuthContext, AuthError> {
        if !key.starts_with(API_KEY_PREFIX) {
            return Err(AuthError::InvalidApiKey);
        }

        let key_hash = Self::hash_key(key);

        let keys = self.keys.read().unwrap();
        let record = keys.get(&key_hash).ok_or(AuthError::InvalidApiKey)?;

        if !record.active {
            return Err(AuthError::InvalidApiKey);
        }

        Ok(AuthContext {
            user_id: record.user_id,
            capabilities: record.capabilities.clone(),
        })
    }

    /// Revoke an API key
    pub fn revoke(&self, key_hash: &str) {
        let mut keys = self.keys.write().unwrap();
        if let Some(record) = keys.get_mut(key_hash) {
            record.active = false;
        }
    }
}

impl Default for ApiKeyValidator {
    fn default() -> Self {
        Self::new()
    }
}
