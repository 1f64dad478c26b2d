//! Authentication and authorization for the verification engine.
//!
//! Callers authenticate with API keys and act as exactly one user. What a
//! caller may do beyond their own resources is a pair of capability flags.
//!
//! # Authentication
//!
//! - **API Keys**: `vp_`-prefixed opaque keys, SHA-256 hashed at rest,
//!   resolved to an [`AuthContext`] by the validator
//!
//! # Authorization Model
//!
//! - Session owners may always manage their own sessions and read their own
//!   proofs
//! - `reviewer` grants read access to any proof (human review queues)
//! - `service` grants full access on behalf of any user (backend automation)
//!
//! # Rate Limiting
//!
//! Fixed-window per-caller limiting, configurable via `VPROOF_RATE_LIMIT_*`
//! environment variables.
//!
//! # Configuration
//!
//! - `VPROOF_AUTH_MODE`: `required` (default) or `disabled` for development
//! - `VPROOF_BOOTSTRAP_API_KEY`: initial service key for setup

mod api_key;
mod middleware;

pub use api_key::*;
pub use middleware::*;

use crate::domain::UserId;
use crate::infra::Actor;

/// Authentication context extracted from a request
#[derive(Debug, Clone)]
pub struct AuthContext {
    /// User this caller acts as
    pub user_id: UserId,

    /// Cross-user capabilities
    pub capabilities: Capabilities,
}

/// Capability flags beyond resource ownership
#[derive(Debug, Clone, Default)]
pub struct Capabilities {
    /// Can read any proof (human review)
    pub reviewer: bool,

    /// Can act on any user's sessions and proofs (backend automation)
    pub service: bool,
}

impl Capabilities {
    pub fn owner_only() -> Self {
        Self {
            reviewer: false,
            service: false,
        }
    }

    pub fn reviewer() -> Self {
        Self {
            reviewer: true,
            service: false,
        }
    }

    pub fn service() -> Self {
        Self {
            reviewer: true,
            service: true,
        }
    }
}

impl AuthContext {
    /// Context for a user managing their own resources
    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id,
            capabilities: Capabilities::owner_only(),
        }
    }

    /// Check if this caller may mutate a session owned by `owner`
    pub fn can_manage_session(&self, owner: UserId) -> bool {
        self.user_id == owner || self.capabilities.service
    }

    /// Check if this caller may read a proof owned by `owner`
    pub fn can_read_proof(&self, owner: UserId) -> bool {
        self.user_id == owner || self.capabilities.reviewer || self.capabilities.service
    }

    /// Check if this caller may revoke a proof owned by `owner`
    pub fn can_revoke_proof(&self, owner: UserId) -> bool {
        self.user_id == owner || self.capabilities.service
    }

    /// Acting identity recorded in audit entries
    pub fn actor(&self) -> Actor {
        if self.capabilities.service {
            Actor::service(self.user_id.to_string())
        } else {
            Actor::user(self.user_id)
        }
    }
}

/// Authentication error
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("missing authentication")]
    MissingAuth,

    #[error("invalid API key")]
    InvalidApiKey,

    #[error("insufficient permissions")]
    InsufficientPermissions,

    #[error("rate limit exceeded")]
    RateLimited,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_access() {
        let owner = UserId::new();
        let other = UserId::new();
        let context = AuthContext::for_user(owner);

        assert!(context.can_manage_session(owner));
        assert!(context.can_read_proof(owner));
        assert!(context.can_revoke_proof(owner));

        assert!(!context.can_manage_session(other));
        assert!(!context.can_read_proof(other));
        assert!(!context.can_revoke_proof(other));
    }

    #[test]
    fn test_reviewer_reads_but_never_mutates() {
        let owner = UserId::new();
        let context = AuthContext {
            user_id: UserId::new(),
            capabilities: Capabilities::reviewer(),
        };

        assert!(context.can_read_proof(owner));
        assert!(!context.can_manage_session(owner));
        assert!(!context.can_revoke_proof(owner));
    }

    #[test]
    fn test_service_has_full_access() {
        let owner = UserId::new();
        let context = AuthContext {
            user_id: UserId::new(),
            capabilities: Capabilities::service(),
        };

        assert!(context.can_manage_session(owner));
        assert!(context.can_read_proof(owner));
        assert!(context.can_revoke_proof(owner));
        assert_eq!(context.actor().kind, "service");
    }
}
