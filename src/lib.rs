//! vProof Engine Library
//!
//! Video-proof verification service: sessions capture a short recording of a
//! user performing an action, an interpreter reads the gestures, a trust
//! policy scores the result, and confirmed sessions yield signed, shareable
//! proof records.
//!
//! ## Modules
//!
//! - [`domain`] - Core domain types (sessions, interpreted results, proofs)
//! - [`engine`] - Verification pipeline (intake, dispatch, trust, issuance)
//! - [`infra`] - Infrastructure traits and in-memory implementations
//! - [`auth`] - Authentication (API keys, capabilities, rate limiting)
//! - [`crypto`] - Cryptographic utilities (hashing, canonical JSON, signatures)
//! - [`metrics`] - Observability and metrics
//! - [`telemetry`] - Structured logging setup
//! - [`api`] - REST API routes

pub mod api;
pub mod auth;
pub mod crypto;
pub mod domain;
pub mod engine;
pub mod infra;
pub mod metrics;
pub mod server;
pub mod telemetry;

// Re-export commonly used types
pub use domain::{
    DomainTag, FailureReason, Hash256, InterpretedResult, MediaRef, ProofCode, ProofRecord,
    ProofStatus, RawInterpretation, RecognizedUnit, SessionId, SessionStatus, UserId,
    VerificationSession,
};

pub use engine::{ConfirmOutcome, EngineConfig, ProofReadout, VerificationEngine};

pub use infra::{
    AuditSink, BlobStore, EngineError, Interpreter, Notifier, ProofStore, Result, SessionStore,
};
