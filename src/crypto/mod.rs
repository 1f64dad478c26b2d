//! Cryptographic utilities for the verification engine
//!
//! Provides:
//! - Canonical JSON hashing (deterministic, cross-language compatible)
//! - Media signature computation with domain separation
//! - Raw interpreter output checksums

mod hash;

pub use hash::*;
