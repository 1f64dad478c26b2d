//! API layer for the verification engine
//!
//! REST endpoints for sessions and proofs, with structured error responses.

mod error;
mod rest;

pub use error::*;
pub use rest::*;
