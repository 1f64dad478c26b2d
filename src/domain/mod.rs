//! Domain models for the verification engine
//!
//! Core types for verification sessions, interpreted results and proof
//! records.

mod command;
mod proof;
mod result;
mod session;
mod types;

pub use command::*;
pub use proof::*;
pub use result::*;
pub use session::*;
pub use types::*;
