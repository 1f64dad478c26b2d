//! The verification pipeline
//!
//! Session state machine, media intake, interpretation dispatch, trust
//! scoring and proof issuance, assembled behind [`VerificationEngine`].

mod dispatcher;
mod intake;
mod pipeline;
mod proof;
mod state;
mod trust;

pub use dispatcher::*;
pub use intake::*;
pub use pipeline::*;
pub use proof::*;
pub use state::*;
pub use trust::*;
