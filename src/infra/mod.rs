//! Infrastructure layer for the verification engine
//!
//! Contains trait definitions and implementations for:
//! - Session and proof storage (compare-and-swap on status)
//! - Audit trail (entries committed atomically with their mutation)
//! - Blob storage (uploaded recordings)
//! - Interpretation service client interface
//! - Notification dispatch
//! - Graceful shutdown (request draining)

mod audit;
mod error;
mod graceful_shutdown;
mod memory;
mod traits;

pub use audit::{Actor, AuditAction, AuditEntry, AuditEntryBuilder};
pub use error::*;
pub use graceful_shutdown::{
    serve_with_shutdown, shutdown_signal, GracefulShutdownConfig, RequestGuard, RequestTracker,
    ShutdownCoordinator, ShutdownSignal,
};
pub use memory::{LogNotifier, MemoryBlobStore, MemoryStore, ScriptedInterpreter};
pub use traits::*;
