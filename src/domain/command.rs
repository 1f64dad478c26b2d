//! Commands accepted by the session state machine.
//!
//! Each command targets exactly one status; the state machine checks the
//! transition graph, applies the field mutations and commits the result
//! together with its audit entries.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{InterpretedResult, MediaRef, SessionStatus};

/// Why a session moved to the `failed` terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum FailureReason {
    /// The user reviewed the interpretation and declined it
    UserRejected,
    /// The interpretation service did not answer within the deadline
    InterpretationTimeout { elapsed_ms: u64 },
    /// The interpretation service answered with an error
    InterpretationUpstream(String),
    /// The interpretation service answered with output that failed validation
    MalformedOutput(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::UserRejected => write!(f, "user rejected interpretation"),
            FailureReason::InterpretationTimeout { elapsed_ms } => {
                write!(f, "interpretation timed out after {}ms", elapsed_ms)
            }
            FailureReason::InterpretationUpstream(msg) => {
                write!(f, "interpretation service error: {}", msg)
            }
            FailureReason::MalformedOutput(msg) => {
                write!(f, "malformed interpretation output: {}", msg)
            }
        }
    }
}

/// A requested mutation of one session.
#[derive(Debug, Clone)]
pub enum SessionCommand {
    /// Attach a validated, durably stored recording (`created → uploading`)
    AttachMedia { media_ref: MediaRef, size_bytes: u64 },
    /// Hand the stored recording to the dispatcher (`uploading → processing`)
    BeginProcessing,
    /// Attach the structured interpretation (`processing → transforming`)
    AttachResult { result: InterpretedResult },
    /// Present the result for user confirmation (`transforming → verifying`)
    MarkReady,
    /// User accepted the interpretation (`verifying → completed`)
    Confirm,
    /// User declined the interpretation (`verifying → failed`)
    Reject,
    /// Record a pipeline failure from any non-terminal state
    RecordFailure { reason: FailureReason },
}

impl SessionCommand {
    /// Status this command drives the session toward.
    pub fn target_status(&self) -> SessionStatus {
        match self {
            SessionCommand::AttachMedia { .. } => SessionStatus::Uploading,
            SessionCommand::BeginProcessing => SessionStatus::Processing,
            SessionCommand::AttachResult { .. } => SessionStatus::Transforming,
            SessionCommand::MarkReady => SessionStatus::Verifying,
            SessionCommand::Confirm => SessionStatus::Completed,
            SessionCommand::Reject | SessionCommand::RecordFailure { .. } => SessionStatus::Failed,
        }
    }

    /// Short tag used in logs and audit entries.
    pub fn name(&self) -> &'static str {
        match self {
            SessionCommand::AttachMedia { .. } => "attach_media",
            SessionCommand::BeginProcessing => "begin_processing",
            SessionCommand::AttachResult { .. } => "attach_result",
            SessionCommand::MarkReady => "mark_ready",
            SessionCommand::Confirm => "confirm",
            SessionCommand::Reject => "reject",
            SessionCommand::RecordFailure { .. } => "record_failure",
        }
    }
}

impl fmt::Display for SessionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_target_status_mapping() {
        assert_eq!(
            SessionCommand::BeginProcessing.target_status(),
            SessionStatus::Processing
        );
        assert_eq!(SessionCommand::Confirm.target_status(), SessionStatus::Completed);
        assert_eq!(SessionCommand::Reject.target_status(), SessionStatus::Failed);
        assert_eq!(
            SessionCommand::RecordFailure {
                reason: FailureReason::UserRejected
            }
            .target_status(),
            SessionStatus::Failed
        );
    }

    #[test]
    fn test_failure_reason_display() {
        assert_eq!(
            FailureReason::InterpretationTimeout { elapsed_ms: 30_000 }.to_string(),
            "interpretation timed out after 30000ms"
        );
        assert_eq!(
            FailureReason::MalformedOutput("confidence out of range".into()).to_string(),
            "malformed interpretation output: confidence out of range"
        );
    }

    #[test]
    fn test_failure_reason_serde_tagging() {
        let json =
            serde_json::to_value(FailureReason::InterpretationTimeout { elapsed_ms: 1200 })
                .unwrap();
        assert_eq!(json["kind"], "interpretation_timeout");
        assert_eq!(json["detail"]["elapsed_ms"], 1200);
    }
}
