//! Error taxonomy for session operations.
//!
//! Local errors, user-flow errors, and wrapped component errors all
//! surface here. Each error maps to a process exit code and a stable
//! machine-readable code for the `--json` envelope.

use std::path::PathBuf;
use thiserror::Error;

use daf_tracker::TrackerError;

/// Errors that can occur during session operations.
#[derive(Error, Debug)]
pub enum CoreError {
    /// A session with this name already exists.
    #[error("session '{0}' already exists")]
    Conflict(String),

    /// No session matches the given name or issue key.
    #[error("session not found: {0}")]
    NotFound(String),

    /// Invalid input or state.
    #[error("invalid {what}: {message}")]
    Invalid { what: String, message: String },

    /// A referenced path does not exist or is not usable.
    #[error("invalid path: {}", .0.display())]
    InvalidPath(PathBuf),

    /// Loaded session state violates an invariant.
    #[error("corrupt session state: {0}")]
    Corruption(String),

    /// The operation was interrupted by a signal.
    #[error("operation interrupted")]
    Interrupted,

    /// The user declined to continue.
    #[error("cancelled by user")]
    Cancelled,

    /// A prompt would be required but the process is non-interactive.
    #[error("interactive input required: {0}")]
    NeedsInteractive(String),

    /// The safety guard refused a mutating operation inside an agent.
    #[error("{0}")]
    SafetyRefused(String),

    /// Branch creation aborted without a resolution.
    #[error("branch conflict: {0}")]
    BranchConflict(String),

    /// Git subprocess failure.
    #[error("git error: {0}")]
    Git(String),

    /// Store failure.
    #[error(transparent)]
    Persistence(#[from] daf_persistence::PersistenceError),

    /// Configuration failure.
    #[error(transparent)]
    Config(#[from] daf_config::ConfigError),

    /// Tracker failure that blocked the operation.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// Agent launch or capture failure.
    #[error(transparent)]
    Agent(#[from] daf_agents::AgentError),
}

impl CoreError {
    /// Process exit code for this error.
    ///
    /// 0 success, 1 generic failure, 2 user-cancel, 3 safety-guard
    /// refusal, 4 tracker auth, 5 tracker not-found, 6 tracker
    /// validation.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Cancelled | Self::Interrupted => 2,
            Self::SafetyRefused(_) => 3,
            Self::Tracker(TrackerError::Auth { .. }) => 4,
            Self::Tracker(TrackerError::NotFound { .. }) => 5,
            Self::Tracker(TrackerError::Validation { .. }) => 6,
            _ => 1,
        }
    }

    /// Stable machine-readable code for the JSON envelope.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Conflict(_) => "CONFLICT",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Invalid { .. } => "INVALID",
            Self::InvalidPath(_) => "INVALID_PATH",
            Self::Corruption(_) => "CORRUPTION",
            Self::Interrupted => "INTERRUPTED",
            Self::Cancelled => "CANCELLED",
            Self::NeedsInteractive(_) => "NEEDS_INTERACTIVE",
            Self::SafetyRefused(_) => "SAFETY_REFUSED",
            Self::BranchConflict(_) => "BRANCH_CONFLICT",
            Self::Git(_) => "GIT_ERROR",
            Self::Persistence(daf_persistence::PersistenceError::Lock(_)) => "LOCK_ERROR",
            Self::Persistence(_) => "STORE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Tracker(TrackerError::Auth { .. }) => "AUTH_ERROR",
            Self::Tracker(TrackerError::NotFound { .. }) => "REMOTE_NOT_FOUND",
            Self::Tracker(TrackerError::Validation { .. }) => "VALIDATION_ERROR",
            Self::Tracker(TrackerError::Connection(_)) => "CONNECTION_ERROR",
            Self::Tracker(_) => "API_ERROR",
            Self::Agent(_) => "AGENT_ERROR",
        }
    }

    /// Structured details for the JSON envelope, when the error carries
    /// any (field-level validation messages, for instance).
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::Tracker(TrackerError::Validation { field_errors }) => {
                Some(serde_json::json!({ "field_errors": field_errors }))
            }
            Self::Tracker(TrackerError::Api { status, messages, .. }) => {
                Some(serde_json::json!({ "status": status, "messages": messages }))
            }
            _ => None,
        }
    }
}

/// Result type alias for session operations.
pub type Result<T> = std::result::Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_exit_codes() {
        assert_eq!(CoreError::Cancelled.exit_code(), 2);
        assert_eq!(CoreError::Interrupted.exit_code(), 2);
        assert_eq!(CoreError::SafetyRefused("x".to_string()).exit_code(), 3);
        assert_eq!(
            CoreError::Tracker(TrackerError::Auth {
                status: Some(401),
                message: "x".to_string()
            })
            .exit_code(),
            4
        );
        assert_eq!(
            CoreError::Tracker(TrackerError::NotFound {
                kind: "issue".to_string(),
                id: "PROJ-1".to_string()
            })
            .exit_code(),
            5
        );
        assert_eq!(
            CoreError::Tracker(TrackerError::Validation {
                field_errors: BTreeMap::new()
            })
            .exit_code(),
            6
        );
        assert_eq!(CoreError::NotFound("x".to_string()).exit_code(), 1);
    }

    #[test]
    fn test_validation_details_carry_fields() {
        let err = CoreError::Tracker(TrackerError::Validation {
            field_errors: BTreeMap::from([(
                "customfield_10010".to_string(),
                "required".to_string(),
            )]),
        });
        assert_eq!(err.code(), "VALIDATION_ERROR");
        let details = err.details().unwrap();
        assert_eq!(details["field_errors"]["customfield_10010"], "required");
    }

    #[test]
    fn test_generic_errors_have_no_details() {
        assert!(CoreError::NotFound("x".to_string()).details().is_none());
    }
}
