//! Error taxonomy for orchestrator operations.
//!
//! Four kinds, all surfaced with enough context for the API layer to act:
//! validation failures reject before any mutation, authorization failures
//! name the actor and the denied action, invalid-state failures name the
//! attempted transition and the current status, and store failures carry the
//! repository error. "No assignee available" is deliberately absent: it is a
//! valid selection outcome, not an error.

use crate::state::{ConcernStatus, StoreError};

/// Result type alias for orchestrator operations.
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Error type for orchestrator operations.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// Malformed input, rejected before any mutation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The actor lacks the role or relationship for the requested transition.
    #[error("{actor} may not {action}: {reason}")]
    Authorization {
        actor: String,
        action: String,
        reason: String,
    },

    /// The requested transition is not legal from the current status.
    #[error("concern {concern}: cannot {attempted} while {current}")]
    InvalidState {
        concern: String,
        attempted: String,
        current: ConcernStatus,
    },

    /// No cross-department handler could be found for an emergency.
    #[error("no cross-department handler available for emergency on concern {concern}")]
    EmergencyUnstaffed { concern: String },

    /// Repository failure, including version conflicts that outlived the
    /// retry limit.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrchestratorError {
    /// Authorization failure with context.
    pub fn unauthorized(
        actor: impl Into<String>,
        action: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Authorization {
            actor: actor.into(),
            action: action.into(),
            reason: reason.into(),
        }
    }

    /// Invalid-state failure with context.
    pub fn invalid_state(
        concern: impl Into<String>,
        attempted: impl Into<String>,
        current: ConcernStatus,
    ) -> Self {
        Self::InvalidState {
            concern: concern.into(),
            attempted: attempted.into(),
            current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_carry_context() {
        let err = OrchestratorError::unauthorized("student-1", "approve", "not a department head");
        assert_eq!(
            err.to_string(),
            "student-1 may not approve: not a department head"
        );

        let err = OrchestratorError::invalid_state(
            "CNR2024050001",
            "confirm_resolution",
            ConcernStatus::Pending,
        );
        assert!(err.to_string().contains("CNR2024050001"));
        assert!(err.to_string().contains("confirm_resolution"));
        assert!(err.to_string().contains("pending"));
    }

    #[test]
    fn test_store_errors_convert() {
        let err: OrchestratorError = StoreError::NotFound("concern x".into()).into();
        assert!(matches!(err, OrchestratorError::Store(_)));
    }
}
