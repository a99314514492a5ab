//! Domain error model.

use thiserror::Error;

use crate::id::DepartmentId;
use crate::status::{LifecycleOp, UnitStatus};

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// illegal transitions, conflicts, hierarchy integrity). Storage backend
/// failures belong to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or missing input (e.g. empty serial number).
    #[error("validation failed: {0}")]
    Validation(String),

    /// The operation is not legal from the unit's current status.
    #[error("invalid transition: cannot {attempted} a unit that is {from}")]
    InvalidTransition {
        from: UnitStatus,
        attempted: LifecycleOp,
    },

    /// Another writer won the race; `actual` is the status found at commit
    /// time (`None` when the row no longer exists).
    #[error("conflict: {detail}")]
    Conflict {
        actual: Option<UnitStatus>,
        detail: String,
    },

    /// The client → department → location chain does not line up.
    #[error("integrity violated: {0}")]
    Integrity(String),

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A multi-step operation completed some but not all of its steps.
    #[error("partial failure: {0}")]
    PartialFailure(PartialFailure),

    /// The caller cancelled before the mutation was committed.
    #[error("cancelled before commit")]
    Cancelled,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn integrity(msg: impl Into<String>) -> Self {
        Self::Integrity(msg.into())
    }

    pub fn invalid_transition(from: UnitStatus, attempted: LifecycleOp) -> Self {
        Self::InvalidTransition { from, attempted }
    }

    pub fn conflict(actual: Option<UnitStatus>, detail: impl Into<String>) -> Self {
        Self::Conflict {
            actual,
            detail: detail.into(),
        }
    }

    pub fn not_found(entity: &'static str, id: impl core::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Whether the caller may refresh state and try again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::PartialFailure(_))
    }
}

/// Step of a multi-step operation that did commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompletedStep {
    /// The department row exists; its default location does not.
    DepartmentCreated(DepartmentId),
}

/// Details of a partially applied multi-step operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialFailure {
    pub completed: CompletedStep,
    pub pending: &'static str,
    pub cause: String,
}

impl core::fmt::Display for PartialFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.completed {
            CompletedStep::DepartmentCreated(id) => write!(
                f,
                "department {id} was created but {} failed: {}",
                self.pending, self.cause
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_transition_message_names_status_and_op() {
        let err = DomainError::invalid_transition(UnitStatus::Decommissioned, LifecycleOp::Deploy);
        assert_eq!(
            err.to_string(),
            "invalid transition: cannot deploy a unit that is decommissioned"
        );
    }

    #[test]
    fn partial_failure_names_completed_department() {
        let dept = DepartmentId::new();
        let err = DomainError::PartialFailure(PartialFailure {
            completed: CompletedStep::DepartmentCreated(dept),
            pending: "default location creation",
            cause: "backend unavailable".to_string(),
        });
        let msg = err.to_string();
        assert!(msg.contains(&dept.to_string()));
        assert!(msg.contains("default location creation"));
        assert!(err.is_retryable());
    }

    #[test]
    fn validation_is_not_retryable() {
        assert!(!DomainError::validation("serial number is required").is_retryable());
        assert!(DomainError::conflict(Some(UnitStatus::Active), "lost race").is_retryable());
    }
}
