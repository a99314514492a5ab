//! Boundary error for fleet operations.

use thiserror::Error;

use printfleet_core::DomainError;

use crate::store::StoreError;

/// Error returned by the engine, resolver, catalog and view operations.
///
/// Deterministic failures travel as [`DomainError`]; storage failures that
/// have no domain meaning surface as `Backend`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error("storage backend failure: {0}")]
    Backend(String),

    /// A lookup was superseded by a newer request; its result was discarded.
    #[error("superseded by a newer request")]
    Superseded,
}

impl EngineError {
    pub fn domain(&self) -> Option<&DomainError> {
        match self {
            EngineError::Domain(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::Domain(e) => e.is_retryable(),
            EngineError::Backend(_) => true,
            EngineError::Superseded => false,
        }
    }
}

impl From<StoreError> for EngineError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict { actual } => EngineError::Domain(DomainError::conflict(
                actual,
                "unit was modified concurrently; refresh and retry",
            )),
            StoreError::NotFound { entity, id } => {
                EngineError::Domain(DomainError::NotFound { entity, id })
            }
            StoreError::Duplicate(msg) => EngineError::Domain(DomainError::Validation(msg)),
            // Re-verification at commit failed: the state moved after the pre-flight check.
            StoreError::PreconditionFailed(msg) => {
                EngineError::Domain(DomainError::conflict(None, msg))
            }
            StoreError::Backend(msg) => EngineError::Backend(msg),
        }
    }
}
