//! Per-call context carried by every mutating operation.

use tokio_util::sync::CancellationToken;

use printfleet_core::{DomainError, DomainResult, UserId};

/// Who is calling, and whether their session is still open.
///
/// Cancelling the token before a mutation is committed makes the operation
/// fail with `Cancelled` and write nothing. Once the store accepted the write
/// it stays committed.
#[derive(Debug, Clone, Default)]
pub struct CallContext {
    actor: Option<UserId>,
    cancel: CancellationToken,
}

impl CallContext {
    pub fn new(actor: UserId) -> Self {
        Self {
            actor: Some(actor),
            cancel: CancellationToken::new(),
        }
    }

    /// Context for internal jobs with no user behind them.
    pub fn system() -> Self {
        Self::default()
    }

    /// Bind the call to an existing session token.
    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn actor(&self) -> Option<UserId> {
        self.actor
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail with `Cancelled` if the session was closed.
    pub fn ensure_active(&self) -> DomainResult<()> {
        if self.cancel.is_cancelled() {
            Err(DomainError::Cancelled)
        } else {
            Ok(())
        }
    }
}
