//! Aggregate root traits and the optimistic-concurrency expectation.

use crate::error::{DomainError, DomainResult};
use crate::status::UnitStatus;

/// Aggregate root marker + minimal interface.
pub trait AggregateRoot {
    /// Strongly-typed aggregate identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the aggregate identifier.
    fn id(&self) -> &Self::Id;

    /// Monotonically increasing revision of the aggregate's state.
    ///
    /// Bumped by the store on every committed write.
    fn version(&self) -> u64;
}

/// What a conditional update expects to find in the row it replaces.
///
/// A write commits only when both the status and the revision still match;
/// otherwise the writer lost a race and must refresh before retrying.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Precondition {
    pub status: UnitStatus,
    pub revision: u64,
}

impl Precondition {
    pub fn new(status: UnitStatus, revision: u64) -> Self {
        Self { status, revision }
    }

    pub fn matches(self, status: UnitStatus, revision: u64) -> bool {
        self.status == status && self.revision == revision
    }

    pub fn check(self, status: UnitStatus, revision: u64) -> DomainResult<()> {
        if self.matches(status, revision) {
            Ok(())
        } else {
            Err(DomainError::conflict(
                Some(status),
                format!(
                    "expected {} at revision {}, found {} at revision {}",
                    self.status, self.revision, status, revision
                ),
            ))
        }
    }
}

/// Aggregate execution semantics (pure, deterministic).
///
/// - **Decision logic**: `handle(&self, cmd)` returns events.
/// - **State mutation**: `apply(&mut self, event)` evolves state.
///
/// Aggregates must not perform IO. Validation that needs IO (hierarchy
/// lookups) happens before `handle` is called.
pub trait Aggregate: AggregateRoot {
    type Command: Clone + core::fmt::Debug;
    type Event: Clone + core::fmt::Debug;
    type Error: core::fmt::Debug;

    /// Evolve in-memory state from a single event.
    fn apply(&mut self, event: &Self::Event);

    /// Decide which events to emit given the current state and a command.
    ///
    /// This must not mutate state. State evolution is done through `apply`.
    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error>;
}

/// Decide on a copy of `current` and fold the resulting events into it.
///
/// `current` is left untouched, so a caller can still persist against the
/// revision it loaded.
pub fn execute<A>(current: &A, command: &A::Command) -> Result<(A, Vec<A::Event>), A::Error>
where
    A: Aggregate + Clone,
{
    let events = current.handle(command)?;
    let mut next = current.clone();
    for event in &events {
        next.apply(event);
    }
    Ok((next, events))
}
