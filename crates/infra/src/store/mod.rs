//! Storage seams for the fleet tables.
//!
//! ## Design principles
//!
//! - **Compare-and-swap writes**: a lifecycle write commits only if the row
//!   still has the status and revision the writer read ([`Precondition`]).
//!   No row is ever locked across a caller's decision.
//! - **History with the row**: every committed transition appends its
//!   [`HistoryEntry`] in the same atomic step as the row update.
//! - **Destructive operations re-verify**: `delete_client` re-checks its
//!   preconditions at the point of mutation, not only in a pre-flight read.
//! - **Async**: store calls never block a scheduler thread.
//!
//! Implementations: [`memory::InMemoryFleetStore`] (tests/dev) and, behind
//! the `postgres` feature, `postgres::PostgresFleetStore`.

use async_trait::async_trait;
use thiserror::Error;

use printfleet_core::{
    ClientId, DepartmentId, LocationId, Precondition, PrinterModelId, UnitId, UnitStatus,
};
use printfleet_fleet::{
    Assignment, AssignmentRecord, Client, Department, DepartmentStatus, HistoryEntry, Location,
    PrinterModel,
};

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

pub use memory::InMemoryFleetStore;

/// Storage operation error.
///
/// Infrastructure-level failures, as opposed to domain decisions. The engine
/// maps these into the domain taxonomy at its boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The conditional update found a different status/revision.
    /// `actual` is `None` when the row no longer exists.
    #[error("conditional update lost the race (actual status: {actual:?})")]
    Conflict { actual: Option<UnitStatus> },

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A uniqueness rule rejected the write (e.g. serial number already used).
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// A destructive operation's re-verified precondition no longer holds.
    #[error("precondition failed at commit: {0}")]
    PreconditionFailed(String),

    #[error("storage backend failure: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(entity: &'static str, id: impl core::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub(crate) fn poisoned(table: &str) -> Self {
        Self::Backend(format!("{table} table lock poisoned"))
    }
}

/// Authoritative table of assignment rows plus their history.
#[async_trait]
pub trait AssignmentStore: Send + Sync {
    async fn get(&self, id: UnitId) -> Result<Option<Assignment>, StoreError>;

    /// Insert a newly registered unit with its intake history entry.
    ///
    /// Fails with `Duplicate` when the serial number is already in use.
    async fn insert(&self, unit: Assignment, entry: HistoryEntry) -> Result<(), StoreError>;

    /// Replace the row if it still matches `expected`, appending `entry`
    /// atomically. On mismatch nothing is written and `Conflict` carries the
    /// status found.
    async fn commit(
        &self,
        expected: Precondition,
        next: Assignment,
        entry: HistoryEntry,
    ) -> Result<(), StoreError>;

    /// Hard delete. History is kept.
    async fn delete(&self, id: UnitId) -> Result<Assignment, StoreError>;

    /// History of one unit, oldest first.
    async fn history(&self, id: UnitId) -> Result<Vec<HistoryEntry>, StoreError>;

    /// Units whose owning client is `client_id`.
    async fn list_for_client(&self, client_id: ClientId) -> Result<Vec<Assignment>, StoreError>;
}

/// Client → department → location tables.
#[async_trait]
pub trait HierarchyStore: Send + Sync {
    async fn insert_client(&self, client: Client) -> Result<(), StoreError>;
    async fn get_client(&self, id: ClientId) -> Result<Option<Client>, StoreError>;

    /// Fails with `NotFound` when the owning client does not exist.
    async fn insert_department(&self, department: Department) -> Result<(), StoreError>;
    async fn get_department(&self, id: DepartmentId) -> Result<Option<Department>, StoreError>;
    async fn set_department_status(
        &self,
        id: DepartmentId,
        status: DepartmentStatus,
    ) -> Result<(), StoreError>;
    async fn departments_of(&self, client_id: ClientId) -> Result<Vec<Department>, StoreError>;

    /// Fails with `NotFound` when the owning department does not exist.
    async fn insert_location(&self, location: Location) -> Result<(), StoreError>;
    async fn get_location(&self, id: LocationId) -> Result<Option<Location>, StoreError>;
    async fn locations_of(&self, department_id: DepartmentId) -> Result<Vec<Location>, StoreError>;

    /// Delete a client with its departments and locations.
    ///
    /// Re-verifies, in the same atomic step as the delete, that the client
    /// has no active department and owns no live (non-decommissioned) unit;
    /// otherwise fails with `PreconditionFailed` and deletes nothing.
    async fn delete_client(&self, id: ClientId) -> Result<(), StoreError>;
}

/// Printer model catalog (creation and soft deletion only).
#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn insert_model(&self, model: PrinterModel) -> Result<(), StoreError>;
    async fn get_model(&self, id: PrinterModelId) -> Result<Option<PrinterModel>, StoreError>;
    async fn update_model(&self, model: PrinterModel) -> Result<(), StoreError>;
}

/// One assignment row joined with its model and hierarchy.
///
/// Joins follow ownership edges only; the last-client display hint of a
/// pooled unit is never joined.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinedRow {
    pub assignment: AssignmentRecord,
    pub model: Option<PrinterModel>,
    pub client: Option<Client>,
    pub location: Option<Location>,
    pub department: Option<Department>,
}

/// Everything the view cache needs, read in one fetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ViewSnapshot {
    pub rows: Vec<JoinedRow>,
    /// Every catalog entry, deleted ones included.
    pub catalog: Vec<PrinterModel>,
}

/// Read side used by the view materializer.
#[async_trait]
pub trait ViewSource: Send + Sync {
    async fn fetch_snapshot(&self) -> Result<ViewSnapshot, StoreError>;
}
