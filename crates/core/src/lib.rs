//! `printfleet-core`: domain foundation building blocks.
//!
//! This crate contains **pure domain** primitives shared by the fleet crates
//! (no infrastructure concerns): identifiers, the unit status vocabulary, the
//! error taxonomy and the aggregate/entity traits.

pub mod aggregate;
pub mod entity;
pub mod error;
pub mod id;
pub mod status;

pub use aggregate::{Aggregate, AggregateRoot, Precondition, execute};
pub use entity::Entity;
pub use error::{CompletedStep, DomainError, DomainResult, PartialFailure};
pub use id::{ClientId, DepartmentId, HistoryEntryId, LocationId, PrinterModelId, UnitId, UserId};
pub use status::{LifecycleOp, UnassignLevel, UnitStatus};
