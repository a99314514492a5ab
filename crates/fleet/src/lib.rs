//! Printer fleet domain module.
//!
//! This crate contains the business rules for the printer fleet: the catalog
//! entries, the client → department → location hierarchy and the assignment
//! lifecycle, implemented purely as deterministic domain logic (no IO, no
//! storage, no async).

pub mod assignment;
pub mod catalog;
pub mod hierarchy;
pub mod history;
pub mod record;

pub use assignment::{
    Assignment, LifecycleAction, LifecycleCommand, LifecycleEvent, NewUnit, Placement,
    ServiceDetails, UsageType,
};
pub use catalog::{ModelStatus, NewPrinterModel, PrinterModel};
pub use hierarchy::{
    Client, Department, DepartmentStatus, DeploymentTarget, Location, ResolvedChain, verify_chain,
};
pub use history::{HistoryEntry, PlacementPoint};
pub use record::AssignmentRecord;
