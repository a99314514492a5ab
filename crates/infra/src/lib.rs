//! Infrastructure layer: stores, the lifecycle engine, the hierarchy
//! resolver, the view cache and the lookup/fan-out helpers.

pub mod catalog;
pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod hierarchy;
pub mod lookup;
pub mod materializer;
pub mod store;

pub use catalog::CatalogService;
pub use config::{ConfigError, FleetConfig};
pub use context::CallContext;
pub use engine::{DeleteConfirmation, LifecycleEngine};
pub use error::EngineError;
pub use fanout::{MaintenanceEventSource, MaintenanceFanout};
pub use hierarchy::{DEFAULT_LOCATION_STEP, HierarchyResolver};
pub use lookup::{LastRequestWins, UnitSearch};
pub use materializer::{
    AssignedGroup, AvailableGroup, Normalized, UnitView, ViewMaterializer, ViewName, ViewRows,
};
pub use store::{
    AssignmentStore, CatalogStore, HierarchyStore, InMemoryFleetStore, JoinedRow, StoreError,
    ViewSnapshot, ViewSource,
};
