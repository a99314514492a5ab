use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use printfleet_core::{
    ClientId, DepartmentId, HistoryEntryId, LifecycleOp, LocationId, UnitId, UnitStatus, UserId,
};

/// Where a unit sat in the hierarchy at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PlacementPoint {
    pub client_id: Option<ClientId>,
    pub department_id: Option<DepartmentId>,
    pub location_id: Option<LocationId>,
}

/// One committed transition of a unit.
///
/// Written in the same atomic step as the row update, so history never shows
/// a transition that did not commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: HistoryEntryId,
    pub unit_id: UnitId,
    pub op: LifecycleOp,
    pub from_status: UnitStatus,
    pub to_status: UnitStatus,
    pub from: PlacementPoint,
    pub to: PlacementPoint,
    pub actor: Option<UserId>,
    pub occurred_at: DateTime<Utc>,
}
