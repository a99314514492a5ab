//! Unit status vocabulary shared by the domain and the error taxonomy.

use serde::{Deserialize, Serialize};

/// Operational status of a physical unit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    /// Unowned, in the general pool.
    Available,
    /// Owned by a client but not deployed to a location.
    Undeployed,
    /// Deployed to a client's department/location.
    Active,
    /// Temporarily out of service, still owned.
    Inactive,
    /// Retired. Terminal.
    Decommissioned,
}

impl UnitStatus {
    pub const ALL: [UnitStatus; 5] = [
        UnitStatus::Available,
        UnitStatus::Undeployed,
        UnitStatus::Active,
        UnitStatus::Inactive,
        UnitStatus::Decommissioned,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            UnitStatus::Available => "available",
            UnitStatus::Undeployed => "undeployed",
            UnitStatus::Active => "active",
            UnitStatus::Inactive => "inactive",
            UnitStatus::Decommissioned => "decommissioned",
        }
    }

    pub fn is_terminal(self) -> bool {
        self == UnitStatus::Decommissioned
    }

    /// Statuses counted by the `assigned` view.
    pub fn is_assigned(self) -> bool {
        matches!(
            self,
            UnitStatus::Active | UnitStatus::Inactive | UnitStatus::Undeployed
        )
    }
}

impl core::fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for UnitStatus {
    type Err = crate::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UnitStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| crate::DomainError::validation(format!("unknown unit status '{s}'")))
    }
}

/// Hierarchy level a unit is unassigned from.
///
/// `Department` and `Location` have the same effect: an assignment only
/// references a location, and a location always implies its department.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnassignLevel {
    Location,
    Department,
    Client,
}

impl UnassignLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            UnassignLevel::Location => "location",
            UnassignLevel::Department => "department",
            UnassignLevel::Client => "client",
        }
    }
}

/// Operation attempted against a unit (used in errors, logs and history).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op", content = "level")]
pub enum LifecycleOp {
    RegisterUnit,
    AssignToPool,
    Deploy,
    Transfer,
    UnassignAtLevel(UnassignLevel),
    Deactivate,
    Decommission,
    RestoreToAvailable,
    UpdateServiceDetails,
    DeleteRecord,
}

impl core::fmt::Display for LifecycleOp {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            LifecycleOp::RegisterUnit => f.write_str("register_unit"),
            LifecycleOp::AssignToPool => f.write_str("assign_to_pool"),
            LifecycleOp::Deploy => f.write_str("deploy"),
            LifecycleOp::Transfer => f.write_str("transfer"),
            LifecycleOp::UnassignAtLevel(level) => {
                write!(f, "unassign_at_level({})", level.as_str())
            }
            LifecycleOp::Deactivate => f.write_str("deactivate"),
            LifecycleOp::Decommission => f.write_str("decommission"),
            LifecycleOp::RestoreToAvailable => f.write_str("restore_to_available"),
            LifecycleOp::UpdateServiceDetails => f.write_str("update_service_details"),
            LifecycleOp::DeleteRecord => f.write_str("delete_record"),
        }
    }
}
