//! Flat wire/storage form of an assignment row.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use printfleet_core::{
    ClientId, DomainError, LocationId, PrinterModelId, UnitId, UnitStatus,
};

use crate::assignment::{Assignment, Placement, UsageType};

/// One assignment row as stored and exchanged.
///
/// `client_id` is the ownership edge (null while `available`).
/// `last_client_id` is only set for units that left a client through the
/// pool (available, or decommissioned from there) and is never joined on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssignmentRecord {
    pub id: UnitId,
    pub printer_model_id: PrinterModelId,
    pub client_id: Option<ClientId>,
    pub department_location_id: Option<LocationId>,
    pub serial_number: String,
    pub usage_type: UsageType,
    pub status: UnitStatus,
    pub is_client_owned: bool,
    pub monthly_price: Option<i64>,
    pub deployment_date: Option<NaiveDate>,
    pub maintenance_status: Option<String>,
    pub notes: Option<String>,
    pub last_client_id: Option<ClientId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub revision: u64,
}

impl From<&Assignment> for AssignmentRecord {
    fn from(a: &Assignment) -> Self {
        let last_client_id = match a.placement() {
            Placement::Available { last_client_id }
            | Placement::Decommissioned { last_client_id, .. } => *last_client_id,
            _ => None,
        };
        Self {
            id: a.unit_id(),
            printer_model_id: a.printer_model_id(),
            client_id: a.client_id(),
            department_location_id: a.location_id(),
            serial_number: a.serial_number().to_string(),
            usage_type: a.usage_type(),
            status: a.status(),
            is_client_owned: a.is_client_owned(),
            monthly_price: a.monthly_price(),
            deployment_date: a.deployment_date(),
            maintenance_status: a.maintenance_status().map(str::to_string),
            notes: a.notes().map(str::to_string),
            last_client_id,
            created_at: a.created_at(),
            updated_at: a.updated_at(),
            revision: a.revision(),
        }
    }
}

impl TryFrom<AssignmentRecord> for Assignment {
    type Error = DomainError;

    /// Rebuild the aggregate, rejecting rows that break the status invariants.
    fn try_from(r: AssignmentRecord) -> Result<Self, Self::Error> {
        let broken = |what: &str| {
            DomainError::integrity(format!("assignment {} is {} but {what}", r.id, r.status))
        };

        let placement = match r.status {
            UnitStatus::Available => {
                if r.department_location_id.is_some() {
                    return Err(broken("has a location"));
                }
                if r.client_id.is_some() {
                    return Err(broken("has an owning client"));
                }
                Placement::Available {
                    last_client_id: r.last_client_id,
                }
            }
            UnitStatus::Undeployed => {
                if r.department_location_id.is_some() {
                    return Err(broken("has a location"));
                }
                let client_id = r.client_id.ok_or_else(|| broken("has no client"))?;
                Placement::Undeployed { client_id }
            }
            UnitStatus::Active => Placement::Active {
                client_id: r.client_id.ok_or_else(|| broken("has no client"))?,
                location_id: r
                    .department_location_id
                    .ok_or_else(|| broken("has no location"))?,
            },
            UnitStatus::Inactive => Placement::Inactive {
                client_id: r.client_id.ok_or_else(|| broken("has no client"))?,
                location_id: r.department_location_id,
            },
            UnitStatus::Decommissioned => Placement::Decommissioned {
                client_id: r.client_id,
                location_id: r.department_location_id,
                last_client_id: r.last_client_id.filter(|_| r.client_id.is_none()),
            },
        };

        if r.is_client_owned != (r.usage_type == UsageType::ClientOwned) {
            return Err(DomainError::integrity(format!(
                "assignment {} has is_client_owned={} for usage type {}",
                r.id,
                r.is_client_owned,
                r.usage_type.as_str()
            )));
        }

        Assignment::from_parts(
            r.id,
            r.printer_model_id,
            r.serial_number,
            r.usage_type,
            r.monthly_price,
            placement,
            r.deployment_date,
            r.maintenance_status,
            r.notes,
            r.created_at,
            r.updated_at,
            r.revision,
        )
    }
}
