//! Assignment aggregate: one physical printer unit and its lifecycle.
//!
//! The unit's placement is a closed union over its status. Fields that are
//! only legal in some states live in the variants that allow them, so an
//! `active` unit without a location (or an `available` unit with one) cannot
//! be represented.
//!
//! ```text
//!             assign_to_pool            deploy
//! available ─────────────────▶ undeployed ──────▶ active
//!     ▲  │                        ▲  │ ▲            │ │
//!     │  └──────── deploy ────────┼──┼─┼────────────┘ │
//!     │                 unassign  │  │ └─ unassign ───┘
//!     │                 (location)│  │   (location)
//!     └── unassign(client) / restore ◀─ inactive ◀─ deactivate
//!
//! any non-terminal ── decommission ──▶ decommissioned (terminal)
//! ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use printfleet_core::{
    Aggregate, AggregateRoot, ClientId, DomainError, DomainResult, LifecycleOp, LocationId,
    PrinterModelId, UnassignLevel, UnitId, UnitStatus,
};
use printfleet_events::Event;

/// Business classification of a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageType {
    ServiceUnit,
    ClientOwned,
    Rental,
}

impl UsageType {
    pub fn as_str(self) -> &'static str {
        match self {
            UsageType::ServiceUnit => "service_unit",
            UsageType::ClientOwned => "client_owned",
            UsageType::Rental => "rental",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "service_unit" => Ok(UsageType::ServiceUnit),
            "client_owned" => Ok(UsageType::ClientOwned),
            "rental" => Ok(UsageType::Rental),
            other => Err(DomainError::validation(format!("unknown usage type '{other}'"))),
        }
    }
}

/// Where the unit is, keyed by its status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Placement {
    /// Unowned. `last_client_id` is a display hint only, never ownership.
    Available { last_client_id: Option<ClientId> },
    Undeployed { client_id: ClientId },
    Active { client_id: ClientId, location_id: LocationId },
    Inactive { client_id: ClientId, location_id: Option<LocationId> },
    /// Retired with the placement it had at the time (history only).
    /// `last_client_id` carries the display hint of a unit retired from the pool.
    Decommissioned {
        client_id: Option<ClientId>,
        location_id: Option<LocationId>,
        last_client_id: Option<ClientId>,
    },
}

impl Placement {
    pub fn status(&self) -> UnitStatus {
        match self {
            Placement::Available { .. } => UnitStatus::Available,
            Placement::Undeployed { .. } => UnitStatus::Undeployed,
            Placement::Active { .. } => UnitStatus::Active,
            Placement::Inactive { .. } => UnitStatus::Inactive,
            Placement::Decommissioned { .. } => UnitStatus::Decommissioned,
        }
    }

    /// Owning client (the ownership edge used by joins and scoping).
    pub fn client_id(&self) -> Option<ClientId> {
        match *self {
            Placement::Available { .. } => None,
            Placement::Undeployed { client_id }
            | Placement::Active { client_id, .. }
            | Placement::Inactive { client_id, .. } => Some(client_id),
            Placement::Decommissioned { client_id, .. } => client_id,
        }
    }

    pub fn location_id(&self) -> Option<LocationId> {
        match *self {
            Placement::Available { .. } | Placement::Undeployed { .. } => None,
            Placement::Active { location_id, .. } => Some(location_id),
            Placement::Inactive { location_id, .. }
            | Placement::Decommissioned { location_id, .. } => location_id,
        }
    }

    /// Client to show in a UI: the owner, or the last owner of a pooled unit.
    pub fn display_client_id(&self) -> Option<ClientId> {
        match *self {
            Placement::Available { last_client_id } => last_client_id,
            Placement::Decommissioned {
                client_id,
                last_client_id,
                ..
            } => client_id.or(last_client_id),
            _ => self.client_id(),
        }
    }
}

/// Input for a unit entering the fleet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewUnit {
    pub printer_model_id: PrinterModelId,
    pub serial_number: String,
    pub usage_type: UsageType,
    /// Minor currency units; rentals only.
    pub monthly_price: Option<i64>,
    pub notes: Option<String>,
}

/// Service fields editable outside the state machine. `None` keeps the
/// existing value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDetails {
    pub maintenance_status: Option<String>,
    pub notes: Option<String>,
    pub monthly_price: Option<i64>,
}

/// Aggregate root: one physical unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    id: UnitId,
    printer_model_id: PrinterModelId,
    serial_number: String,
    usage_type: UsageType,
    monthly_price: Option<i64>,
    placement: Placement,
    deployment_date: Option<NaiveDate>,
    maintenance_status: Option<String>,
    notes: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
    revision: u64,
}

impl Assignment {
    /// Create the row for a unit entering the fleet (always `available`).
    pub fn register(id: UnitId, input: NewUnit, now: DateTime<Utc>) -> DomainResult<Self> {
        let serial_number = input.serial_number.trim().to_string();
        if serial_number.is_empty() {
            return Err(DomainError::validation("serial number is required"));
        }
        check_price(input.usage_type, input.monthly_price)?;

        Ok(Self {
            id,
            printer_model_id: input.printer_model_id,
            serial_number,
            usage_type: input.usage_type,
            monthly_price: input.monthly_price,
            placement: Placement::Available {
                last_client_id: None,
            },
            deployment_date: None,
            maintenance_status: None,
            notes: input.notes.filter(|n| !n.trim().is_empty()),
            created_at: now,
            updated_at: now,
            revision: 1,
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn from_parts(
        id: UnitId,
        printer_model_id: PrinterModelId,
        serial_number: String,
        usage_type: UsageType,
        monthly_price: Option<i64>,
        placement: Placement,
        deployment_date: Option<NaiveDate>,
        maintenance_status: Option<String>,
        notes: Option<String>,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
        revision: u64,
    ) -> DomainResult<Self> {
        if serial_number.trim().is_empty() {
            return Err(DomainError::validation("serial number is required"));
        }
        check_price(usage_type, monthly_price)?;
        Ok(Self {
            id,
            printer_model_id,
            serial_number,
            usage_type,
            monthly_price,
            placement,
            deployment_date,
            maintenance_status,
            notes,
            created_at,
            updated_at,
            revision,
        })
    }

    pub fn unit_id(&self) -> UnitId {
        self.id
    }

    pub fn printer_model_id(&self) -> PrinterModelId {
        self.printer_model_id
    }

    pub fn serial_number(&self) -> &str {
        &self.serial_number
    }

    pub fn usage_type(&self) -> UsageType {
        self.usage_type
    }

    pub fn is_client_owned(&self) -> bool {
        self.usage_type == UsageType::ClientOwned
    }

    pub fn monthly_price(&self) -> Option<i64> {
        self.monthly_price
    }

    pub fn placement(&self) -> &Placement {
        &self.placement
    }

    pub fn status(&self) -> UnitStatus {
        self.placement.status()
    }

    pub fn client_id(&self) -> Option<ClientId> {
        self.placement.client_id()
    }

    pub fn location_id(&self) -> Option<LocationId> {
        self.placement.location_id()
    }

    pub fn deployment_date(&self) -> Option<NaiveDate> {
        self.deployment_date
    }

    pub fn maintenance_status(&self) -> Option<&str> {
        self.maintenance_status.as_deref()
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn require(&self, op: LifecycleOp, allowed: &[UnitStatus]) -> DomainResult<()> {
        let status = self.status();
        if allowed.contains(&status) {
            Ok(())
        } else {
            Err(DomainError::invalid_transition(status, op))
        }
    }
}

impl AggregateRoot for Assignment {
    type Id = UnitId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.revision
    }
}

/// What the caller wants to happen to a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum LifecycleAction {
    AssignToPool { client_id: ClientId },
    Deploy { client_id: ClientId, location_id: LocationId },
    Transfer { client_id: ClientId, location_id: LocationId },
    UnassignAtLevel { level: UnassignLevel },
    Deactivate,
    Decommission,
    RestoreToAvailable,
    UpdateServiceDetails { details: ServiceDetails },
}

impl LifecycleAction {
    pub fn op(&self) -> LifecycleOp {
        match self {
            LifecycleAction::AssignToPool { .. } => LifecycleOp::AssignToPool,
            LifecycleAction::Deploy { .. } => LifecycleOp::Deploy,
            LifecycleAction::Transfer { .. } => LifecycleOp::Transfer,
            LifecycleAction::UnassignAtLevel { level } => LifecycleOp::UnassignAtLevel(*level),
            LifecycleAction::Deactivate => LifecycleOp::Deactivate,
            LifecycleAction::Decommission => LifecycleOp::Decommission,
            LifecycleAction::RestoreToAvailable => LifecycleOp::RestoreToAvailable,
            LifecycleAction::UpdateServiceDetails { .. } => LifecycleOp::UpdateServiceDetails,
        }
    }
}

/// Command: apply one lifecycle action to one unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleCommand {
    pub unit_id: UnitId,
    pub action: LifecycleAction,
    pub occurred_at: DateTime<Utc>,
}

impl LifecycleCommand {
    pub fn new(unit_id: UnitId, action: LifecycleAction, occurred_at: DateTime<Utc>) -> Self {
        Self {
            unit_id,
            action,
            occurred_at,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LifecycleEvent {
    AssignedToPool {
        unit_id: UnitId,
        client_id: ClientId,
        occurred_at: DateTime<Utc>,
    },
    Deployed {
        unit_id: UnitId,
        client_id: ClientId,
        location_id: LocationId,
        occurred_at: DateTime<Utc>,
    },
    Transferred {
        unit_id: UnitId,
        from: Placement,
        client_id: ClientId,
        location_id: LocationId,
        occurred_at: DateTime<Utc>,
    },
    Unassigned {
        unit_id: UnitId,
        level: UnassignLevel,
        occurred_at: DateTime<Utc>,
    },
    Deactivated {
        unit_id: UnitId,
        occurred_at: DateTime<Utc>,
    },
    Decommissioned {
        unit_id: UnitId,
        occurred_at: DateTime<Utc>,
    },
    RestoredToAvailable {
        unit_id: UnitId,
        occurred_at: DateTime<Utc>,
    },
    ServiceDetailsUpdated {
        unit_id: UnitId,
        details: ServiceDetails,
        occurred_at: DateTime<Utc>,
    },
}

impl LifecycleEvent {
    pub fn op(&self) -> LifecycleOp {
        match self {
            LifecycleEvent::AssignedToPool { .. } => LifecycleOp::AssignToPool,
            LifecycleEvent::Deployed { .. } => LifecycleOp::Deploy,
            LifecycleEvent::Transferred { .. } => LifecycleOp::Transfer,
            LifecycleEvent::Unassigned { level, .. } => LifecycleOp::UnassignAtLevel(*level),
            LifecycleEvent::Deactivated { .. } => LifecycleOp::Deactivate,
            LifecycleEvent::Decommissioned { .. } => LifecycleOp::Decommission,
            LifecycleEvent::RestoredToAvailable { .. } => LifecycleOp::RestoreToAvailable,
            LifecycleEvent::ServiceDetailsUpdated { .. } => LifecycleOp::UpdateServiceDetails,
        }
    }
}

impl Event for LifecycleEvent {
    fn event_type(&self) -> &'static str {
        match self {
            LifecycleEvent::AssignedToPool { .. } => "fleet.unit.assigned_to_pool",
            LifecycleEvent::Deployed { .. } => "fleet.unit.deployed",
            LifecycleEvent::Transferred { .. } => "fleet.unit.transferred",
            LifecycleEvent::Unassigned { .. } => "fleet.unit.unassigned",
            LifecycleEvent::Deactivated { .. } => "fleet.unit.deactivated",
            LifecycleEvent::Decommissioned { .. } => "fleet.unit.decommissioned",
            LifecycleEvent::RestoredToAvailable { .. } => "fleet.unit.restored_to_available",
            LifecycleEvent::ServiceDetailsUpdated { .. } => "fleet.unit.service_details_updated",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            LifecycleEvent::AssignedToPool { occurred_at, .. }
            | LifecycleEvent::Deployed { occurred_at, .. }
            | LifecycleEvent::Transferred { occurred_at, .. }
            | LifecycleEvent::Unassigned { occurred_at, .. }
            | LifecycleEvent::Deactivated { occurred_at, .. }
            | LifecycleEvent::Decommissioned { occurred_at, .. }
            | LifecycleEvent::RestoredToAvailable { occurred_at, .. }
            | LifecycleEvent::ServiceDetailsUpdated { occurred_at, .. } => *occurred_at,
        }
    }
}

impl Aggregate for Assignment {
    type Command = LifecycleCommand;
    type Event = LifecycleEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        let owner = self.placement.client_id();
        let location = self.placement.location_id();
        let hint = self.placement.display_client_id();

        match event {
            LifecycleEvent::AssignedToPool { client_id, .. } => {
                self.placement = Placement::Undeployed {
                    client_id: *client_id,
                };
            }
            LifecycleEvent::Deployed {
                client_id,
                location_id,
                occurred_at,
                ..
            }
            | LifecycleEvent::Transferred {
                client_id,
                location_id,
                occurred_at,
                ..
            } => {
                self.placement = Placement::Active {
                    client_id: *client_id,
                    location_id: *location_id,
                };
                self.deployment_date = Some(occurred_at.date_naive());
            }
            LifecycleEvent::Unassigned { level, .. } => {
                self.placement = match (level, owner) {
                    (UnassignLevel::Location | UnassignLevel::Department, Some(client_id)) => {
                        Placement::Undeployed { client_id }
                    }
                    _ => Placement::Available {
                        last_client_id: owner,
                    },
                };
                self.deployment_date = None;
            }
            LifecycleEvent::Deactivated { .. } => {
                if let Some(client_id) = owner {
                    self.placement = Placement::Inactive {
                        client_id,
                        location_id: location,
                    };
                }
            }
            LifecycleEvent::Decommissioned { .. } => {
                self.placement = Placement::Decommissioned {
                    client_id: owner,
                    location_id: location,
                    last_client_id: if owner.is_none() { hint } else { None },
                };
            }
            LifecycleEvent::RestoredToAvailable { .. } => {
                self.placement = Placement::Available {
                    last_client_id: owner,
                };
                self.deployment_date = None;
            }
            LifecycleEvent::ServiceDetailsUpdated { details, .. } => {
                if let Some(status) = &details.maintenance_status {
                    self.maintenance_status = Some(status.clone());
                }
                if let Some(notes) = &details.notes {
                    self.notes = Some(notes.clone());
                }
                if let Some(price) = details.monthly_price {
                    self.monthly_price = Some(price);
                }
            }
        }

        // Deterministic revision tracking: +1 per applied event.
        self.revision += 1;
        self.updated_at = event.occurred_at();
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        if command.unit_id != self.id {
            return Err(DomainError::validation("unit_id mismatch"));
        }

        let op = command.action.op();
        let status = self.status();
        if status.is_terminal() {
            return Err(DomainError::invalid_transition(status, op));
        }

        let unit_id = self.id;
        let occurred_at = command.occurred_at;

        let event = match &command.action {
            LifecycleAction::AssignToPool { client_id } => {
                self.require(op, &[UnitStatus::Available])?;
                LifecycleEvent::AssignedToPool {
                    unit_id,
                    client_id: *client_id,
                    occurred_at,
                }
            }
            LifecycleAction::Deploy {
                client_id,
                location_id,
            } => {
                self.require(
                    op,
                    &[UnitStatus::Available, UnitStatus::Undeployed, UnitStatus::Inactive],
                )?;
                LifecycleEvent::Deployed {
                    unit_id,
                    client_id: *client_id,
                    location_id: *location_id,
                    occurred_at,
                }
            }
            LifecycleAction::Transfer {
                client_id,
                location_id,
            } => {
                self.require(
                    op,
                    &[UnitStatus::Active, UnitStatus::Inactive, UnitStatus::Undeployed],
                )?;
                if self.placement
                    == (Placement::Active {
                        client_id: *client_id,
                        location_id: *location_id,
                    })
                {
                    return Err(DomainError::validation(
                        "unit is already deployed to that location",
                    ));
                }
                LifecycleEvent::Transferred {
                    unit_id,
                    from: self.placement,
                    client_id: *client_id,
                    location_id: *location_id,
                    occurred_at,
                }
            }
            LifecycleAction::UnassignAtLevel { level } => {
                match level {
                    UnassignLevel::Location | UnassignLevel::Department => {
                        self.require(op, &[UnitStatus::Active, UnitStatus::Inactive])?;
                    }
                    UnassignLevel::Client => {
                        self.require(
                            op,
                            &[UnitStatus::Undeployed, UnitStatus::Active, UnitStatus::Inactive],
                        )?;
                    }
                }
                LifecycleEvent::Unassigned {
                    unit_id,
                    level: *level,
                    occurred_at,
                }
            }
            LifecycleAction::Deactivate => {
                self.require(op, &[UnitStatus::Active, UnitStatus::Undeployed])?;
                LifecycleEvent::Deactivated {
                    unit_id,
                    occurred_at,
                }
            }
            LifecycleAction::Decommission => LifecycleEvent::Decommissioned {
                unit_id,
                occurred_at,
            },
            LifecycleAction::RestoreToAvailable => {
                // Restoring a unit that is already available is rejected rather
                // than treated as a no-op.
                self.require(op, &[UnitStatus::Undeployed, UnitStatus::Inactive])?;
                LifecycleEvent::RestoredToAvailable {
                    unit_id,
                    occurred_at,
                }
            }
            LifecycleAction::UpdateServiceDetails { details } => {
                if details.monthly_price.is_some() {
                    check_price(self.usage_type, details.monthly_price)?;
                }
                if details == &ServiceDetails::default() {
                    return Err(DomainError::validation("no service details to update"));
                }
                LifecycleEvent::ServiceDetailsUpdated {
                    unit_id,
                    details: details.clone(),
                    occurred_at,
                }
            }
        };

        Ok(vec![event])
    }
}

fn check_price(usage_type: UsageType, monthly_price: Option<i64>) -> DomainResult<()> {
    match (usage_type, monthly_price) {
        (_, None) => Ok(()),
        (UsageType::Rental, Some(price)) if price >= 0 => Ok(()),
        (UsageType::Rental, Some(_)) => Err(DomainError::validation(
            "monthly price cannot be negative",
        )),
        (other, Some(_)) => Err(DomainError::validation(format!(
            "monthly price is only allowed for rentals, not {}",
            other.as_str()
        ))),
    }
}
