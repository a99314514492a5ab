//! Lifecycle engine: validated, atomic state transitions over the assignment
//! store.
//!
//! ## Execution flow
//!
//! ```text
//! operation
//!   ↓
//! 1. Load the unit row (revision + status become the CAS expectation)
//!   ↓
//! 2. Decide: Assignment::handle (pure; InvalidTransition / Validation)
//!   ↓
//! 3. Validate the hierarchy target through the resolver
//!   ↓
//! 4. Apply events to a copy, build the history entry
//!   ↓
//! 5. Session check, then compare-and-swap commit (row + history, atomically)
//!   ↓
//! 6. Publish AssignmentsChanged(unit) to the notifier
//! ```
//!
//! A lost race at step 5 returns `Conflict` with the status found and writes
//! nothing; the caller refreshes and decides whether to retry. A failure to
//! publish after a commit is logged and does not fail the operation: views
//! also expire on their staleness bound.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, instrument, warn};

use printfleet_core::{
    ClientId, DomainError, HistoryEntryId, LifecycleOp, LocationId, Precondition,
    UnassignLevel, UnitId, UnitStatus, execute,
};
use printfleet_events::{ChangeEvent, ChangeNotifier, Event};
use printfleet_fleet::{
    Assignment, HistoryEntry, LifecycleAction, LifecycleCommand, NewUnit, Placement,
    PlacementPoint, ServiceDetails,
};

use crate::context::CallContext;
use crate::error::EngineError;
use crate::hierarchy::HierarchyResolver;
use crate::store::{AssignmentStore, CatalogStore, HierarchyStore, StoreError};

/// Explicit confirmation for a hard delete: the caller echoes the unit's
/// serial number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteConfirmation {
    pub serial_number: String,
}

impl DeleteConfirmation {
    pub fn new(serial_number: impl Into<String>) -> Self {
        Self {
            serial_number: serial_number.into(),
        }
    }
}

pub struct LifecycleEngine<S, N> {
    store: Arc<S>,
    resolver: Arc<HierarchyResolver<S>>,
    notifier: N,
}

impl<S, N> LifecycleEngine<S, N>
where
    S: AssignmentStore + HierarchyStore + CatalogStore,
    N: ChangeNotifier,
{
    pub fn new(store: Arc<S>, resolver: Arc<HierarchyResolver<S>>, notifier: N) -> Self {
        Self {
            store,
            resolver,
            notifier,
        }
    }

    pub fn resolver(&self) -> &HierarchyResolver<S> {
        &self.resolver
    }

    pub async fn get(&self, unit_id: UnitId) -> Result<Assignment, EngineError> {
        self.load(unit_id).await
    }

    /// Committed transitions of a unit, oldest first.
    pub async fn history(&self, unit_id: UnitId) -> Result<Vec<HistoryEntry>, EngineError> {
        Ok(self.store.history(unit_id).await?)
    }

    /// Bring a new physical unit into the fleet as `available`.
    #[instrument(skip_all, fields(serial = %input.serial_number), err)]
    pub async fn register_unit(
        &self,
        ctx: &CallContext,
        input: NewUnit,
    ) -> Result<Assignment, EngineError> {
        let model = self
            .store
            .get_model(input.printer_model_id)
            .await?
            .ok_or_else(|| DomainError::not_found("printer model", input.printer_model_id))?;
        if model.is_deleted() {
            return Err(DomainError::validation(format!(
                "printer model {} is deleted",
                model.id
            ))
            .into());
        }

        let now = Utc::now();
        let unit = Assignment::register(UnitId::new(), input, now)?;
        let entry = HistoryEntry {
            id: HistoryEntryId::new(),
            unit_id: unit.unit_id(),
            op: LifecycleOp::RegisterUnit,
            from_status: UnitStatus::Available,
            to_status: UnitStatus::Available,
            from: PlacementPoint::default(),
            to: PlacementPoint::default(),
            actor: ctx.actor(),
            occurred_at: now,
        };

        ctx.ensure_active()?;
        self.store.insert(unit.clone(), entry).await?;
        info!(unit_id = %unit.unit_id(), model_id = %model.id, "unit registered");
        self.publish(ChangeEvent::assignment(unit.unit_id()));
        Ok(unit)
    }

    /// available → undeployed, owned by `client_id`.
    pub async fn assign_to_pool(
        &self,
        ctx: &CallContext,
        unit_id: UnitId,
        client_id: ClientId,
    ) -> Result<Assignment, EngineError> {
        self.transition(ctx, unit_id, LifecycleAction::AssignToPool { client_id })
            .await
    }

    /// {available, undeployed, inactive} → active at `location_id`.
    pub async fn deploy(
        &self,
        ctx: &CallContext,
        unit_id: UnitId,
        client_id: ClientId,
        location_id: LocationId,
    ) -> Result<Assignment, EngineError> {
        self.transition(
            ctx,
            unit_id,
            LifecycleAction::Deploy {
                client_id,
                location_id,
            },
        )
        .await
    }

    /// Move client and location together in one conditional update.
    pub async fn transfer(
        &self,
        ctx: &CallContext,
        unit_id: UnitId,
        client_id: ClientId,
        location_id: LocationId,
    ) -> Result<Assignment, EngineError> {
        self.transition(
            ctx,
            unit_id,
            LifecycleAction::Transfer {
                client_id,
                location_id,
            },
        )
        .await
    }

    pub async fn unassign_at_level(
        &self,
        ctx: &CallContext,
        unit_id: UnitId,
        level: UnassignLevel,
    ) -> Result<Assignment, EngineError> {
        self.transition(ctx, unit_id, LifecycleAction::UnassignAtLevel { level })
            .await
    }

    /// {active, undeployed} → inactive, keeping client and location.
    pub async fn deactivate(
        &self,
        ctx: &CallContext,
        unit_id: UnitId,
    ) -> Result<Assignment, EngineError> {
        self.transition(ctx, unit_id, LifecycleAction::Deactivate).await
    }

    /// Retire a unit. Irreversible.
    pub async fn decommission(
        &self,
        ctx: &CallContext,
        unit_id: UnitId,
    ) -> Result<Assignment, EngineError> {
        self.transition(ctx, unit_id, LifecycleAction::Decommission).await
    }

    /// {undeployed, inactive} → available.
    pub async fn restore_to_available(
        &self,
        ctx: &CallContext,
        unit_id: UnitId,
    ) -> Result<Assignment, EngineError> {
        self.transition(ctx, unit_id, LifecycleAction::RestoreToAvailable)
            .await
    }

    pub async fn update_service_details(
        &self,
        ctx: &CallContext,
        unit_id: UnitId,
        details: ServiceDetails,
    ) -> Result<Assignment, EngineError> {
        self.transition(ctx, unit_id, LifecycleAction::UpdateServiceDetails { details })
            .await
    }

    /// Hard-delete an erroneous or duplicate row, bypassing the state machine.
    ///
    /// The confirmation must echo the unit's serial number. Audited under the
    /// `printfleet::audit` target.
    #[instrument(skip_all, fields(unit_id = %unit_id), err)]
    pub async fn delete_record(
        &self,
        ctx: &CallContext,
        unit_id: UnitId,
        confirmation: DeleteConfirmation,
    ) -> Result<Assignment, EngineError> {
        let unit = self.load(unit_id).await?;
        if confirmation.serial_number.trim() != unit.serial_number() {
            return Err(DomainError::validation(
                "delete confirmation does not match the unit's serial number",
            )
            .into());
        }

        ctx.ensure_active()?;
        let removed = self.store.delete(unit_id).await?;
        warn!(
            target: "printfleet::audit",
            unit_id = %unit_id,
            serial = %removed.serial_number(),
            status = %removed.status(),
            actor = ?ctx.actor(),
            op = %LifecycleOp::DeleteRecord,
            "assignment record deleted"
        );
        self.publish(ChangeEvent::assignment(unit_id));
        Ok(removed)
    }

    #[instrument(skip_all, fields(unit_id = %unit_id, op = %action.op()), err)]
    async fn transition(
        &self,
        ctx: &CallContext,
        unit_id: UnitId,
        action: LifecycleAction,
    ) -> Result<Assignment, EngineError> {
        let current = self.load(unit_id).await?;
        let expected = Precondition::new(current.status(), current.revision());
        let op = action.op();

        let command = LifecycleCommand::new(unit_id, action, Utc::now());
        let (next, events) = execute(&current, &command)?;
        self.validate_target(&command.action).await?;

        let entry = HistoryEntry {
            id: HistoryEntryId::new(),
            unit_id,
            op,
            from_status: current.status(),
            to_status: next.status(),
            from: self.placement_point(current.placement()).await?,
            to: self.placement_point(next.placement()).await?,
            actor: ctx.actor(),
            occurred_at: command.occurred_at,
        };

        ctx.ensure_active()?;
        match self.store.commit(expected, next.clone(), entry).await {
            Ok(()) => {}
            Err(err @ StoreError::Conflict { .. }) => {
                debug!(unit_id = %unit_id, %op, error = %err, "lost conditional update");
                return Err(err.into());
            }
            Err(err) => return Err(err.into()),
        }

        info!(
            unit_id = %unit_id,
            %op,
            from = %current.status(),
            to = %next.status(),
            revision = next.revision(),
            events = ?events.iter().map(Event::qualified_type).collect::<Vec<_>>(),
            "unit transitioned"
        );
        self.publish(ChangeEvent::assignment(unit_id));
        Ok(next)
    }

    async fn validate_target(&self, action: &LifecycleAction) -> Result<(), EngineError> {
        match action {
            LifecycleAction::AssignToPool { client_id } => {
                self.resolver.resolve(*client_id, None).await?;
            }
            LifecycleAction::Deploy {
                client_id,
                location_id,
            }
            | LifecycleAction::Transfer {
                client_id,
                location_id,
            } => {
                self.resolver
                    .ensure_deployable(*client_id, *location_id)
                    .await?;
            }
            _ => {}
        }
        Ok(())
    }

    async fn placement_point(&self, placement: &Placement) -> Result<PlacementPoint, EngineError> {
        let location_id = placement.location_id();
        let department_id = match location_id {
            Some(id) => self.store.get_location(id).await?.map(|l| l.department_id),
            None => None,
        };
        Ok(PlacementPoint {
            client_id: placement.client_id(),
            department_id,
            location_id,
        })
    }

    async fn load(&self, unit_id: UnitId) -> Result<Assignment, EngineError> {
        self.store
            .get(unit_id)
            .await?
            .ok_or_else(|| DomainError::not_found("assignment", unit_id).into())
    }

    fn publish(&self, event: ChangeEvent) {
        if let Err(err) = self.notifier.publish(event) {
            warn!(error = %err, "change notification failed after commit");
        }
    }
}
