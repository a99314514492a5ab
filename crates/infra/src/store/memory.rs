use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use async_trait::async_trait;

use printfleet_core::{
    ClientId, DepartmentId, Entity, LocationId, Precondition, PrinterModelId, UnitId, UnitStatus,
};
use printfleet_fleet::{
    Assignment, AssignmentRecord, Client, Department, DepartmentStatus, HistoryEntry, Location,
    PrinterModel,
};

use super::{
    AssignmentStore, CatalogStore, HierarchyStore, JoinedRow, StoreError, ViewSnapshot, ViewSource,
};

#[derive(Debug, Default)]
struct AssignmentTable {
    rows: BTreeMap<UnitId, Assignment>,
    serials: HashMap<String, UnitId>,
}

/// In-memory fleet store.
///
/// Intended for tests/dev. Each table has its own lock; no lock is held
/// across an `.await`. Multi-table operations take locks in declaration
/// order (clients, departments, locations, models, assignments, history).
#[derive(Debug, Default)]
pub struct InMemoryFleetStore {
    clients: RwLock<BTreeMap<ClientId, Client>>,
    departments: RwLock<BTreeMap<DepartmentId, Department>>,
    locations: RwLock<BTreeMap<LocationId, Location>>,
    models: RwLock<BTreeMap<PrinterModelId, PrinterModel>>,
    assignments: RwLock<AssignmentTable>,
    history: RwLock<Vec<HistoryEntry>>,
}

impl InMemoryFleetStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of assignment rows (all statuses).
    pub fn assignment_count(&self) -> usize {
        self.assignments.read().map(|t| t.rows.len()).unwrap_or(0)
    }
}

fn insert_new<E: Entity>(
    table: &mut BTreeMap<E::Id, E>,
    entity: E,
    kind: &str,
) -> Result<(), StoreError> {
    let id = entity.id();
    if table.contains_key(&id) {
        return Err(StoreError::Duplicate(format!("{kind} {id} already exists")));
    }
    table.insert(id, entity);
    Ok(())
}

#[async_trait]
impl AssignmentStore for InMemoryFleetStore {
    async fn get(&self, id: UnitId) -> Result<Option<Assignment>, StoreError> {
        let table = self
            .assignments
            .read()
            .map_err(|_| StoreError::poisoned("assignments"))?;
        Ok(table.rows.get(&id).cloned())
    }

    async fn insert(&self, unit: Assignment, entry: HistoryEntry) -> Result<(), StoreError> {
        let mut table = self
            .assignments
            .write()
            .map_err(|_| StoreError::poisoned("assignments"))?;
        let mut history = self
            .history
            .write()
            .map_err(|_| StoreError::poisoned("history"))?;

        let id = unit.unit_id();
        if table.rows.contains_key(&id) {
            return Err(StoreError::Duplicate(format!("unit {id} already exists")));
        }
        if let Some(existing) = table.serials.get(unit.serial_number()) {
            return Err(StoreError::Duplicate(format!(
                "serial number '{}' is already used by unit {existing}",
                unit.serial_number()
            )));
        }

        table.serials.insert(unit.serial_number().to_string(), id);
        table.rows.insert(id, unit);
        history.push(entry);
        Ok(())
    }

    async fn commit(
        &self,
        expected: Precondition,
        next: Assignment,
        entry: HistoryEntry,
    ) -> Result<(), StoreError> {
        let clients = self
            .clients
            .read()
            .map_err(|_| StoreError::poisoned("clients"))?;
        let locations = self
            .locations
            .read()
            .map_err(|_| StoreError::poisoned("locations"))?;
        let mut table = self
            .assignments
            .write()
            .map_err(|_| StoreError::poisoned("assignments"))?;
        let mut history = self
            .history
            .write()
            .map_err(|_| StoreError::poisoned("history"))?;

        let id = next.unit_id();
        let Some(current) = table.rows.get_mut(&id) else {
            return Err(StoreError::Conflict { actual: None });
        };
        if !expected.matches(current.status(), current.revision()) {
            return Err(StoreError::Conflict {
                actual: Some(current.status()),
            });
        }

        // Same referential checks the database enforces with foreign keys.
        if let Some(client_id) = next.client_id().filter(|c| !clients.contains_key(c)) {
            return Err(StoreError::not_found("client", client_id));
        }
        if let Some(location_id) = next.location_id().filter(|l| !locations.contains_key(l)) {
            return Err(StoreError::not_found("location", location_id));
        }

        *current = next;
        history.push(entry);
        Ok(())
    }

    async fn delete(&self, id: UnitId) -> Result<Assignment, StoreError> {
        let mut table = self
            .assignments
            .write()
            .map_err(|_| StoreError::poisoned("assignments"))?;
        let removed = table
            .rows
            .remove(&id)
            .ok_or_else(|| StoreError::not_found("assignment", id))?;
        table.serials.remove(removed.serial_number());
        Ok(removed)
    }

    async fn history(&self, id: UnitId) -> Result<Vec<HistoryEntry>, StoreError> {
        let history = self
            .history
            .read()
            .map_err(|_| StoreError::poisoned("history"))?;
        Ok(history.iter().filter(|e| e.unit_id == id).cloned().collect())
    }

    async fn list_for_client(&self, client_id: ClientId) -> Result<Vec<Assignment>, StoreError> {
        let table = self
            .assignments
            .read()
            .map_err(|_| StoreError::poisoned("assignments"))?;
        Ok(table
            .rows
            .values()
            .filter(|a| a.client_id() == Some(client_id))
            .cloned()
            .collect())
    }
}

#[async_trait]
impl HierarchyStore for InMemoryFleetStore {
    async fn insert_client(&self, client: Client) -> Result<(), StoreError> {
        let mut clients = self
            .clients
            .write()
            .map_err(|_| StoreError::poisoned("clients"))?;
        insert_new(&mut clients, client, "client")
    }

    async fn get_client(&self, id: ClientId) -> Result<Option<Client>, StoreError> {
        let clients = self
            .clients
            .read()
            .map_err(|_| StoreError::poisoned("clients"))?;
        Ok(clients.get(&id).cloned())
    }

    async fn insert_department(&self, department: Department) -> Result<(), StoreError> {
        let clients = self
            .clients
            .read()
            .map_err(|_| StoreError::poisoned("clients"))?;
        let mut departments = self
            .departments
            .write()
            .map_err(|_| StoreError::poisoned("departments"))?;

        if !clients.contains_key(&department.client_id) {
            return Err(StoreError::not_found("client", department.client_id));
        }
        insert_new(&mut departments, department, "department")
    }

    async fn get_department(&self, id: DepartmentId) -> Result<Option<Department>, StoreError> {
        let departments = self
            .departments
            .read()
            .map_err(|_| StoreError::poisoned("departments"))?;
        Ok(departments.get(&id).cloned())
    }

    async fn set_department_status(
        &self,
        id: DepartmentId,
        status: DepartmentStatus,
    ) -> Result<(), StoreError> {
        let mut departments = self
            .departments
            .write()
            .map_err(|_| StoreError::poisoned("departments"))?;
        let department = departments
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("department", id))?;
        department.status = status;
        Ok(())
    }

    async fn departments_of(&self, client_id: ClientId) -> Result<Vec<Department>, StoreError> {
        let departments = self
            .departments
            .read()
            .map_err(|_| StoreError::poisoned("departments"))?;
        Ok(departments
            .values()
            .filter(|d| d.client_id == client_id)
            .cloned()
            .collect())
    }

    async fn insert_location(&self, location: Location) -> Result<(), StoreError> {
        let departments = self
            .departments
            .read()
            .map_err(|_| StoreError::poisoned("departments"))?;
        let mut locations = self
            .locations
            .write()
            .map_err(|_| StoreError::poisoned("locations"))?;

        if !departments.contains_key(&location.department_id) {
            return Err(StoreError::not_found("department", location.department_id));
        }
        insert_new(&mut locations, location, "location")
    }

    async fn get_location(&self, id: LocationId) -> Result<Option<Location>, StoreError> {
        let locations = self
            .locations
            .read()
            .map_err(|_| StoreError::poisoned("locations"))?;
        Ok(locations.get(&id).cloned())
    }

    async fn locations_of(&self, department_id: DepartmentId) -> Result<Vec<Location>, StoreError> {
        let locations = self
            .locations
            .read()
            .map_err(|_| StoreError::poisoned("locations"))?;
        Ok(locations
            .values()
            .filter(|l| l.department_id == department_id)
            .cloned()
            .collect())
    }

    async fn delete_client(&self, id: ClientId) -> Result<(), StoreError> {
        let mut clients = self
            .clients
            .write()
            .map_err(|_| StoreError::poisoned("clients"))?;
        let mut departments = self
            .departments
            .write()
            .map_err(|_| StoreError::poisoned("departments"))?;
        let mut locations = self
            .locations
            .write()
            .map_err(|_| StoreError::poisoned("locations"))?;
        let assignments = self
            .assignments
            .read()
            .map_err(|_| StoreError::poisoned("assignments"))?;

        if !clients.contains_key(&id) {
            return Err(StoreError::not_found("client", id));
        }
        if let Some(active) = departments
            .values()
            .find(|d| d.client_id == id && d.is_active())
        {
            return Err(StoreError::PreconditionFailed(format!(
                "client {id} still has active department '{}'",
                active.name
            )));
        }
        let live_units = assignments
            .rows
            .values()
            .filter(|a| a.client_id() == Some(id) && a.status() != UnitStatus::Decommissioned)
            .count();
        if live_units > 0 {
            return Err(StoreError::PreconditionFailed(format!(
                "client {id} still owns {live_units} unit(s)"
            )));
        }

        let owned: Vec<DepartmentId> = departments
            .values()
            .filter(|d| d.client_id == id)
            .map(|d| d.id)
            .collect();
        locations.retain(|_, l| !owned.contains(&l.department_id));
        departments.retain(|_, d| d.client_id != id);
        clients.remove(&id);
        Ok(())
    }
}

#[async_trait]
impl CatalogStore for InMemoryFleetStore {
    async fn insert_model(&self, model: PrinterModel) -> Result<(), StoreError> {
        let mut models = self
            .models
            .write()
            .map_err(|_| StoreError::poisoned("printer_models"))?;
        insert_new(&mut models, model, "printer model")
    }

    async fn get_model(&self, id: PrinterModelId) -> Result<Option<PrinterModel>, StoreError> {
        let models = self
            .models
            .read()
            .map_err(|_| StoreError::poisoned("printer_models"))?;
        Ok(models.get(&id).cloned())
    }

    async fn update_model(&self, model: PrinterModel) -> Result<(), StoreError> {
        let mut models = self
            .models
            .write()
            .map_err(|_| StoreError::poisoned("printer_models"))?;
        let slot = models
            .get_mut(&model.id)
            .ok_or_else(|| StoreError::not_found("printer model", model.id))?;
        *slot = model;
        Ok(())
    }
}

#[async_trait]
impl ViewSource for InMemoryFleetStore {
    async fn fetch_snapshot(&self) -> Result<ViewSnapshot, StoreError> {
        let clients = self
            .clients
            .read()
            .map_err(|_| StoreError::poisoned("clients"))?;
        let departments = self
            .departments
            .read()
            .map_err(|_| StoreError::poisoned("departments"))?;
        let locations = self
            .locations
            .read()
            .map_err(|_| StoreError::poisoned("locations"))?;
        let models = self
            .models
            .read()
            .map_err(|_| StoreError::poisoned("printer_models"))?;
        let assignments = self
            .assignments
            .read()
            .map_err(|_| StoreError::poisoned("assignments"))?;

        let rows = assignments
            .rows
            .values()
            .map(|unit| {
                let location = unit.location_id().and_then(|id| locations.get(&id)).cloned();
                let department = location
                    .as_ref()
                    .and_then(|l| departments.get(&l.department_id))
                    .cloned();
                JoinedRow {
                    assignment: AssignmentRecord::from(unit),
                    model: models.get(&unit.printer_model_id()).cloned(),
                    client: unit.client_id().and_then(|id| clients.get(&id)).cloned(),
                    location,
                    department,
                }
            })
            .collect();

        Ok(ViewSnapshot {
            rows,
            catalog: models.values().cloned().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use printfleet_core::{Aggregate, HistoryEntryId, LifecycleOp};
    use printfleet_fleet::{LifecycleAction, LifecycleCommand, NewUnit, PlacementPoint, UsageType};

    fn unit(serial: &str) -> Assignment {
        Assignment::register(
            UnitId::new(),
            NewUnit {
                printer_model_id: PrinterModelId::new(),
                serial_number: serial.to_string(),
                usage_type: UsageType::ServiceUnit,
                monthly_price: None,
                notes: None,
            },
            Utc::now(),
        )
        .unwrap()
    }

    fn entry(unit: &Assignment, op: LifecycleOp, to: UnitStatus) -> HistoryEntry {
        HistoryEntry {
            id: HistoryEntryId::new(),
            unit_id: unit.unit_id(),
            op,
            from_status: unit.status(),
            to_status: to,
            from: PlacementPoint::default(),
            to: PlacementPoint::default(),
            actor: None,
            occurred_at: Utc::now(),
        }
    }

    async fn site(store: &InMemoryFleetStore) -> (ClientId, LocationId) {
        let now = Utc::now();
        let client = Client::new(ClientId::new(), "Acme", now).unwrap();
        let dept = Department::new(DepartmentId::new(), client.id, "Ops", now).unwrap();
        let loc = Location::new(LocationId::new(), dept.id, "Main", now).unwrap();
        store.insert_client(client.clone()).await.unwrap();
        store.insert_department(dept.clone()).await.unwrap();
        store.insert_location(loc.clone()).await.unwrap();
        (client.id, loc.id)
    }

    fn deployed(unit: &Assignment, (client_id, location_id): (ClientId, LocationId)) -> Assignment {
        let cmd = LifecycleCommand::new(
            unit.unit_id(),
            LifecycleAction::Deploy {
                client_id,
                location_id,
            },
            Utc::now(),
        );
        let mut next = unit.clone();
        for e in unit.handle(&cmd).unwrap() {
            next.apply(&e);
        }
        next
    }

    #[tokio::test]
    async fn duplicate_serial_is_rejected() {
        let store = InMemoryFleetStore::new();
        let a = unit("SN-1");
        let b = unit("SN-1");
        store
            .insert(a.clone(), entry(&a, LifecycleOp::RegisterUnit, UnitStatus::Available))
            .await
            .unwrap();
        let err = store
            .insert(b.clone(), entry(&b, LifecycleOp::RegisterUnit, UnitStatus::Available))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
        assert_eq!(store.assignment_count(), 1);
    }

    #[tokio::test]
    async fn second_commit_with_same_expectation_conflicts() {
        let store = InMemoryFleetStore::new();
        let a = unit("SN-2");
        store
            .insert(a.clone(), entry(&a, LifecycleOp::RegisterUnit, UnitStatus::Available))
            .await
            .unwrap();

        let target = site(&store).await;
        let expected = Precondition::new(a.status(), a.revision());
        let first = deployed(&a, target);
        let second = deployed(&a, target);

        store
            .commit(expected, first, entry(&a, LifecycleOp::Deploy, UnitStatus::Active))
            .await
            .unwrap();
        let err = store
            .commit(expected, second, entry(&a, LifecycleOp::Deploy, UnitStatus::Active))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Conflict {
                actual: Some(UnitStatus::Active)
            }
        );
        assert_eq!(store.history(a.unit_id()).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn commit_on_deleted_row_reports_missing_status() {
        let store = InMemoryFleetStore::new();
        let a = unit("SN-3");
        store
            .insert(a.clone(), entry(&a, LifecycleOp::RegisterUnit, UnitStatus::Available))
            .await
            .unwrap();
        store.delete(a.unit_id()).await.unwrap();

        let err = store
            .commit(
                Precondition::new(a.status(), a.revision()),
                deployed(&a, (ClientId::new(), LocationId::new())),
                entry(&a, LifecycleOp::Deploy, UnitStatus::Active),
            )
            .await
            .unwrap_err();
        assert_eq!(err, StoreError::Conflict { actual: None });
        // The serial is free again after a hard delete.
        let again = unit("SN-3");
        assert!(
            store
                .insert(again.clone(), entry(&again, LifecycleOp::RegisterUnit, UnitStatus::Available))
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn commit_rejects_location_removed_after_validation() {
        let store = InMemoryFleetStore::new();
        let a = unit("SN-4");
        store
            .insert(a.clone(), entry(&a, LifecycleOp::RegisterUnit, UnitStatus::Available))
            .await
            .unwrap();
        let (client_id, _) = site(&store).await;
        let gone = LocationId::new();

        let err = store
            .commit(
                Precondition::new(a.status(), a.revision()),
                deployed(&a, (client_id, gone)),
                entry(&a, LifecycleOp::Deploy, UnitStatus::Active),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "location", .. }));

        let stored = store.get(a.unit_id()).await.unwrap().unwrap();
        assert_eq!(stored.status(), UnitStatus::Available);
        assert_eq!(store.history(a.unit_id()).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn commit_rejects_unknown_client() {
        let store = InMemoryFleetStore::new();
        let a = unit("SN-5");
        store
            .insert(a.clone(), entry(&a, LifecycleOp::RegisterUnit, UnitStatus::Available))
            .await
            .unwrap();
        let (_, location_id) = site(&store).await;

        let err = store
            .commit(
                Precondition::new(a.status(), a.revision()),
                deployed(&a, (ClientId::new(), location_id)),
                entry(&a, LifecycleOp::Deploy, UnitStatus::Active),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "client", .. }));
    }

    #[tokio::test]
    async fn delete_client_rechecks_active_departments() {
        let store = InMemoryFleetStore::new();
        let now = Utc::now();
        let client = Client::new(ClientId::new(), "Acme", now).unwrap();
        let dept = Department::new(DepartmentId::new(), client.id, "Ops", now).unwrap();
        store.insert_client(client.clone()).await.unwrap();
        store.insert_department(dept.clone()).await.unwrap();

        let err = store.delete_client(client.id).await.unwrap_err();
        assert!(matches!(err, StoreError::PreconditionFailed(_)));

        store
            .set_department_status(dept.id, DepartmentStatus::Inactive)
            .await
            .unwrap();
        store.delete_client(client.id).await.unwrap();
        assert!(store.get_client(client.id).await.unwrap().is_none());
        assert!(store.get_department(dept.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn location_requires_existing_department() {
        let store = InMemoryFleetStore::new();
        let loc = Location::new(LocationId::new(), DepartmentId::new(), "Main", Utc::now()).unwrap();
        let err = store.insert_location(loc).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "department", .. }));
    }
}
