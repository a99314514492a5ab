//! View materializer: four read projections derived from one fetch.
//!
//! ## Cache layout
//!
//! A miss fetches the joined rows once and normalizes them into id-keyed
//! arenas ([`Normalized`]), each entity stored once behind an `Arc`. Views are
//! denormalized on demand by filtering/grouping the assignment arena and
//! re-attaching entities by id, so every view served from one cache entry
//! agrees with the others.
//!
//! ## Invalidation
//!
//! - A token bumped by `AssignmentsChanged` / `PrinterModelsChanged`
//!   notifications. An entry is valid only for the token it was loaded under.
//! - A staleness bound, for changes no notification announces (hierarchy
//!   renames) and for missed notifications.
//!
//! The token is read before the fetch, so a change that lands mid-fetch makes
//! the next read refetch.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::debug;

use printfleet_core::{ClientId, DomainError, Entity, PrinterModelId, UnitId, UnitStatus};
use printfleet_events::{ChangeEnvelope, ChangeNotifier, SubscriptionHandle, Topic};
use printfleet_fleet::{AssignmentRecord, Client, Department, Location, PrinterModel};

use crate::error::EngineError;
use crate::store::{ViewSnapshot, ViewSource};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViewName {
    Assigned,
    Available,
    Catalog,
    Inventory,
}

impl ViewName {
    pub const ALL: [ViewName; 4] = [
        ViewName::Assigned,
        ViewName::Available,
        ViewName::Catalog,
        ViewName::Inventory,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ViewName::Assigned => "assigned",
            ViewName::Available => "available",
            ViewName::Catalog => "catalog",
            ViewName::Inventory => "inventory",
        }
    }
}

impl core::str::FromStr for ViewName {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ViewName::ALL
            .into_iter()
            .find(|v| v.as_str() == s)
            .ok_or_else(|| DomainError::validation(format!("unknown view '{s}'")))
    }
}

/// One unit with its entities re-attached.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitView {
    pub unit: Arc<AssignmentRecord>,
    pub model: Option<Arc<PrinterModel>>,
    /// Owning client (never the last-client hint).
    pub client: Option<Arc<Client>>,
    pub department: Option<Arc<Department>>,
    pub location: Option<Arc<Location>>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignedGroup {
    pub printer_model_id: PrinterModelId,
    pub model: Option<Arc<PrinterModel>>,
    pub assigned_count: usize,
    pub units: Vec<UnitView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvailableGroup {
    pub printer_model_id: PrinterModelId,
    pub model: Option<Arc<PrinterModel>>,
    pub available_count: usize,
    pub units: Vec<UnitView>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewRows {
    Assigned(Vec<AssignedGroup>),
    Available(Vec<AvailableGroup>),
    Catalog(Vec<Arc<PrinterModel>>),
    Inventory(Vec<UnitView>),
}

impl ViewRows {
    pub fn view(&self) -> ViewName {
        match self {
            ViewRows::Assigned(_) => ViewName::Assigned,
            ViewRows::Available(_) => ViewName::Available,
            ViewRows::Catalog(_) => ViewName::Catalog,
            ViewRows::Inventory(_) => ViewName::Inventory,
        }
    }

    /// Number of top-level rows (groups for grouped views).
    pub fn len(&self) -> usize {
        match self {
            ViewRows::Assigned(g) => g.len(),
            ViewRows::Available(g) => g.len(),
            ViewRows::Catalog(m) => m.len(),
            ViewRows::Inventory(u) => u.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

type Arena<E> = HashMap<<E as Entity>::Id, Arc<E>>;

/// Keep the first copy of each entity; later rows share it.
fn intern<E: Entity>(arena: &mut Arena<E>, entity: Option<E>) {
    if let Some(entity) = entity {
        arena.entry(entity.id()).or_insert_with(|| Arc::new(entity));
    }
}

/// Id-keyed arenas built from one snapshot.
#[derive(Debug, Default, Clone)]
pub struct Normalized {
    assignments: BTreeMap<UnitId, Arc<AssignmentRecord>>,
    models: Arena<PrinterModel>,
    clients: Arena<Client>,
    departments: Arena<Department>,
    locations: Arena<Location>,
}

impl Normalized {
    pub fn from_snapshot(snapshot: ViewSnapshot) -> Self {
        let mut n = Normalized::default();

        for model in snapshot.catalog {
            intern(&mut n.models, Some(model));
        }
        for row in snapshot.rows {
            intern(&mut n.models, row.model);
            intern(&mut n.clients, row.client);
            intern(&mut n.departments, row.department);
            intern(&mut n.locations, row.location);
            n.assignments
                .insert(row.assignment.id, Arc::new(row.assignment));
        }
        n
    }

    pub fn assignment_count(&self) -> usize {
        self.assignments.len()
    }

    /// Project one view. `scope` narrows the client-owned views (assigned,
    /// inventory) to one owner; the pool and the catalog are not owned and
    /// ignore it.
    pub fn denormalize(&self, view: ViewName, scope: Option<ClientId>) -> ViewRows {
        let in_scope = |r: &AssignmentRecord| scope.is_none_or(|c| r.client_id == Some(c));

        match view {
            ViewName::Assigned => {
                let groups = self.group(|r| {
                    r.status.is_assigned() && r.client_id.is_some() && in_scope(r)
                });
                ViewRows::Assigned(
                    groups
                        .into_iter()
                        .map(|(printer_model_id, model, units)| AssignedGroup {
                            printer_model_id,
                            model,
                            assigned_count: units.len(),
                            units,
                        })
                        .collect(),
                )
            }
            ViewName::Available => {
                let groups = self.group(|r| r.status == UnitStatus::Available);
                ViewRows::Available(
                    groups
                        .into_iter()
                        .map(|(printer_model_id, model, units)| AvailableGroup {
                            printer_model_id,
                            model,
                            available_count: units.len(),
                            units,
                        })
                        .collect(),
                )
            }
            ViewName::Catalog => {
                let mut models: Vec<Arc<PrinterModel>> = self
                    .models
                    .values()
                    .filter(|m| !m.is_deleted())
                    .cloned()
                    .collect();
                models.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
                ViewRows::Catalog(models)
            }
            ViewName::Inventory => {
                let mut units: Vec<UnitView> = self
                    .assignments
                    .values()
                    .filter(|r| in_scope(r.as_ref()))
                    .map(|r| self.attach(r))
                    .collect();
                units.sort_by(|a, b| a.unit.serial_number.cmp(&b.unit.serial_number));
                ViewRows::Inventory(units)
            }
        }
    }

    fn attach(&self, record: &Arc<AssignmentRecord>) -> UnitView {
        let location = record
            .department_location_id
            .and_then(|id| self.locations.get(&id))
            .cloned();
        let department = location
            .as_ref()
            .and_then(|l| self.departments.get(&l.department_id))
            .cloned();
        UnitView {
            unit: Arc::clone(record),
            model: self.models.get(&record.printer_model_id).cloned(),
            client: record.client_id.and_then(|id| self.clients.get(&id)).cloned(),
            department,
            location,
        }
    }

    /// Group matching units by model; counts are the group sizes.
    fn group<F>(&self, keep: F) -> Vec<(PrinterModelId, Option<Arc<PrinterModel>>, Vec<UnitView>)>
    where
        F: Fn(&AssignmentRecord) -> bool,
    {
        let mut by_model: BTreeMap<PrinterModelId, Vec<UnitView>> = BTreeMap::new();
        for record in self.assignments.values() {
            if !keep(record.as_ref()) {
                continue;
            }
            by_model
                .entry(record.printer_model_id)
                .or_default()
                .push(self.attach(record));
        }

        let mut groups: Vec<_> = by_model
            .into_iter()
            .map(|(model_id, mut units)| {
                units.sort_by(|a, b| a.unit.serial_number.cmp(&b.unit.serial_number));
                (model_id, self.models.get(&model_id).cloned(), units)
            })
            .collect();
        groups.sort_by(|a, b| {
            let name = |m: &Option<Arc<PrinterModel>>| m.as_ref().map(|m| m.name.clone());
            match (name(&a.1), name(&b.1)) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => core::cmp::Ordering::Less,
                (None, Some(_)) => core::cmp::Ordering::Greater,
                (None, None) => core::cmp::Ordering::Equal,
            }
            .then(a.0.cmp(&b.0))
        });
        groups
    }
}

struct CacheEntry {
    token: u64,
    loaded_at: Instant,
    data: Arc<Normalized>,
}

pub struct ViewMaterializer<V> {
    source: Arc<V>,
    staleness: Duration,
    token: Arc<AtomicU64>,
    cache: RwLock<Option<CacheEntry>>,
    _subscriptions: Vec<SubscriptionHandle>,
}

impl<V: ViewSource> ViewMaterializer<V> {
    /// Build a materializer subscribed to `notifier`. Dropping it unsubscribes.
    pub fn new<N: ChangeNotifier>(source: Arc<V>, notifier: &N, staleness: Duration) -> Self {
        let token = Arc::new(AtomicU64::new(0));
        let subscriptions = [Topic::AssignmentsChanged, Topic::PrinterModelsChanged]
            .into_iter()
            .map(|topic| {
                let token = Arc::clone(&token);
                notifier.subscribe(
                    topic,
                    Box::new(move |envelope: &ChangeEnvelope| {
                        let now = token.fetch_add(1, Ordering::SeqCst) + 1;
                        debug!(sequence = envelope.sequence(), token = now, "view cache invalidated");
                    }),
                )
            })
            .collect();

        Self {
            source,
            staleness,
            token,
            cache: RwLock::new(None),
            _subscriptions: subscriptions,
        }
    }

    /// Current invalidation token.
    pub fn token(&self) -> u64 {
        self.token.load(Ordering::SeqCst)
    }

    /// Drop the cached entry on the next read.
    pub fn invalidate(&self) {
        self.token.fetch_add(1, Ordering::SeqCst);
    }

    pub async fn get_view(
        &self,
        view: ViewName,
        scope: Option<ClientId>,
    ) -> Result<ViewRows, EngineError> {
        let data = self.snapshot().await?;
        Ok(data.denormalize(view, scope))
    }

    /// The normalized arenas, from cache when still valid.
    pub async fn snapshot(&self) -> Result<Arc<Normalized>, EngineError> {
        let token = self.token();
        if let Some(hit) = self.cached(token) {
            return Ok(hit);
        }

        debug!(token, "view cache miss");
        let snapshot = self.source.fetch_snapshot().await?;
        let data = Arc::new(Normalized::from_snapshot(snapshot));

        let mut cache = self
            .cache
            .write()
            .map_err(|_| EngineError::Backend("view cache lock poisoned".to_string()))?;
        // Keep whichever entry was loaded under the newer token.
        if cache.as_ref().is_none_or(|entry| entry.token <= token) {
            *cache = Some(CacheEntry {
                token,
                loaded_at: Instant::now(),
                data: Arc::clone(&data),
            });
        }
        Ok(data)
    }

    fn cached(&self, token: u64) -> Option<Arc<Normalized>> {
        let cache = self.cache.read().ok()?;
        let entry = cache.as_ref()?;
        if entry.token == token && entry.loaded_at.elapsed() < self.staleness {
            Some(Arc::clone(&entry.data))
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{JoinedRow, StoreError};
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use printfleet_core::LocationId;
    use printfleet_events::{ChangeEvent, InMemoryNotifier};
    use printfleet_fleet::{ModelStatus, UsageType};
    use proptest::prelude::*;
    use std::sync::atomic::AtomicUsize;

    fn model(name: &str, minutes_ago: i64) -> PrinterModel {
        PrinterModel {
            id: PrinterModelId::new(),
            manufacturer: "Canon".to_string(),
            series: None,
            model: name.to_string(),
            name: name.to_string(),
            color: true,
            rental_eligible: true,
            status: ModelStatus::Active,
            created_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
        }
    }

    fn record(model: &PrinterModel, serial: &str, status: UnitStatus, client: Option<ClientId>) -> AssignmentRecord {
        let owned = !matches!(status, UnitStatus::Available);
        let location = matches!(status, UnitStatus::Active).then(LocationId::new);
        AssignmentRecord {
            id: UnitId::new(),
            printer_model_id: model.id,
            client_id: if owned { client.or_else(|| Some(ClientId::new())) } else { None },
            department_location_id: location,
            serial_number: serial.to_string(),
            usage_type: UsageType::ServiceUnit,
            status,
            is_client_owned: false,
            monthly_price: None,
            deployment_date: None,
            maintenance_status: None,
            notes: None,
            last_client_id: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            revision: 1,
        }
    }

    fn row(assignment: AssignmentRecord, model: &PrinterModel) -> JoinedRow {
        JoinedRow {
            assignment,
            model: Some(model.clone()),
            client: None,
            location: None,
            department: None,
        }
    }

    struct CountingSource {
        fetches: AtomicUsize,
        snapshot: ViewSnapshot,
    }

    #[async_trait]
    impl ViewSource for CountingSource {
        async fn fetch_snapshot(&self) -> Result<ViewSnapshot, StoreError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            Ok(self.snapshot.clone())
        }
    }

    fn source() -> Arc<CountingSource> {
        let m = model("imageRUNNER", 5);
        Arc::new(CountingSource {
            fetches: AtomicUsize::new(0),
            snapshot: ViewSnapshot {
                rows: vec![
                    row(record(&m, "A1", UnitStatus::Available, None), &m),
                    row(record(&m, "A2", UnitStatus::Active, None), &m),
                ],
                catalog: vec![m],
            },
        })
    }

    #[tokio::test]
    async fn views_share_one_fetch_until_invalidated() {
        let notifier = InMemoryNotifier::new();
        let src = source();
        let views = ViewMaterializer::new(Arc::clone(&src), &notifier, Duration::from_secs(300));

        for view in ViewName::ALL {
            views.get_view(view, None).await.unwrap();
        }
        assert_eq!(src.fetches.load(Ordering::SeqCst), 1);

        notifier.publish(ChangeEvent::all_assignments()).unwrap();
        views.get_view(ViewName::Inventory, None).await.unwrap();
        assert_eq!(src.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn zero_staleness_always_refetches() {
        let notifier = InMemoryNotifier::new();
        let src = source();
        let views = ViewMaterializer::new(Arc::clone(&src), &notifier, Duration::ZERO);
        views.get_view(ViewName::Catalog, None).await.unwrap();
        views.get_view(ViewName::Catalog, None).await.unwrap();
        assert_eq!(src.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn dropping_the_materializer_unsubscribes() {
        let notifier = InMemoryNotifier::new();
        {
            let _views = ViewMaterializer::new(source(), &notifier, Duration::from_secs(1));
            assert_eq!(notifier.handler_count(), 2);
        }
        assert_eq!(notifier.handler_count(), 0);
    }

    #[test]
    fn catalog_is_newest_first_without_deleted() {
        let old = model("Old", 60);
        let new = model("New", 1);
        let mut gone = model("Gone", 0);
        gone.status = ModelStatus::Deleted;
        let n = Normalized::from_snapshot(ViewSnapshot {
            rows: vec![],
            catalog: vec![old.clone(), gone, new.clone()],
        });
        match n.denormalize(ViewName::Catalog, None) {
            ViewRows::Catalog(models) => {
                let ids: Vec<_> = models.iter().map(|m| m.id).collect();
                assert_eq!(ids, vec![new.id, old.id]);
            }
            other => panic!("expected catalog, got {other:?}"),
        }
    }

    #[test]
    fn entities_are_stored_once() {
        let m = model("Shared", 1);
        let n = Normalized::from_snapshot(ViewSnapshot {
            rows: vec![
                row(record(&m, "S1", UnitStatus::Available, None), &m),
                row(record(&m, "S2", UnitStatus::Available, None), &m),
            ],
            catalog: vec![],
        });
        let ViewRows::Available(groups) = n.denormalize(ViewName::Available, None) else {
            panic!("expected available view");
        };
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].available_count, 2);
        let a = groups[0].units[0].model.as_ref().unwrap();
        let b = groups[0].units[1].model.as_ref().unwrap();
        assert!(Arc::ptr_eq(a, b));
    }

    #[test]
    fn scope_narrows_owned_views_only() {
        let m = model("Scoped", 1);
        let mine = ClientId::new();
        let n = Normalized::from_snapshot(ViewSnapshot {
            rows: vec![
                row(record(&m, "M1", UnitStatus::Active, Some(mine)), &m),
                row(record(&m, "O1", UnitStatus::Undeployed, None), &m),
                row(record(&m, "P1", UnitStatus::Available, None), &m),
            ],
            catalog: vec![],
        });

        let ViewRows::Inventory(units) = n.denormalize(ViewName::Inventory, Some(mine)) else {
            panic!("expected inventory");
        };
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].unit.serial_number, "M1");

        let ViewRows::Available(pool) = n.denormalize(ViewName::Available, Some(mine)) else {
            panic!("expected available");
        };
        assert_eq!(pool[0].available_count, 1);
    }

    #[test]
    fn view_names_parse() {
        assert_eq!("assigned".parse::<ViewName>().unwrap(), ViewName::Assigned);
        assert!("everything".parse::<ViewName>().is_err());
    }

    proptest! {
        #![proptest_config(ProptestConfig {
            cases: 128,
            ..ProptestConfig::default()
        })]

        /// Property: per model, assigned + available + other rows equals the
        /// model's total row count.
        #[test]
        fn counts_partition_each_model(
            units in prop::collection::vec((0usize..3, 0usize..5), 0..60)
        ) {
            let models = [model("A", 3), model("B", 2), model("C", 1)];
            let rows: Vec<JoinedRow> = units
                .iter()
                .enumerate()
                .map(|(i, (m, s))| {
                    let m = &models[*m];
                    row(record(m, &format!("SN-{i}"), UnitStatus::ALL[*s], None), m)
                })
                .collect();
            let n = Normalized::from_snapshot(ViewSnapshot { rows, catalog: models.to_vec() });

            let ViewRows::Assigned(assigned) = n.denormalize(ViewName::Assigned, None) else {
                panic!("expected assigned");
            };
            let ViewRows::Available(available) = n.denormalize(ViewName::Available, None) else {
                panic!("expected available");
            };
            let ViewRows::Inventory(inventory) = n.denormalize(ViewName::Inventory, None) else {
                panic!("expected inventory");
            };

            for m in &models {
                let total = inventory.iter().filter(|u| u.unit.printer_model_id == m.id).count();
                let a = assigned.iter().find(|g| g.printer_model_id == m.id).map_or(0, |g| g.assigned_count);
                let v = available.iter().find(|g| g.printer_model_id == m.id).map_or(0, |g| g.available_count);
                let other = inventory
                    .iter()
                    .filter(|u| u.unit.printer_model_id == m.id)
                    .filter(|u| !u.unit.status.is_assigned() && u.unit.status != UnitStatus::Available)
                    .count();
                prop_assert_eq!(a + v + other, total);
            }
        }
    }
}
