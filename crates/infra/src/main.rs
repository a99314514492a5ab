use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use tracing::info;

use printfleet_core::{LifecycleOp, UnassignLevel, UnitId, UserId};
use printfleet_events::InMemoryNotifier;
use printfleet_fleet::{NewPrinterModel, NewUnit, ServiceDetails, UsageType};
use printfleet_infra::{
    AssignmentStore, CallContext, CatalogService, CatalogStore, FleetConfig, HierarchyResolver,
    HierarchyStore, InMemoryFleetStore, LifecycleEngine, MaintenanceEventSource,
    MaintenanceFanout, StoreError, UnitSearch, ViewMaterializer, ViewName, ViewRows, ViewSource,
};

/// Counts service-detail updates in a unit's history as maintenance events.
struct ServiceLog<S> {
    store: Arc<S>,
}

#[async_trait]
impl<S: AssignmentStore + 'static> MaintenanceEventSource for ServiceLog<S> {
    async fn count_events(&self, unit_id: UnitId) -> Result<u64, StoreError> {
        let history = self.store.history(unit_id).await?;
        Ok(history
            .iter()
            .filter(|entry| entry.op == LifecycleOp::UpdateServiceDetails)
            .count() as u64)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    printfleet_observability::init();

    let config = FleetConfig::from_env().context("invalid fleet configuration")?;

    #[cfg(feature = "postgres")]
    if let Some(url) = config.database_url.as_deref() {
        let store = printfleet_infra::store::postgres::PostgresFleetStore::connect(url)
            .await
            .context("connecting to postgres")?;
        store.migrate().await.context("running migrations")?;
        info!("running on postgres");
        return run(Arc::new(store), &config).await;
    }

    if config.database_url.is_some() {
        info!("DATABASE_URL is set but the postgres feature is off; using the in-memory store");
    }
    run(Arc::new(InMemoryFleetStore::new()), &config).await
}

/// Walks one unit through the fleet lifecycle and logs the resulting views.
async fn run<S>(store: Arc<S>, config: &FleetConfig) -> anyhow::Result<()>
where
    S: AssignmentStore + HierarchyStore + CatalogStore + ViewSource + 'static,
{
    let notifier = InMemoryNotifier::new();
    let resolver = Arc::new(HierarchyResolver::new(
        Arc::clone(&store),
        config.default_location_name.clone(),
    ));
    let engine = LifecycleEngine::new(Arc::clone(&store), Arc::clone(&resolver), notifier.clone());
    let catalog = CatalogService::new(Arc::clone(&store), notifier.clone());
    let views = Arc::new(ViewMaterializer::new(
        Arc::clone(&store),
        &notifier,
        config.view_staleness,
    ));
    let search = UnitSearch::new(Arc::clone(&views));
    let fanout = MaintenanceFanout::new(
        Arc::new(ServiceLog {
            store: Arc::clone(&store),
        }),
        config.fanout_concurrency,
    );
    let ctx = CallContext::new(UserId::new());

    let acme = resolver.create_client(&ctx, "Acme Logistics").await?;
    let finance = resolver.create_department(&ctx, acme.id, "Finance").await?;
    let main_office = resolver.create_default_location(&ctx, finance.id).await?;
    let model = catalog
        .add_printer_model(
            &ctx,
            NewPrinterModel {
                manufacturer: "Brother".to_string(),
                series: Some("HL".to_string()),
                model: "L2350DW".to_string(),
                name: None,
                color: false,
                rental_eligible: true,
            },
        )
        .await?;

    let unit = engine
        .register_unit(
            &ctx,
            NewUnit {
                printer_model_id: model.id,
                serial_number: "BRN-0001".to_string(),
                usage_type: UsageType::Rental,
                monthly_price: Some(4_500),
                notes: None,
            },
        )
        .await?;
    let id = unit.unit_id();

    engine.assign_to_pool(&ctx, id, acme.id).await?;
    engine.deploy(&ctx, id, acme.id, main_office.id).await?;
    engine
        .unassign_at_level(&ctx, id, UnassignLevel::Location)
        .await?;
    engine.deploy(&ctx, id, acme.id, main_office.id).await?;
    engine
        .update_service_details(
            &ctx,
            id,
            ServiceDetails {
                maintenance_status: Some("toner replaced".to_string()),
                ..Default::default()
            },
        )
        .await?;

    let serviced = fanout
        .client_maintenance_total(&ctx, store.as_ref(), acme.id)
        .await?;
    info!(
        client = %acme.name,
        events = serviced,
        concurrency = config.fanout_concurrency,
        "maintenance events"
    );

    for view in ViewName::ALL {
        let rows = views.get_view(view, None).await?;
        match &rows {
            ViewRows::Assigned(groups) => {
                for g in groups {
                    info!(view = view.as_str(), model = ?g.model.as_ref().map(|m| &m.name), count = g.assigned_count, "group");
                }
            }
            ViewRows::Available(groups) => {
                for g in groups {
                    info!(view = view.as_str(), model = ?g.model.as_ref().map(|m| &m.name), count = g.available_count, "group");
                }
            }
            ViewRows::Catalog(_) | ViewRows::Inventory(_) => {
                info!(view = view.as_str(), rows = rows.len(), "view");
            }
        }
    }

    let hits = search.search_units(&ctx, "brn", None).await?;
    info!(hits = hits.len(), "search for 'brn'");

    for entry in engine.history(id).await? {
        info!(
            op = %entry.op,
            from = %entry.from_status,
            to = %entry.to_status,
            at = %entry.occurred_at,
            "history"
        );
    }

    Ok(())
}
