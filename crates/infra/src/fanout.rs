//! Bounded fan-out over a client's units.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, instrument};

use printfleet_core::{ClientId, DomainError, UnitId};

use crate::context::CallContext;
use crate::error::EngineError;
use crate::store::{AssignmentStore, HierarchyStore, StoreError};

/// Per-unit maintenance event counts, owned by the maintenance module.
#[async_trait]
pub trait MaintenanceEventSource: Send + Sync + 'static {
    async fn count_events(&self, unit_id: UnitId) -> Result<u64, StoreError>;
}

/// Runs per-unit lookups on at most `concurrency` tasks at a time.
pub struct MaintenanceFanout<M> {
    source: Arc<M>,
    permits: Arc<Semaphore>,
}

impl<M: MaintenanceEventSource> MaintenanceFanout<M> {
    /// `concurrency` below 1 is raised to 1.
    pub fn new(source: Arc<M>, concurrency: usize) -> Self {
        Self {
            source,
            permits: Arc::new(Semaphore::new(concurrency.max(1))),
        }
    }

    /// Sum of maintenance events over every unit `client_id` owns.
    ///
    /// The first failing lookup fails the whole call; lookups still running
    /// are aborted.
    #[instrument(skip_all, fields(client_id = %client_id), err)]
    pub async fn client_maintenance_total<S>(
        &self,
        ctx: &CallContext,
        store: &S,
        client_id: ClientId,
    ) -> Result<u64, EngineError>
    where
        S: AssignmentStore + HierarchyStore,
    {
        if store.get_client(client_id).await?.is_none() {
            return Err(DomainError::not_found("client", client_id).into());
        }
        let units = store.list_for_client(client_id).await?;
        debug!(units = units.len(), "fanning out maintenance lookups");

        let mut tasks = JoinSet::new();
        for unit in units {
            let source = Arc::clone(&self.source);
            let permits = Arc::clone(&self.permits);
            let cancel = ctx.cancel_token().clone();
            let unit_id = unit.unit_id();
            tasks.spawn(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| EngineError::Backend("fan-out pool closed".to_string()))?;
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => Err(EngineError::Domain(DomainError::Cancelled)),
                    count = source.count_events(unit_id) => count.map_err(EngineError::from),
                }
            });
        }

        let mut total: u64 = 0;
        while let Some(joined) = tasks.join_next().await {
            let count = joined
                .map_err(|err| EngineError::Backend(format!("fan-out task failed: {err}")))??;
            total = total.saturating_add(count);
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CatalogService;
    use crate::engine::LifecycleEngine;
    use crate::hierarchy::HierarchyResolver;
    use crate::store::InMemoryFleetStore;
    use printfleet_events::InMemoryNotifier;
    use printfleet_fleet::{NewPrinterModel, NewUnit, UsageType};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct SlowSource {
        running: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl MaintenanceEventSource for SlowSource {
        async fn count_events(&self, _unit_id: UnitId) -> Result<u64, StoreError> {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(3)
        }
    }

    struct Failing;

    #[async_trait]
    impl MaintenanceEventSource for Failing {
        async fn count_events(&self, _unit_id: UnitId) -> Result<u64, StoreError> {
            Err(StoreError::Backend("maintenance table offline".to_string()))
        }
    }

    async fn client_with_units(count: usize) -> (Arc<InMemoryFleetStore>, ClientId) {
        let store = Arc::new(InMemoryFleetStore::new());
        let notifier = InMemoryNotifier::new();
        let resolver = Arc::new(HierarchyResolver::new(Arc::clone(&store), "Main"));
        let engine = LifecycleEngine::new(Arc::clone(&store), Arc::clone(&resolver), notifier.clone());
        let ctx = CallContext::system();

        let client = resolver.create_client(&ctx, "Acme").await.unwrap();
        let model = CatalogService::new(Arc::clone(&store), notifier)
            .add_printer_model(
                &ctx,
                NewPrinterModel {
                    manufacturer: "Kyocera".to_string(),
                    series: None,
                    model: "ECOSYS P2040dn".to_string(),
                    name: None,
                    color: false,
                    rental_eligible: false,
                },
            )
            .await
            .unwrap();

        for i in 0..count {
            let unit = engine
                .register_unit(
                    &ctx,
                    NewUnit {
                        printer_model_id: model.id,
                        serial_number: format!("KY-{i}"),
                        usage_type: UsageType::ServiceUnit,
                        monthly_price: None,
                        notes: None,
                    },
                )
                .await
                .unwrap();
            engine
                .assign_to_pool(&ctx, unit.unit_id(), client.id)
                .await
                .unwrap();
        }
        (store, client.id)
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn total_sums_units_within_the_limit() {
        let (store, client) = client_with_units(12).await;
        let source = Arc::new(SlowSource::default());
        let fanout = MaintenanceFanout::new(Arc::clone(&source), 3);

        let total = fanout
            .client_maintenance_total(&CallContext::system(), store.as_ref(), client)
            .await
            .unwrap();
        assert_eq!(total, 36);
        assert!(source.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn first_failure_fails_the_call() {
        let (store, client) = client_with_units(2).await;
        let fanout = MaintenanceFanout::new(Arc::new(Failing), 2);
        let err = fanout
            .client_maintenance_total(&CallContext::system(), store.as_ref(), client)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Backend(_)));
    }

    #[tokio::test]
    async fn unknown_client_is_not_found() {
        let (store, _) = client_with_units(0).await;
        let fanout = MaintenanceFanout::new(Arc::new(Failing), 2);
        let err = fanout
            .client_maintenance_total(&CallContext::system(), store.as_ref(), ClientId::new())
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::NotFound { .. })));
    }
}
