#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use printfleet_core::{ClientId, LocationId, PrinterModelId, UnitId, UserId};
use printfleet_events::InMemoryNotifier;
use printfleet_fleet::{NewPrinterModel, NewUnit, UsageType};
use printfleet_infra::{
    CallContext, CatalogService, HierarchyResolver, InMemoryFleetStore, LifecycleEngine,
    ViewMaterializer,
};

pub type Engine = LifecycleEngine<InMemoryFleetStore, InMemoryNotifier>;

pub struct Fleet {
    pub store: Arc<InMemoryFleetStore>,
    pub notifier: InMemoryNotifier,
    pub resolver: Arc<HierarchyResolver<InMemoryFleetStore>>,
    pub engine: Arc<Engine>,
    pub views: Arc<ViewMaterializer<InMemoryFleetStore>>,
    pub ctx: CallContext,
    pub model: PrinterModelId,
}

/// A client with one department and its default location.
pub struct Site {
    pub client: ClientId,
    pub location: LocationId,
}

impl Fleet {
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryFleetStore::new());
        let notifier = InMemoryNotifier::new();
        let resolver = Arc::new(HierarchyResolver::new(Arc::clone(&store), "Main"));
        let engine = Arc::new(LifecycleEngine::new(
            Arc::clone(&store),
            Arc::clone(&resolver),
            notifier.clone(),
        ));
        let views = Arc::new(ViewMaterializer::new(
            Arc::clone(&store),
            &notifier,
            Duration::from_secs(300),
        ));
        let ctx = CallContext::new(UserId::new());

        let model = CatalogService::new(Arc::clone(&store), notifier.clone())
            .add_printer_model(
                &ctx,
                NewPrinterModel {
                    manufacturer: "Xerox".to_string(),
                    series: Some("VersaLink".to_string()),
                    model: "C405".to_string(),
                    name: None,
                    color: true,
                    rental_eligible: true,
                },
            )
            .await
            .unwrap();

        Self {
            store,
            notifier,
            resolver,
            engine,
            views,
            ctx,
            model: model.id,
        }
    }

    pub async fn site(&self, client_name: &str, department: &str) -> Site {
        let client = self
            .resolver
            .create_client(&self.ctx, client_name)
            .await
            .unwrap();
        let dept = self
            .resolver
            .create_department(&self.ctx, client.id, department)
            .await
            .unwrap();
        let location = self
            .resolver
            .create_default_location(&self.ctx, dept.id)
            .await
            .unwrap();
        Site {
            client: client.id,
            location: location.id,
        }
    }

    pub async fn unit(&self, serial: &str) -> UnitId {
        self.engine
            .register_unit(
                &self.ctx,
                NewUnit {
                    printer_model_id: self.model,
                    serial_number: serial.to_string(),
                    usage_type: UsageType::ServiceUnit,
                    monthly_price: None,
                    notes: None,
                },
            )
            .await
            .unwrap()
            .unit_id()
    }
}
