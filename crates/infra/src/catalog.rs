//! Catalog mutations the fleet owns: adding models and soft-deleting them.
//! Both publish `PrinterModelsChanged` directly.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use printfleet_core::{DomainError, PrinterModelId};
use printfleet_events::{ChangeEvent, ChangeNotifier};
use printfleet_fleet::{NewPrinterModel, PrinterModel};

use crate::context::CallContext;
use crate::error::EngineError;
use crate::store::CatalogStore;

pub struct CatalogService<S, N> {
    store: Arc<S>,
    notifier: N,
}

impl<S, N> CatalogService<S, N>
where
    S: CatalogStore,
    N: ChangeNotifier,
{
    pub fn new(store: Arc<S>, notifier: N) -> Self {
        Self { store, notifier }
    }

    pub async fn add_printer_model(
        &self,
        ctx: &CallContext,
        input: NewPrinterModel,
    ) -> Result<PrinterModel, EngineError> {
        let model = PrinterModel::create(PrinterModelId::new(), input, Utc::now())?;
        ctx.ensure_active()?;
        self.store.insert_model(model.clone()).await?;
        info!(model_id = %model.id, name = %model.name, "printer model added");
        self.publish(model.id);
        Ok(model)
    }

    /// Soft-delete a model. Units of that model keep their reference; the
    /// model only leaves the catalog view.
    pub async fn soft_delete_printer_model(
        &self,
        ctx: &CallContext,
        model_id: PrinterModelId,
    ) -> Result<PrinterModel, EngineError> {
        let mut model = self
            .store
            .get_model(model_id)
            .await?
            .ok_or_else(|| DomainError::not_found("printer model", model_id))?;
        model.soft_delete()?;

        ctx.ensure_active()?;
        self.store.update_model(model.clone()).await?;
        info!(model_id = %model_id, "printer model soft-deleted");
        self.publish(model_id);
        Ok(model)
    }

    fn publish(&self, model_id: PrinterModelId) {
        if let Err(err) = self.notifier.publish(ChangeEvent::printer_model(model_id)) {
            warn!(error = %err, "change notification failed after commit");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryFleetStore;
    use printfleet_events::{InMemoryNotifier, Topic};

    fn input() -> NewPrinterModel {
        NewPrinterModel {
            manufacturer: "HP".to_string(),
            series: Some("LaserJet".to_string()),
            model: "M404dn".to_string(),
            name: None,
            color: false,
            rental_eligible: false,
        }
    }

    #[tokio::test]
    async fn add_and_soft_delete_publish_model_changes() {
        let notifier = InMemoryNotifier::new();
        let sub = notifier.subscribe_channel(&[Topic::PrinterModelsChanged]);
        let catalog = CatalogService::new(Arc::new(InMemoryFleetStore::new()), notifier.clone());
        let ctx = CallContext::system();

        let model = catalog.add_printer_model(&ctx, input()).await.unwrap();
        let deleted = catalog
            .soft_delete_printer_model(&ctx, model.id)
            .await
            .unwrap();
        assert!(deleted.is_deleted());
        assert_eq!(sub.drain().len(), 2);

        let again = catalog
            .soft_delete_printer_model(&ctx, model.id)
            .await
            .unwrap_err();
        assert!(matches!(again.domain(), Some(DomainError::Validation(_))));
    }
}
