//! Cancellable, last-request-wins lookups (search boxes, autocomplete).

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use printfleet_core::{ClientId, DomainError};

use crate::context::CallContext;
use crate::error::EngineError;
use crate::materializer::{UnitView, ViewMaterializer, ViewName, ViewRows};
use crate::store::ViewSource;

/// Serializes lookups so that only the newest one may deliver a result.
///
/// Starting a request cancels the one in flight. A request that finishes
/// after a newer one started returns [`EngineError::Superseded`] even if its
/// work completed.
#[derive(Debug, Default)]
pub struct LastRequestWins {
    generation: AtomicU64,
    in_flight: Mutex<Option<CancellationToken>>,
}

impl LastRequestWins {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `lookup` as the newest request. The context it receives is
    /// cancelled on supersession and when `ctx` is cancelled.
    pub async fn run<F, Fut, T>(&self, ctx: &CallContext, lookup: F) -> Result<T, EngineError>
    where
        F: FnOnce(CallContext) -> Fut,
        Fut: Future<Output = Result<T, EngineError>>,
    {
        let token = ctx.cancel_token().child_token();
        let generation = {
            let mut in_flight = self
                .in_flight
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if let Some(previous) = in_flight.replace(token.clone()) {
                previous.cancel();
            }
            self.generation.fetch_add(1, Ordering::SeqCst) + 1
        };

        let result = tokio::select! {
            biased;
            _ = token.cancelled() => {
                if ctx.is_cancelled() {
                    return Err(DomainError::Cancelled.into());
                }
                debug!(generation, "lookup superseded");
                return Err(EngineError::Superseded);
            }
            result = lookup(ctx.clone().with_cancel(token.clone())) => result,
        };

        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "stale lookup result discarded");
            return Err(EngineError::Superseded);
        }
        result
    }
}

/// Free-text unit search over the inventory view.
pub struct UnitSearch<V> {
    views: Arc<ViewMaterializer<V>>,
    gate: LastRequestWins,
}

impl<V: ViewSource> UnitSearch<V> {
    pub fn new(views: Arc<ViewMaterializer<V>>) -> Self {
        Self {
            views,
            gate: LastRequestWins::new(),
        }
    }

    /// Units whose serial, model, manufacturer, client or location name
    /// contains `query` (case-insensitive). A blank query matches nothing.
    pub async fn search_units(
        &self,
        ctx: &CallContext,
        query: &str,
        scope: Option<ClientId>,
    ) -> Result<Vec<UnitView>, EngineError> {
        let needle = query.trim().to_lowercase();
        // A cleared box still supersedes whatever is in flight.
        self.gate
            .run(ctx, |call| self.filter_inventory(call, needle, scope))
            .await
    }

    async fn filter_inventory(
        &self,
        call: CallContext,
        needle: String,
        scope: Option<ClientId>,
    ) -> Result<Vec<UnitView>, EngineError> {
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let ViewRows::Inventory(units) = self.views.get_view(ViewName::Inventory, scope).await?
        else {
            return Ok(Vec::new());
        };
        call.ensure_active()?;
        Ok(units
            .into_iter()
            .filter(|unit| matches_unit(unit, &needle))
            .collect())
    }
}

fn matches_unit(unit: &UnitView, needle: &str) -> bool {
    let hit = |s: &str| s.to_lowercase().contains(needle);
    hit(&unit.unit.serial_number)
        || unit
            .model
            .as_ref()
            .is_some_and(|m| hit(&m.name) || hit(&m.manufacturer) || hit(&m.model))
        || unit.client.as_ref().is_some_and(|c| hit(&c.name))
        || unit.location.as_ref().is_some_and(|l| hit(&l.name))
}
