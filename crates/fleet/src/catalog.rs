use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use printfleet_core::{DomainError, DomainResult, Entity, PrinterModelId};

/// Catalog entry lifecycle (soft delete only).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelStatus {
    Active,
    Deleted,
}

/// A printer model from the catalog.
///
/// Name/spec editing is owned by the catalog collaborator; the fleet only
/// creates entries and soft-deletes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrinterModel {
    pub id: PrinterModelId,
    pub manufacturer: String,
    pub series: Option<String>,
    pub model: String,
    pub name: String,
    pub color: bool,
    pub rental_eligible: bool,
    pub status: ModelStatus,
    pub created_at: DateTime<Utc>,
}

/// Input for a new catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewPrinterModel {
    pub manufacturer: String,
    pub series: Option<String>,
    pub model: String,
    /// Display name; defaults to "<manufacturer> <model>" when empty.
    pub name: Option<String>,
    pub color: bool,
    pub rental_eligible: bool,
}

impl PrinterModel {
    pub fn create(id: PrinterModelId, input: NewPrinterModel, now: DateTime<Utc>) -> DomainResult<Self> {
        let manufacturer = input.manufacturer.trim().to_string();
        let model = input.model.trim().to_string();
        if manufacturer.is_empty() {
            return Err(DomainError::validation("manufacturer cannot be empty"));
        }
        if model.is_empty() {
            return Err(DomainError::validation("model cannot be empty"));
        }

        let name = match input.name.map(|n| n.trim().to_string()) {
            Some(n) if !n.is_empty() => n,
            _ => format!("{manufacturer} {model}"),
        };

        Ok(Self {
            id,
            manufacturer,
            series: input.series.filter(|s| !s.trim().is_empty()),
            model,
            name,
            color: input.color,
            rental_eligible: input.rental_eligible,
            status: ModelStatus::Active,
            created_at: now,
        })
    }

    pub fn is_deleted(&self) -> bool {
        self.status == ModelStatus::Deleted
    }

    /// Soft-delete. Units of this model keep referencing it.
    pub fn soft_delete(&mut self) -> DomainResult<()> {
        if self.is_deleted() {
            return Err(DomainError::validation(format!(
                "printer model {} is already deleted",
                self.id
            )));
        }
        self.status = ModelStatus::Deleted;
        Ok(())
    }
}

impl Entity for PrinterModel {
    type Id = PrinterModelId;

    fn id(&self) -> Self::Id {
        self.id
    }
}
