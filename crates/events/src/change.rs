use serde::{Deserialize, Serialize};

use printfleet_core::{PrinterModelId, UnitId};

/// Subscription topic (one per announced table).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Topic {
    PrinterModelsChanged,
    AssignmentsChanged,
}

/// "Table X changed" notification.
///
/// Carries the affected id when the writer knows it, so subscribers can
/// invalidate precisely. `None` means "anything in the table may have changed".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "topic", rename_all = "snake_case")]
pub enum ChangeEvent {
    PrinterModelsChanged { model_id: Option<PrinterModelId> },
    AssignmentsChanged { unit_id: Option<UnitId> },
}

impl ChangeEvent {
    pub fn assignment(unit_id: UnitId) -> Self {
        Self::AssignmentsChanged {
            unit_id: Some(unit_id),
        }
    }

    pub fn all_assignments() -> Self {
        Self::AssignmentsChanged { unit_id: None }
    }

    pub fn printer_model(model_id: PrinterModelId) -> Self {
        Self::PrinterModelsChanged {
            model_id: Some(model_id),
        }
    }

    pub fn topic(&self) -> Topic {
        match self {
            ChangeEvent::PrinterModelsChanged { .. } => Topic::PrinterModelsChanged,
            ChangeEvent::AssignmentsChanged { .. } => Topic::AssignmentsChanged,
        }
    }
}
