use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ChangeEvent, Event, Topic};

/// Published notification plus delivery metadata.
///
/// `sequence` is assigned by the notifier and increases monotonically per
/// notifier instance, so subscribers can tell newer notifications from older.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEnvelope {
    sequence: u64,
    published_at: DateTime<Utc>,
    event: ChangeEvent,
}

impl ChangeEnvelope {
    pub fn new(sequence: u64, published_at: DateTime<Utc>, event: ChangeEvent) -> Self {
        Self {
            sequence,
            published_at,
            event,
        }
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    pub fn topic(&self) -> Topic {
        self.event.topic()
    }

    pub fn event(&self) -> &ChangeEvent {
        &self.event
    }

    pub fn into_event(self) -> ChangeEvent {
        self.event
    }
}

impl Event for ChangeEnvelope {
    fn event_type(&self) -> &'static str {
        match self.event {
            ChangeEvent::PrinterModelsChanged { .. } => "fleet.printer_models.changed",
            ChangeEvent::AssignmentsChanged { .. } => "fleet.assignments.changed",
        }
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        self.published_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use printfleet_core::UnitId;

    #[test]
    fn envelope_reports_table_level_type() {
        let env = ChangeEnvelope::new(7, Utc::now(), ChangeEvent::assignment(UnitId::new()));
        assert_eq!(env.topic(), crate::Topic::AssignmentsChanged);
        assert_eq!(env.qualified_type(), "fleet.assignments.changed@1");
    }
}
