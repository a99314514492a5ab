use chrono::{DateTime, Utc};

/// Something that happened in the fleet: a lifecycle step of one unit or a
/// table-level change notice.
pub trait Event: Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Dotted name, `fleet.<subject>.<verb>`.
    fn event_type(&self) -> &'static str;

    /// Payload version; bump when a variant's fields change.
    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc>;

    /// `event_type@version`, as written to logs.
    fn qualified_type(&self) -> String {
        format!("{}@{}", self.event_type(), self.version())
    }
}
