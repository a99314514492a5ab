//! Tracing/logging setup shared by the fleet binaries.

/// Initialize process-wide observability with the default settings.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Tracing configuration (filters, layers).
pub mod tracing;

pub use tracing::{LogFormat, TracingConfig};
