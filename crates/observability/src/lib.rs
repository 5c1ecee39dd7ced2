//! Process-wide logging setup shared by the binaries.

/// Subscriber configuration (filters, output format).
pub mod tracing;

pub use crate::tracing::{init_with, LogFormat, ObservabilityConfig};

/// Initialize logging from the environment.
///
/// Safe to call multiple times; subsequent calls are no-ops.
pub fn init() {
    init_with(&ObservabilityConfig::from_env());
}
