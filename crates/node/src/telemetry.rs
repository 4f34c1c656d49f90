//! Telemetry initialization.

use crate::config::TelemetrySection;
use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber.
///
/// `RUST_LOG` overrides the configured filter. Safe to call more than once;
/// later calls are no-ops (the first subscriber wins), which keeps
/// multi-node tests from fighting over the global.
pub fn init_telemetry(config: &TelemetrySection) {
    if !config.enabled {
        return;
    }
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_filter.clone()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
