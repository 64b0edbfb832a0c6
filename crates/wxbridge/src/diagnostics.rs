//! Diagnostics export for bug reports.

use chrono::DateTime;
use chrono::Utc;
use serde::Serialize;

use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::coordinator::CoordinatorStatus;
use crate::weather::WeatherSnapshot;

/// Everything needed to debug a running bridge. The API key only ever appears masked.
#[derive(Debug, Clone, Serialize)]
pub struct DiagnosticsReport {
    pub generated_at: DateTime<Utc>,
    pub version: &'static str,
    pub config: Config,
    pub coordinator: CoordinatorStatus,
    pub snapshot: Option<WeatherSnapshot>,
}

pub fn export(config: &Config, coordinator: &Coordinator) -> DiagnosticsReport {
    DiagnosticsReport {
        generated_at: Utc::now(),
        version: env!("CARGO_PKG_VERSION"),
        config: config.clone(),
        coordinator: coordinator.status(),
        snapshot: coordinator.current_snapshot().as_deref().cloned(),
    }
}
