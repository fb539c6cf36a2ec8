//! Counter Reconciliation Background Job
//!
//! Periodically recomputes each story's like and comment counters from the
//! underlying rows and repairs any drift. Under normal operation nothing
//! drifts; a repair means some write bypassed the repository.

use crate::services::EngagementCoordinator;
use std::time::Duration;
use tokio::time::sleep;

/// Configuration for counter reconciliation
#[derive(Clone)]
pub struct ReconcileConfig {
    pub enabled: bool,
    pub interval: Duration,
    /// Delay before the first pass, so startup traffic is not competing for locks
    pub initial_delay: Duration,
}

impl ReconcileConfig {
    /// An interval of zero disables the job
    pub fn from_interval_secs(secs: u64) -> Self {
        Self {
            enabled: secs > 0,
            interval: Duration::from_secs(secs),
            initial_delay: Duration::from_secs(30),
        }
    }
}

/// Start the reconciliation background job
pub async fn start_reconcile_job(engagement: EngagementCoordinator, config: ReconcileConfig) {
    if !config.enabled {
        tracing::info!("Counter reconciliation disabled by configuration");
        return;
    }

    tracing::info!(
        interval_secs = config.interval.as_secs(),
        "Starting counter reconciliation background job"
    );

    sleep(config.initial_delay).await;

    loop {
        match engagement.reconcile_counters().await {
            Ok(drift) if drift.is_empty() => {
                tracing::debug!("Counter reconciliation: no drift");
            }
            Ok(drift) => {
                tracing::warn!(
                    repaired = drift.len(),
                    "Counter reconciliation repaired drifted stories"
                );
            }
            Err(e) => {
                tracing::error!(error = %e, "Counter reconciliation failed");
            }
        }

        sleep(config.interval).await;
    }
}
