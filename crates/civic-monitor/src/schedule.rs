//! Hourly schedule for the SLA monitor, aligned to the top of the hour.

use crate::{MonitorError, SlaMonitor};
use chrono::{DateTime, Duration, DurationRound, Utc};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// First top of the hour strictly after `now`.
pub fn next_top_of_hour(now: DateTime<Utc>) -> DateTime<Utc> {
    let hour = Duration::hours(1);
    match now.duration_trunc(hour) {
        Ok(floor) => floor + hour,
        Err(_) => now + hour,
    }
}

/// Running monitor task. Dropping the handle also stops the loop.
pub struct MonitorHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub async fn shutdown(self) {
        tracing::info!("stopping SLA monitor");
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

/// Start the hourly sweep loop. A failed sweep is logged and retried at the next tick.
pub fn spawn(monitor: Arc<SlaMonitor>) -> MonitorHandle {
    let (stop, mut stop_rx) = watch::channel(false);
    tracing::info!("starting SLA monitor");
    let task = tokio::spawn(async move {
        loop {
            let now = monitor.clock().now();
            let next = next_top_of_hour(now);
            let wait = (next - now).to_std().unwrap_or_default();
            tracing::debug!(next_run = %next, "SLA monitor sleeping");
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = stop_rx.changed() => break,
            }
            match monitor.run_once().await {
                Ok(report) if !report.deferred.is_empty() => tracing::warn!(
                    flagged = report.flagged.len(),
                    deferred = report.deferred.len(),
                    ran_at = %report.ran_at,
                    "SLA sweep completed with deferred breaches, retrying next run"
                ),
                Ok(report) => tracing::info!(
                    flagged = report.flagged.len(),
                    ran_at = %report.ran_at,
                    "SLA sweep completed"
                ),
                Err(MonitorError::Busy) => {
                    tracing::warn!("SLA sweep skipped, previous run still in flight")
                }
                Err(e) => tracing::error!(error = %e, "SLA sweep failed"),
            }
        }
    });
    MonitorHandle { stop, task }
}
