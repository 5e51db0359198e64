//! Retention sweeper: periodically deletes durable records and snapshots older
//! than the retention window. Store failures are logged and the next tick tries again.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::error::StoreError;
use crate::persistence::SignalStore;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub records: usize,
    pub snapshots: usize,
}

/// One pass. Deletes everything stored strictly before `now - window`.
pub async fn sweep_once(
    store: &dyn SignalStore,
    now: DateTime<Utc>,
    window: Duration,
) -> Result<SweepReport, StoreError> {
    let window = chrono::Duration::from_std(window)
        .map_err(|e| StoreError::Unavailable(format!("retention window out of range: {e}")))?;
    let cutoff = now - window;
    let records = store.delete_records_older_than(cutoff).await?;
    let snapshots = store.delete_snapshots_older_than(cutoff).await?;
    Ok(SweepReport { records, snapshots })
}

/// Sweep on a fixed interval, first pass immediately.
pub fn spawn_retention_sweeper(
    store: Arc<dyn SignalStore>,
    interval: Duration,
    window: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match sweep_once(store.as_ref(), Utc::now(), window).await {
                Ok(report) => {
                    counter!("retention_deleted_total")
                        .increment((report.records + report.snapshots) as u64);
                    if report.records + report.snapshots > 0 {
                        info!(
                            target: "retention",
                            records = report.records,
                            snapshots = report.snapshots,
                            "retention sweep"
                        );
                    }
                }
                Err(e) => {
                    counter!("retention_failures_total").increment(1);
                    warn!(target: "retention", error = %e, "retention sweep failed; retrying next interval");
                }
            }
        }
    })
}
