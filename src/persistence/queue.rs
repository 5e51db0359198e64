// src/persistence/queue.rs
//! Bounded hand-off between the request path and durable storage.
//!
//! `enqueue` never blocks: a full queue is an error the caller logs and drops.
//! Workers drain the channel and write each result as records plus a category
//! snapshot, retrying a failed write a few times before giving up.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use metrics::counter;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use crate::content::MergedResult;
use crate::error::{EnqueueError, StoreError};

use super::store::{CategorySnapshot, DurableRecord, SignalStore};

#[derive(Debug, Clone)]
pub struct PersistenceQueue {
    tx: mpsc::Sender<Arc<MergedResult>>,
}

impl PersistenceQueue {
    /// Queue plus the receiving end for [`spawn_workers`].
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<Arc<MergedResult>>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    pub fn enqueue(&self, result: Arc<MergedResult>) -> Result<(), EnqueueError> {
        match self.tx.try_send(result) {
            Ok(()) => {
                counter!("persistence_enqueued_total").increment(1);
                Ok(())
            }
            Err(e) => {
                counter!("persistence_enqueue_failed_total").increment(1);
                Err(match e {
                    mpsc::error::TrySendError::Full(_) => EnqueueError::QueueFull,
                    mpsc::error::TrySendError::Closed(_) => EnqueueError::QueueClosed,
                })
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u8,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
        }
    }
}

/// Start `workers` consumers sharing one receiver. They exit once every sender is dropped.
pub fn spawn_workers(
    rx: mpsc::Receiver<Arc<MergedResult>>,
    store: Arc<dyn SignalStore>,
    workers: usize,
    retry: RetryPolicy,
) -> Vec<JoinHandle<()>> {
    let rx = Arc::new(Mutex::new(rx));
    (0..workers.max(1))
        .map(|worker| {
            let rx = Arc::clone(&rx);
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                loop {
                    let next = { rx.lock().await.recv().await };
                    let Some(result) = next else { break };
                    if let Err(e) = persist_result(store.as_ref(), &result, retry).await {
                        error!(
                            target: "persistence",
                            worker,
                            category = %result.category,
                            error = %e,
                            "dropping result after retries"
                        );
                    }
                }
                debug!(target: "persistence", worker, "persistence worker stopped");
            })
        })
        .collect()
}

/// Write one merged result: its items as records, then the category snapshot.
///
/// Records and snapshot are retried independently, so a retry never appends
/// the same batch twice after the records already went through.
pub async fn persist_result(
    store: &dyn SignalStore,
    result: &MergedResult,
    retry: RetryPolicy,
) -> Result<usize, StoreError> {
    let stored_at = Utc::now();
    let records: Vec<DurableRecord> = result
        .items
        .iter()
        .cloned()
        .map(|item| DurableRecord { item, stored_at })
        .collect();

    let written = with_retry(retry, "append_records", || {
        store.append_records(records.clone())
    })
    .await?;
    counter!("persistence_records_written_total").increment(written as u64);

    let items = serde_json::to_value(&result.items)
        .map_err(|e| StoreError::Unavailable(format!("snapshot encode: {e}")))?;
    let snapshot = CategorySnapshot {
        category: result.category,
        items,
        item_count: result.items.len(),
        last_updated: stored_at,
    };
    with_retry(retry, "upsert_snapshot", || {
        store.upsert_snapshot(snapshot.clone())
    })
    .await?;

    debug!(target: "persistence", category = %result.category, written, "result persisted");
    Ok(written)
}

async fn with_retry<T, F, Fut>(retry: RetryPolicy, op: &'static str, mut f: F) -> Result<T, StoreError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, StoreError>>,
{
    let mut attempt: u8 = 0;
    loop {
        attempt += 1;
        match f().await {
            Ok(v) => return Ok(v),
            Err(e) if attempt < retry.max_attempts => {
                warn!(target: "persistence", op, attempt, error = %e, "store write failed, retrying");
                tokio::time::sleep(crate::backoff_delay(retry.base_delay, attempt)).await;
            }
            Err(e) => return Err(e),
        }
    }
}
