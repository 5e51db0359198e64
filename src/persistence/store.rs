// src/persistence/store.rs
//! Durable store capability and an in-process implementation.
//!
//! Three relations: signal records (one row per stored item), category snapshots
//! (one row per category, latest item list as a JSON blob) and payment
//! transactions (one row per reference, see [`crate::payment::PaymentLedger`]).

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;

use crate::content::{Category, ContentItem};
use crate::error::StoreError;
use crate::merge::item_order;
use crate::payment::{PaymentLedger, PaymentRecord};

/// A content item as persisted by the queue consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DurableRecord {
    pub item: ContentItem,
    pub stored_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategorySnapshot {
    pub category: Category,
    pub items: serde_json::Value,
    pub item_count: usize,
    pub last_updated: DateTime<Utc>,
}

#[async_trait]
pub trait SignalStore: Send + Sync {
    /// Append records as one unit; returns how many were written.
    async fn append_records(&self, records: Vec<DurableRecord>) -> Result<usize, StoreError>;

    /// Raw records of `category` published after `since`, duplicates included.
    async fn records_since(
        &self,
        category: Category,
        since: DateTime<Utc>,
    ) -> Result<Vec<DurableRecord>, StoreError>;

    /// Replace the snapshot row for the snapshot's category.
    async fn upsert_snapshot(&self, snapshot: CategorySnapshot) -> Result<(), StoreError>;

    async fn latest_snapshot(
        &self,
        category: Category,
    ) -> Result<Option<CategorySnapshot>, StoreError>;

    /// Delete records with `stored_at < cutoff`.
    async fn delete_records_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    /// Delete snapshots with `last_updated < cutoff`.
    async fn delete_snapshots_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Items of `category` published after `since`, one per identity key (most
/// recently stored copy wins), in result order.
pub async fn items_since(
    store: &dyn SignalStore,
    category: Category,
    since: DateTime<Utc>,
) -> Result<Vec<ContentItem>, StoreError> {
    let records = store.records_since(category, since).await?;
    let mut latest: HashMap<String, DurableRecord> = HashMap::new();
    for rec in records {
        match latest.get(&rec.item.identity_key) {
            Some(prev) if prev.stored_at >= rec.stored_at => {}
            _ => {
                latest.insert(rec.item.identity_key.clone(), rec);
            }
        }
    }
    let mut items: Vec<ContentItem> = latest.into_values().map(|r| r.item).collect();
    items.sort_by(item_order);
    Ok(items)
}

/// In-process store. Each relation sits behind its own lock.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: RwLock<Vec<DurableRecord>>,
    snapshots: RwLock<HashMap<Category, CategorySnapshot>>,
    payments: RwLock<HashMap<String, PaymentRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn record_count(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn all_records(&self) -> Vec<DurableRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl SignalStore for MemoryStore {
    async fn append_records(&self, records: Vec<DurableRecord>) -> Result<usize, StoreError> {
        let n = records.len();
        self.records.write().await.extend(records);
        Ok(n)
    }

    async fn records_since(
        &self,
        category: Category,
        since: DateTime<Utc>,
    ) -> Result<Vec<DurableRecord>, StoreError> {
        let guard = self.records.read().await;
        Ok(guard
            .iter()
            .filter(|r| r.item.category == category && r.item.published_at > since)
            .cloned()
            .collect())
    }

    async fn upsert_snapshot(&self, snapshot: CategorySnapshot) -> Result<(), StoreError> {
        self.snapshots
            .write()
            .await
            .insert(snapshot.category, snapshot);
        Ok(())
    }

    async fn latest_snapshot(
        &self,
        category: Category,
    ) -> Result<Option<CategorySnapshot>, StoreError> {
        Ok(self.snapshots.read().await.get(&category).cloned())
    }

    async fn delete_records_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut guard = self.records.write().await;
        let before = guard.len();
        guard.retain(|r| r.stored_at >= cutoff);
        Ok(before - guard.len())
    }

    async fn delete_snapshots_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut guard = self.snapshots.write().await;
        let before = guard.len();
        guard.retain(|_, s| s.last_updated >= cutoff);
        Ok(before - guard.len())
    }
}

#[async_trait]
impl PaymentLedger for MemoryStore {
    async fn record_attempt(
        &self,
        reference: &str,
        endpoint: &str,
        amount: f64,
        now: DateTime<Utc>,
    ) -> Result<PaymentRecord, StoreError> {
        let mut guard = self.payments.write().await;
        let rec = guard
            .entry(reference.to_string())
            .or_insert_with(|| PaymentRecord::new(reference, endpoint, amount, now));
        rec.attempts = rec.attempts.saturating_add(1);
        rec.last_attempt_at = now;
        Ok(rec.clone())
    }

    async fn mark_verified(
        &self,
        reference: &str,
        at: DateTime<Utc>,
    ) -> Result<PaymentRecord, StoreError> {
        let mut guard = self.payments.write().await;
        let rec = guard
            .get_mut(reference)
            .ok_or_else(|| StoreError::Unavailable(format!("no payment row for {reference}")))?;
        rec.mark_verified(at);
        Ok(rec.clone())
    }

    async fn mark_settled(
        &self,
        reference: &str,
        at: DateTime<Utc>,
    ) -> Result<PaymentRecord, StoreError> {
        let mut guard = self.payments.write().await;
        let rec = guard
            .get_mut(reference)
            .ok_or_else(|| StoreError::Unavailable(format!("no payment row for {reference}")))?;
        rec.mark_settled(at);
        Ok(rec.clone())
    }

    async fn find(&self, reference: &str) -> Result<Option<PaymentRecord>, StoreError> {
        Ok(self.payments.read().await.get(reference).cloned())
    }
}
