//! # Category cache
//! One slot per category, each behind its own lock, so a write for one category
//! never contends with another. Entries are swapped whole (`Arc`), so a reader
//! sees either the previous value or the new one, never a mix.
//!
//! TTL is absolute from `generated_at`; reads do not refresh it.

use std::sync::{Arc, RwLock};
use std::time::Duration;

use chrono::{DateTime, Utc};

use crate::content::{Category, MergedResult};

const CATEGORY_COUNT: usize = Category::ALL.len();

#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub value: Arc<MergedResult>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }
}

#[derive(Debug)]
pub struct CategoryCache {
    slots: [RwLock<Option<Arc<CacheEntry>>>; CATEGORY_COUNT],
    ttl: chrono::Duration,
}

impl CategoryCache {
    pub fn new(ttl: Duration) -> Self {
        let ttl = chrono::Duration::from_std(ttl).unwrap_or_else(|_| chrono::Duration::days(36_500));
        Self {
            slots: std::array::from_fn(|_| RwLock::new(None)),
            ttl,
        }
    }

    pub fn ttl(&self) -> chrono::Duration {
        self.ttl
    }

    /// Current entry for `category`, fresh or not.
    pub fn get(&self, category: Category) -> Option<Arc<CacheEntry>> {
        let slot = &self.slots[category.index()];
        let guard = slot.read().unwrap_or_else(|p| p.into_inner());
        guard.clone()
    }

    /// Cached value if it has not expired at `now`.
    pub fn get_fresh(&self, category: Category, now: DateTime<Utc>) -> Option<Arc<MergedResult>> {
        self.get(category)
            .filter(|e| e.is_fresh(now))
            .map(|e| Arc::clone(&e.value))
    }

    /// Replace the entry for the result's category. Expiry is `generated_at + ttl`.
    pub fn put(&self, value: Arc<MergedResult>) -> Arc<CacheEntry> {
        let expires_at = value
            .generated_at
            .checked_add_signed(self.ttl)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        let entry = Arc::new(CacheEntry { value, expires_at });
        let slot = &self.slots[entry.value.category.index()];
        let mut guard = slot.write().unwrap_or_else(|p| p.into_inner());
        *guard = Some(Arc::clone(&entry));
        entry
    }
}
