// tests/common/mod.rs
//
// Shared stubs for integration tests: scripted fetchers, a scripted facilitator
// and a store that fails on demand.
#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::mpsc;

use crypto_markets_gateway::cache::CategoryCache;
use crypto_markets_gateway::content::{Category, MergedResult, Source};
use crypto_markets_gateway::error::{FacilitatorError, StoreError};
use crypto_markets_gateway::ingest::types::{RawArticle, RawItem, RawPost, SourceFetcher};
use crypto_markets_gateway::merge::MergeOptions;
use crypto_markets_gateway::orchestrator::{MarketOptions, MarketService};
use crypto_markets_gateway::payment::Facilitator;
use crypto_markets_gateway::persistence::{
    CategorySnapshot, DurableRecord, PersistenceQueue, SignalStore,
};

pub fn article(url: &str, title: &str, date: &str) -> RawItem {
    RawItem::Article(RawArticle {
        title: title.to_string(),
        text: String::new(),
        news_url: url.to_string(),
        date: Some(json!(date)),
        ..Default::default()
    })
}

pub fn post(id: &str, text: &str, created_at: &str) -> RawItem {
    RawItem::Post(RawPost {
        id: id.to_string(),
        text: text.to_string(),
        username: "lookonchain".to_string(),
        created_at: Some(json!(created_at)),
        ..Default::default()
    })
}

/// `n` neutral articles (categorize to trends), one minute apart.
pub fn trend_articles(n: usize) -> Vec<RawItem> {
    (0..n)
        .map(|i| {
            article(
                &format!("https://news.example/a/{i}"),
                &format!("Morning briefing number {i}"),
                &format!("2025-10-20T10:{:02}:00Z", i % 60),
            )
        })
        .collect()
}

/// `n` neutral posts (categorize to trends).
pub fn trend_posts(n: usize) -> Vec<RawItem> {
    (0..n)
        .map(|i| {
            post(
                &format!("{}", 1_000 + i),
                &format!("gm frens, update {i}"),
                &format!("2025-10-20T11:{:02}:00Z", i % 60),
            )
        })
        .collect()
}

/// Fetcher returning a fixed batch, counting calls, optionally slow or failing.
pub struct StubFetcher {
    source: Source,
    items: Mutex<Vec<RawItem>>,
    delay: Duration,
    fail: AtomicBool,
    calls: AtomicUsize,
}

impl StubFetcher {
    pub fn new(source: Source, items: Vec<RawItem>) -> Arc<Self> {
        Arc::new(Self {
            source,
            items: Mutex::new(items),
            delay: Duration::ZERO,
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn slow(source: Source, items: Vec<RawItem>, delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            source,
            items: Mutex::new(items),
            delay,
            fail: AtomicBool::new(false),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn failing(source: Source) -> Arc<Self> {
        let f = Self::new(source, vec![]);
        f.set_failing(true);
        f
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn set_items(&self, items: Vec<RawItem>) {
        *self.items.lock().unwrap() = items;
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceFetcher for StubFetcher {
    async fn fetch(&self, _category: Category) -> anyhow::Result<Vec<RawItem>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("stub upstream down");
        }
        Ok(self.items.lock().unwrap().clone())
    }

    fn source(&self) -> Source {
        self.source
    }
}

pub struct Harness {
    pub service: Arc<MarketService>,
    pub rx: mpsc::Receiver<Arc<MergedResult>>,
}

pub fn service_with(
    news: Arc<StubFetcher>,
    social: Arc<StubFetcher>,
    ttl: Duration,
    upstream_timeout: Duration,
) -> Harness {
    let (queue, rx) = PersistenceQueue::channel(64);
    let service = MarketService::new(
        news,
        social,
        Arc::new(CategoryCache::new(ttl)),
        queue,
        MarketOptions {
            upstream_timeout,
            merge: MergeOptions::default(),
        },
    );
    Harness {
        service: Arc::new(service),
        rx,
    }
}

/// Facilitator with scripted answers and call counters.
pub struct StubFacilitator {
    pub verify_answer: Mutex<Result<bool, FacilitatorError>>,
    pub settle_answer: Mutex<Result<bool, FacilitatorError>>,
    pub delay: Duration,
    pub verify_calls: AtomicUsize,
    pub settle_calls: AtomicUsize,
}

impl StubFacilitator {
    pub fn answering(verify: Result<bool, FacilitatorError>) -> Arc<Self> {
        Arc::new(Self {
            verify_answer: Mutex::new(verify),
            settle_answer: Mutex::new(Ok(true)),
            delay: Duration::ZERO,
            verify_calls: AtomicUsize::new(0),
            settle_calls: AtomicUsize::new(0),
        })
    }

    pub fn accepting() -> Arc<Self> {
        Self::answering(Ok(true))
    }

    pub fn hanging(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            verify_answer: Mutex::new(Ok(true)),
            settle_answer: Mutex::new(Ok(true)),
            delay,
            verify_calls: AtomicUsize::new(0),
            settle_calls: AtomicUsize::new(0),
        })
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn settle_calls(&self) -> usize {
        self.settle_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Facilitator for StubFacilitator {
    async fn verify(
        &self,
        _reference: &str,
        _endpoint: &str,
        _amount: f64,
    ) -> Result<bool, FacilitatorError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.verify_answer.lock().unwrap().clone()
    }

    async fn settle(&self, _reference: &str, _amount: f64) -> Result<bool, FacilitatorError> {
        self.settle_calls.fetch_add(1, Ordering::SeqCst);
        self.settle_answer.lock().unwrap().clone()
    }
}

/// Store whose writes and deletes fail for the first `failures` calls, then succeed.
#[derive(Default)]
pub struct FlakyStore {
    remaining_failures: AtomicUsize,
    pub append_calls: AtomicUsize,
    pub records: Mutex<Vec<DurableRecord>>,
    pub snapshots: Mutex<Vec<CategorySnapshot>>,
}

impl FlakyStore {
    pub fn failing_first(failures: usize) -> Arc<Self> {
        Arc::new(Self {
            remaining_failures: AtomicUsize::new(failures),
            ..Default::default()
        })
    }

    fn gate(&self) -> Result<(), StoreError> {
        let left = self.remaining_failures.load(Ordering::SeqCst);
        if left > 0 {
            self.remaining_failures.store(left - 1, Ordering::SeqCst);
            return Err(StoreError::Unavailable("stub store down".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SignalStore for FlakyStore {
    async fn append_records(&self, records: Vec<DurableRecord>) -> Result<usize, StoreError> {
        self.append_calls.fetch_add(1, Ordering::SeqCst);
        self.gate()?;
        let n = records.len();
        self.records.lock().unwrap().extend(records);
        Ok(n)
    }

    async fn records_since(
        &self,
        category: Category,
        since: DateTime<Utc>,
    ) -> Result<Vec<DurableRecord>, StoreError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.item.category == category && r.item.published_at > since)
            .cloned()
            .collect())
    }

    async fn upsert_snapshot(&self, snapshot: CategorySnapshot) -> Result<(), StoreError> {
        self.gate()?;
        let mut guard = self.snapshots.lock().unwrap();
        guard.retain(|s| s.category != snapshot.category);
        guard.push(snapshot);
        Ok(())
    }

    async fn latest_snapshot(
        &self,
        category: Category,
    ) -> Result<Option<CategorySnapshot>, StoreError> {
        Ok(self
            .snapshots
            .lock()
            .unwrap()
            .iter()
            .find(|s| s.category == category)
            .cloned())
    }

    async fn delete_records_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        self.gate()?;
        let mut guard = self.records.lock().unwrap();
        let before = guard.len();
        guard.retain(|r| r.stored_at >= cutoff);
        Ok(before - guard.len())
    }

    async fn delete_snapshots_older_than(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        self.gate()?;
        let mut guard = self.snapshots.lock().unwrap();
        let before = guard.len();
        guard.retain(|s| s.last_updated >= cutoff);
        Ok(before - guard.len())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        if self.remaining_failures.load(Ordering::SeqCst) > 0 {
            return Err(StoreError::Unavailable("stub store down".into()));
        }
        Ok(())
    }
}
