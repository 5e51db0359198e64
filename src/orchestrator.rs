//! # Cache-aside orchestrator
//! Serves a category from the cache while the entry is fresh. On a miss it
//! fetches both sources concurrently (each bounded by the upstream timeout),
//! normalizes and merges what came back, fills the cache and hands the result
//! to the persistence queue.
//!
//! Concurrent misses for one category share a single fetch cycle. The cycle
//! runs in its own task and publishes its outcome on a watch channel; every
//! caller, including the one that opened the flight, only waits on it. A caller
//! that goes away never releases the flight, only the cycle task does.
//! Different categories never wait on each other.
//!
//! When every source fails the cycle errors out and the cache is left as it was.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::Utc;
use metrics::{counter, histogram};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::cache::CategoryCache;
use crate::content::{Category, MergedResult, Source};
use crate::error::{FetchFailure, MarketError};
use crate::ingest::normalize::normalize_all;
use crate::ingest::types::{RawItem, SourceFetcher};
use crate::merge::{merge, MergeOptions};
use crate::persistence::PersistenceQueue;

/// Cycle result plus whether upstream was actually called.
type Outcome = Result<(Arc<MergedResult>, bool), MarketError>;
/// `None` until the cycle task publishes.
type Flight = watch::Receiver<Option<Outcome>>;

/// How a served result was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// Fresh cache entry, no upstream call.
    Hit,
    /// This caller opened the flight that fetched.
    Miss,
    /// This caller joined a flight opened by another request.
    Shared,
}

impl CacheStatus {
    pub fn header_value(self) -> &'static str {
        match self {
            CacheStatus::Hit => "HIT",
            CacheStatus::Miss | CacheStatus::Shared => "MISS",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Served {
    pub result: Arc<MergedResult>,
    pub cache: CacheStatus,
}

#[derive(Debug, Clone, Copy)]
pub struct MarketOptions {
    pub upstream_timeout: Duration,
    pub merge: MergeOptions,
}

impl Default for MarketOptions {
    fn default() -> Self {
        Self {
            upstream_timeout: Duration::from_secs(10),
            merge: MergeOptions::default(),
        }
    }
}

pub struct MarketService {
    inner: Arc<Inner>,
}

struct Inner {
    news: Arc<dyn SourceFetcher>,
    social: Arc<dyn SourceFetcher>,
    cache: Arc<CategoryCache>,
    queue: PersistenceQueue,
    opts: MarketOptions,
    in_flight: [Mutex<Option<Flight>>; Category::ALL.len()],
}

/// Owned by the cycle task. Clears the category's flight slot when the task
/// finishes or unwinds, unless a newer flight has already replaced it.
struct FlightGuard {
    inner: Arc<Inner>,
    category: Category,
    flight: Flight,
}

impl Drop for FlightGuard {
    fn drop(&mut self) {
        let slot = &self.inner.in_flight[self.category.index()];
        let mut guard = slot.lock().unwrap_or_else(|p| p.into_inner());
        if guard.as_ref().is_some_and(|f| f.same_channel(&self.flight)) {
            *guard = None;
        }
    }
}

impl MarketService {
    pub fn new(
        news: Arc<dyn SourceFetcher>,
        social: Arc<dyn SourceFetcher>,
        cache: Arc<CategoryCache>,
        queue: PersistenceQueue,
        opts: MarketOptions,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                news,
                social,
                cache,
                queue,
                opts,
                in_flight: std::array::from_fn(|_| Mutex::new(None)),
            }),
        }
    }

    pub fn cache(&self) -> &CategoryCache {
        &self.inner.cache
    }

    pub fn queue(&self) -> &PersistenceQueue {
        &self.inner.queue
    }

    pub async fn get_category(&self, category: Category) -> Result<Served, MarketError> {
        if let Some(result) = self.inner.cache.get_fresh(category, Utc::now()) {
            counter!("markets_cache_hits_total").increment(1);
            debug!(target: "markets", %category, "cache hit");
            return Ok(Served {
                result,
                cache: CacheStatus::Hit,
            });
        }
        counter!("markets_cache_misses_total").increment(1);

        let (mut flight, opened) = self.join_or_open(category);

        let outcome = match flight.wait_for(Option::is_some).await {
            Ok(published) => (*published)
                .clone()
                .unwrap_or(Err(MarketError::AllSourcesUnavailable)),
            // cycle task died before publishing
            Err(_) => Err(MarketError::AllSourcesUnavailable),
        };

        outcome.map(|(result, fetched)| {
            let cache = match (fetched, opened) {
                (false, _) => CacheStatus::Hit,
                (true, true) => CacheStatus::Miss,
                (true, false) => CacheStatus::Shared,
            };
            Served { result, cache }
        })
    }

    /// Returns the category's current flight, spawning a cycle task when there
    /// is none. The bool is true when this call opened the flight.
    fn join_or_open(&self, category: Category) -> (Flight, bool) {
        let slot = &self.inner.in_flight[category.index()];
        let mut current = slot.lock().unwrap_or_else(|p| p.into_inner());
        if let Some(existing) = current.as_ref() {
            return (existing.clone(), false);
        }

        let (tx, rx) = watch::channel(None);
        *current = Some(rx.clone());
        let guard = FlightGuard {
            inner: Arc::clone(&self.inner),
            category,
            flight: rx.clone(),
        };
        tokio::spawn(async move {
            let outcome = guard.inner.run_cycle(category).await;
            drop(guard);
            if tx.send(Some(outcome)).is_err() {
                debug!(target: "markets", %category, "fetch cycle finished with no waiters");
            }
        });
        (rx, true)
    }
}

impl Inner {
    async fn run_cycle(&self, category: Category) -> Outcome {
        // A flight that closed just before ours may already have filled the slot.
        let started = Utc::now();
        if let Some(result) = self.cache.get_fresh(category, started) {
            return Ok((result, false));
        }
        counter!("markets_fetch_cycles_total").increment(1);
        let t0 = Instant::now();

        let (news, social) = tokio::join!(
            self.fetch_source(self.news.as_ref(), category),
            self.fetch_source(self.social.as_ref(), category),
        );

        let mut batches = Vec::with_capacity(2);
        let mut degraded: Vec<Source> = Vec::new();
        for fetched in [news, social] {
            match fetched {
                Ok(raw) => batches.push(normalize_all(raw, started)),
                Err(failure) => degraded.push(failure.provider()),
            }
        }

        if batches.is_empty() {
            counter!("markets_all_sources_unavailable_total").increment(1);
            warn!(target: "markets", %category, "all sources unavailable; cache left untouched");
            return Err(MarketError::AllSourcesUnavailable);
        }

        let merged = Arc::new(merge(
            category,
            batches,
            degraded,
            Utc::now(),
            self.opts.merge,
        ));
        self.cache.put(Arc::clone(&merged));

        let ms = t0.elapsed().as_secs_f64() * 1_000.0;
        histogram!("markets_fetch_cycle_ms").record(ms);
        info!(
            target: "markets",
            %category,
            news = merged.source_counts.news,
            tweets = merged.source_counts.tweets,
            degraded = ?merged.degraded_sources,
            ms,
            "fetch cycle complete"
        );

        if !merged.items.is_empty() {
            if let Err(e) = self.queue.enqueue(Arc::clone(&merged)) {
                warn!(target: "persistence", %category, error = %e, "persistence enqueue failed");
            }
        }

        Ok((merged, true))
    }

    async fn fetch_source(
        &self,
        fetcher: &dyn SourceFetcher,
        category: Category,
    ) -> Result<Vec<RawItem>, FetchFailure> {
        let provider = fetcher.source();
        let failure = match tokio::time::timeout(self.opts.upstream_timeout, fetcher.fetch(category))
            .await
        {
            Ok(Ok(items)) => return Ok(items),
            Ok(Err(e)) => FetchFailure::UpstreamError {
                provider,
                message: format!("{e:#}"),
            },
            Err(_) => FetchFailure::UpstreamTimeout { provider },
        };
        counter!("markets_upstream_failures_total", "source" => provider.as_str()).increment(1);
        warn!(target: "markets", %category, %provider, error = %failure, "source degraded");
        Err(failure)
    }
}
