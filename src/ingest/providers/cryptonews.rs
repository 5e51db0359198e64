// src/ingest/providers/cryptonews.rs
//! News provider. `trends` reads the category (trending) listing, every other
//! category reads the latest feed; the categorizer sorts articles out afterwards.

use std::time::{Duration, Instant};

use anyhow::Result;
use async_trait::async_trait;
use metrics::{counter, histogram};
use reqwest::Client;

use crate::content::{Category, Source};
use crate::ingest::types::{RawArticle, RawItem, SourceFetcher};

use super::get_envelope;

#[derive(Clone)]
pub struct CryptoNewsProvider {
    base_url: String,
    token: String,
    limit: u32,
    client: Client,
    max_attempts: u8,
    retry_delay: Duration,
}

impl CryptoNewsProvider {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>, limit: u32) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
            limit,
            client: Client::new(),
            max_attempts: 3,
            retry_delay: Duration::from_millis(500),
        }
    }

    pub fn with_retries(mut self, attempts: u8, base_delay: Duration) -> Self {
        self.max_attempts = attempts.max(1);
        self.retry_delay = base_delay;
        self
    }

    fn request(&self, category: Category) -> reqwest::RequestBuilder {
        let items = self.limit.to_string();
        match category {
            Category::Trends => self.client.get(format!("{}/category", self.base_url)).query(&[
                ("token", self.token.as_str()),
                ("items", items.as_str()),
                ("page", "1"),
            ]),
            _ => self
                .client
                .get(format!("{}/latest", self.base_url))
                .query(&[("token", self.token.as_str()), ("items", items.as_str())]),
        }
    }
}

#[async_trait]
impl SourceFetcher for CryptoNewsProvider {
    async fn fetch(&self, category: Category) -> Result<Vec<RawItem>> {
        crate::ingest::ensure_metrics_described();
        let t0 = Instant::now();
        let articles: Vec<RawArticle> = get_envelope(
            self.request(category),
            "cryptonews",
            self.max_attempts,
            self.retry_delay,
        )
        .await?;

        histogram!("ingest_fetch_ms", "provider" => "cryptonews")
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
        counter!("ingest_items_total", "provider" => "cryptonews").increment(articles.len() as u64);
        tracing::debug!(target: "ingest", %category, n = articles.len(), "cryptonews fetched");
        Ok(articles.into_iter().map(RawItem::Article).collect())
    }

    fn source(&self) -> Source {
        Source::CryptoNews
    }
}
