// src/ingest/types.rs
use anyhow::Result;
use serde::Deserialize;
use serde_json::Value;

use crate::content::{Category, Source};

/// News article as returned by the news provider (`data[]` entries).
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RawArticle {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub news_url: String,
    /// RFC 2822 string in practice, but unix numbers and ISO strings show up too.
    #[serde(default)]
    pub date: Option<Value>,
    pub source_name: Option<String>,
    pub image_url: Option<String>,
    pub sentiment: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct RawPublicMetrics {
    #[serde(default)]
    pub retweet_count: u64,
    #[serde(default)]
    pub like_count: u64,
    #[serde(default)]
    pub reply_count: u64,
    #[serde(default)]
    pub quote_count: u64,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct RawUser {
    #[serde(default)]
    pub username: String,
}

/// Social post as returned by the social provider.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RawPost {
    #[serde(default, deserialize_with = "id_as_string")]
    pub id: String,
    #[serde(default)]
    pub text: String,
    pub author_id: Option<String>,
    #[serde(default)]
    pub username: String,
    pub user: Option<RawUser>,
    /// ISO 8601 in practice; unix seconds/millis tolerated.
    #[serde(default)]
    pub created_at: Option<Value>,
    #[serde(default)]
    pub public_metrics: RawPublicMetrics,
}

impl RawPost {
    pub fn handle(&self) -> &str {
        if !self.username.is_empty() {
            return &self.username;
        }
        self.user.as_ref().map(|u| u.username.as_str()).unwrap_or("")
    }
}

fn id_as_string<'de, D>(de: D) -> std::result::Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match Value::deserialize(de)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// Raw, source-tagged upstream item before normalization.
#[derive(Debug, Clone, PartialEq)]
pub enum RawItem {
    Article(RawArticle),
    Post(RawPost),
}

/// One upstream content capability. Implementations must be cheap to share across tasks.
#[async_trait::async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, category: Category) -> Result<Vec<RawItem>>;
    fn source(&self) -> Source;
}
