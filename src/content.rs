//! # Content model
//! Canonical shapes shared by the normalizer, merger, cache and persistence layers.
//!
//! Every item carries the common normalized subset (source, category, publish time,
//! identity key) plus a source-specific [`Payload`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Upstream content provider an item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Source {
    /// News articles (provider A).
    #[serde(rename = "cryptonews")]
    CryptoNews,
    /// Social posts from monitored accounts (provider B).
    #[serde(rename = "twitter")]
    X,
}

impl Source {
    pub const ALL: [Source; 2] = [Source::CryptoNews, Source::X];

    pub fn as_str(self) -> &'static str {
        match self {
            Source::CryptoNews => "cryptonews",
            Source::X => "twitter",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fixed market taxonomy served under `/markets/{category}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Trends,
    Liquidity,
    Agents,
    MacroEvents,
    ProofOfWork,
}

impl Category {
    /// Declaration order doubles as the categorizer's tie-break order.
    pub const ALL: [Category; 5] = [
        Category::Trends,
        Category::Liquidity,
        Category::Agents,
        Category::MacroEvents,
        Category::ProofOfWork,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Trends => "trends",
            Category::Liquidity => "liquidity",
            Category::Agents => "agents",
            Category::MacroEvents => "macro_events",
            Category::ProofOfWork => "proof_of_work",
        }
    }

    /// Dense index into per-category slot arrays.
    pub fn index(self) -> usize {
        self as usize
    }

    /// Endpoint identifier used for payment binding, e.g. `/markets/trends`.
    pub fn endpoint(self) -> String {
        format!("/markets/{}", self.as_str())
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = crate::error::MarketError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| crate::error::MarketError::UnknownCategory(s.to_string()))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Engagement {
    pub likes: u64,
    pub retweets: u64,
    pub replies: u64,
    pub quotes: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ArticlePayload {
    pub url: String,
    pub title: String,
    pub content: String,
    pub source_name: Option<String>,
    pub sentiment: Option<String>,
    pub image_url: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PostPayload {
    pub post_id: String,
    pub url: String,
    pub text: String,
    pub username: String,
    pub author_id: Option<String>,
    pub engagement: Engagement,
}

/// Source-specific fields; the serde tag is the wire `source` value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source")]
pub enum Payload {
    #[serde(rename = "cryptonews")]
    Article(ArticlePayload),
    #[serde(rename = "twitter")]
    Post(PostPayload),
}

impl Payload {
    pub fn source(&self) -> Source {
        match self {
            Payload::Article(_) => Source::CryptoNews,
            Payload::Post(_) => Source::X,
        }
    }

    /// Free text used for categorization.
    pub fn searchable_text(&self) -> String {
        match self {
            Payload::Article(a) => format!("{} {}", a.title, a.content),
            Payload::Post(p) => p.text.clone(),
        }
    }
}

/// One normalized content item.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ContentItem {
    pub category: Category,
    pub published_at: DateTime<Utc>,
    pub identity_key: String,
    #[serde(flatten)]
    pub payload: Payload,
}

impl ContentItem {
    pub fn source(&self) -> Source {
        self.payload.source()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SourceCounts {
    pub news: usize,
    pub tweets: usize,
}

impl SourceCounts {
    pub fn record(&mut self, source: Source) {
        match source {
            Source::CryptoNews => self.news += 1,
            Source::X => self.tweets += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.news + self.tweets
    }
}

/// Output of one fetch-merge cycle. Immutable once built; shared behind `Arc`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergedResult {
    pub category: Category,
    /// Descending `published_at`, ties by ascending `identity_key`.
    pub items: Vec<ContentItem>,
    pub generated_at: DateTime<Utc>,
    pub source_counts: SourceCounts,
    /// Sources that timed out or errored during the cycle.
    pub degraded_sources: Vec<Source>,
}

impl MergedResult {
    pub fn total_items(&self) -> usize {
        self.items.len()
    }
}
