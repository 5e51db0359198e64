// src/ingest/normalize.rs
//! Maps heterogeneous upstream items into the canonical shape: one UTC timestamp,
//! one identity key, cleaned text, and a typed payload.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};
use time::{format_description::well_known::Rfc2822, OffsetDateTime};

use crate::content::{ArticlePayload, Engagement, Payload, PostPayload};
use crate::ingest::normalize_text;
use crate::ingest::types::{RawArticle, RawItem, RawPost};

/// Article bodies are cut to this many characters.
pub const ARTICLE_CONTENT_MAX_CHARS: usize = 500;
const TEXT_MAX_CHARS: usize = 1500;

/// Normalized item, not yet categorized.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedItem {
    pub published_at: DateTime<Utc>,
    pub identity_key: String,
    pub payload: Payload,
}

/// Normalize one raw item. Items without any usable text are dropped.
///
/// `fetched_at` stands in for timestamps that cannot be parsed so that ordering
/// stays deterministic within a cycle.
pub fn normalize_item(raw: RawItem, fetched_at: DateTime<Utc>) -> Option<NormalizedItem> {
    match raw {
        RawItem::Article(a) => normalize_article(a, fetched_at),
        RawItem::Post(p) => normalize_post(p, fetched_at),
    }
}

pub fn normalize_all(raw: Vec<RawItem>, fetched_at: DateTime<Utc>) -> Vec<NormalizedItem> {
    raw.into_iter()
        .filter_map(|r| normalize_item(r, fetched_at))
        .collect()
}

fn normalize_article(a: RawArticle, fetched_at: DateTime<Utc>) -> Option<NormalizedItem> {
    let title = normalize_text(&a.title, TEXT_MAX_CHARS);
    let content = normalize_text(&a.text, ARTICLE_CONTENT_MAX_CHARS);
    if title.is_empty() && content.is_empty() {
        return None;
    }
    let url = a.news_url.trim().to_string();
    let identity_key = if url.is_empty() {
        format!("article:{}", short_digest(&title))
    } else {
        url.clone()
    };

    Some(NormalizedItem {
        published_at: parse_timestamp(a.date.as_ref(), fetched_at),
        identity_key,
        payload: Payload::Article(ArticlePayload {
            url,
            title,
            content,
            source_name: non_empty(a.source_name),
            sentiment: non_empty(a.sentiment),
            image_url: non_empty(a.image_url),
            topics: a.topics,
        }),
    })
}

fn normalize_post(p: RawPost, fetched_at: DateTime<Utc>) -> Option<NormalizedItem> {
    let text = normalize_text(&p.text, TEXT_MAX_CHARS);
    if text.is_empty() {
        return None;
    }
    let username = p.handle().to_string();
    let post_id = p.id.trim().to_string();
    let identity_key = if post_id.is_empty() {
        format!("post:{}", short_digest(&text))
    } else {
        post_id.clone()
    };
    let url = if username.is_empty() || post_id.is_empty() {
        String::new()
    } else {
        format!("https://twitter.com/{username}/status/{post_id}")
    };

    Some(NormalizedItem {
        published_at: parse_timestamp(p.created_at.as_ref(), fetched_at),
        identity_key,
        payload: Payload::Post(PostPayload {
            post_id,
            url,
            text,
            username,
            author_id: non_empty(p.author_id),
            engagement: Engagement {
                likes: p.public_metrics.like_count,
                retweets: p.public_metrics.retweet_count,
                replies: p.public_metrics.reply_count,
                quotes: p.public_metrics.quote_count,
            },
        }),
    })
}

/// Parse any timestamp shape the providers emit into UTC.
///
/// Accepted: unix seconds or milliseconds (number or numeric string), RFC 3339,
/// RFC 2822, `YYYY-MM-DD HH:MM:SS` (assumed UTC) and the legacy social format
/// `Wed Oct 10 20:19:24 +0000 2018`. Anything else yields `fallback`.
pub fn parse_timestamp(value: Option<&Value>, fallback: DateTime<Utc>) -> DateTime<Utc> {
    let parsed = match value {
        Some(Value::Number(n)) => n.as_f64().and_then(from_unix_number),
        Some(Value::String(s)) => parse_timestamp_str(s.trim()),
        _ => None,
    };
    match parsed {
        Some(ts) => ts,
        None => {
            if value.is_some_and(|v| !v.is_null()) {
                tracing::debug!(target: "ingest", raw = ?value, "unparseable timestamp, using fetch time");
            }
            fallback
        }
    }
}

fn parse_timestamp_str(s: &str) -> Option<DateTime<Utc>> {
    if s.is_empty() {
        return None;
    }
    if let Ok(n) = s.parse::<f64>() {
        return from_unix_number(n);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = OffsetDateTime::parse(s, &Rfc2822) {
        return Utc.timestamp_opt(dt.unix_timestamp(), dt.nanosecond()).single();
    }
    for fmt in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    DateTime::parse_from_str(s, "%a %b %d %H:%M:%S %z %Y")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn from_unix_number(n: f64) -> Option<DateTime<Utc>> {
    if !n.is_finite() || n < 0.0 {
        return None;
    }
    // Anything past year ~33658 in seconds is really milliseconds.
    let millis = if n > 1e12 { n } else { n * 1000.0 };
    Utc.timestamp_millis_opt(millis as i64).single()
}

fn non_empty(v: Option<String>) -> Option<String> {
    v.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

fn short_digest(text: &str) -> String {
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(16);
    for b in digest.iter().take(8) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}
