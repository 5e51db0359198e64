//! # Merger
//! Combines normalized items from every source into one [`MergedResult`]:
//! categorize, keep only the requested category, dedup by identity key (newer
//! `published_at` wins), order, cap, count.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::categorize;
use crate::content::{Category, ContentItem, MergedResult, Source, SourceCounts};
use crate::ingest::normalize::NormalizedItem;

/// Merge knobs that come from configuration.
#[derive(Debug, Clone, Copy)]
pub struct MergeOptions {
    /// Upper bound on returned items after ordering.
    pub max_items: usize,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self { max_items: 50 }
    }
}

/// Descending publish time, then ascending identity key.
pub fn item_order(a: &ContentItem, b: &ContentItem) -> Ordering {
    b.published_at
        .cmp(&a.published_at)
        .then_with(|| a.identity_key.cmp(&b.identity_key))
}

/// Merge already-normalized batches (one per source, in source order).
pub fn merge(
    category: Category,
    batches: Vec<Vec<NormalizedItem>>,
    degraded_sources: Vec<Source>,
    generated_at: DateTime<Utc>,
    opts: MergeOptions,
) -> MergedResult {
    let mut by_key: HashMap<String, ContentItem> = HashMap::new();
    let mut off_category = 0usize;
    let mut duplicates = 0usize;

    for item in batches.into_iter().flatten() {
        let assigned = categorize::categorize(&item.payload);
        if assigned != category {
            off_category += 1;
            continue;
        }
        let candidate = ContentItem {
            category: assigned,
            published_at: item.published_at,
            identity_key: item.identity_key,
            payload: item.payload,
        };
        match by_key.get_mut(&candidate.identity_key) {
            Some(existing) => {
                duplicates += 1;
                if candidate.published_at > existing.published_at {
                    *existing = candidate;
                }
            }
            None => {
                by_key.insert(candidate.identity_key.clone(), candidate);
            }
        }
    }

    let mut items: Vec<ContentItem> = by_key.into_values().collect();
    items.sort_by(item_order);
    items.truncate(opts.max_items);

    let mut source_counts = SourceCounts::default();
    for it in &items {
        source_counts.record(it.source());
    }

    let mut degraded_sources = degraded_sources;
    degraded_sources.sort();
    degraded_sources.dedup();

    tracing::debug!(
        target: "markets",
        %category,
        kept = items.len(),
        off_category,
        duplicates,
        "merged sources"
    );

    MergedResult {
        category,
        items,
        generated_at,
        source_counts,
        degraded_sources,
    }
}
