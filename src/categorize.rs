//! Keyword categorizer.
//!
//! An item belongs to the category whose keyword table matches the most distinct
//! keywords in its text. Ties go to the earlier category in [`Category::ALL`]; text
//! with no match at all lands in `trends`.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::content::{Category, Payload};

fn keywords(category: Category) -> &'static [&'static str] {
    match category {
        Category::Trends => &[
            "trend", "trending", "viral", "popular", "momentum", "surge", "rally", "pump", "moon",
            "bullish", "bearish", "sentiment",
        ],
        Category::Liquidity => &[
            "liquidity", "volume", "tvl", "trading volume", "market depth", "liquidation",
            "liquidity pool", "dex", "swap", "exchange",
        ],
        Category::Agents => &[
            "agent", "ai", "bot", "automation", "virtual", "autonomous", "ai agent", "llm",
            "chatbot", "game", "virtuals",
        ],
        Category::MacroEvents => &[
            "fed", "interest rate", "inflation", "regulation", "sec", "government", "policy", "ban",
            "law", "compliance", "legal", "etf", "institutional", "blackrock", "fidelity",
            "election",
        ],
        Category::ProofOfWork => &[
            "mining", "miner", "hashrate", "difficulty", "pow", "proof of work", "asic", "gpu",
            "energy", "bitcoin mining", "ethereum mining",
        ],
    }
}

/// Terms sent to the social provider's search for a category. `trends` has none:
/// it reads the monitored-account feeds directly.
pub fn search_keywords(category: Category) -> &'static [&'static str] {
    match category {
        Category::Trends => &[],
        Category::Liquidity => &["liquidity", "volume", "dex", "swap", "trading"],
        Category::Agents => &["ai", "agent", "bot", "automation", "virtual", "llm"],
        Category::MacroEvents => &[
            "regulation", "sec", "fed", "etf", "government", "institutional",
        ],
        Category::ProofOfWork => &["mining", "hashrate", "miner", "pow", "difficulty"],
    }
}

static MATCHERS: Lazy<Vec<(Category, Vec<Regex>)>> = Lazy::new(|| {
    Category::ALL
        .into_iter()
        .map(|c| {
            let res = keywords(c)
                .iter()
                .map(|kw| word_regex(kw))
                .collect::<Vec<_>>();
            (c, res)
        })
        .collect()
});

fn word_regex(term: &str) -> Regex {
    // Allow simple plurals ("agents", "miners") without matching inside other words.
    Regex::new(&format!(r"(?i)\b{}s?\b", regex::escape(term))).expect("keyword regex")
}

/// Number of distinct keywords of `category` present in `text`.
pub fn score(text: &str, category: Category) -> usize {
    MATCHERS
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, res)| res.iter().filter(|re| re.is_match(text)).count())
        .unwrap_or(0)
}

pub fn categorize_text(text: &str) -> Category {
    let mut best = (Category::Trends, 0usize);
    for (category, res) in MATCHERS.iter() {
        let s = res.iter().filter(|re| re.is_match(text)).count();
        if s > best.1 {
            best = (*category, s);
        }
    }
    best.0
}

pub fn categorize(payload: &Payload) -> Category {
    categorize_text(&payload.searchable_text())
}

/// True when `text` mentions any of `terms` as a whole word.
pub fn mentions_any(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| word_regex(t).is_match(text))
}
