// src/config/mod.rs
//! Application configuration.
//!
//! Resolution order:
//! 1) `$MARKETS_CONFIG_PATH` (must exist if set)
//! 2) `config/markets.toml`
//! 3) built-in defaults
//!
//! Scalar env vars then override whatever the file said. Upstream credentials are
//! read from the environment only and never from the file.

use anyhow::{anyhow, bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_CONFIG_PATH: &str = "MARKETS_CONFIG_PATH";
pub const DEFAULT_CONFIG_PATH: &str = "config/markets.toml";

fn default_cache_ttl_secs() -> u64 {
    3600
}
fn default_retention_secs() -> u64 {
    24 * 3600
}
fn default_sweep_interval_secs() -> u64 {
    3600
}
fn default_upstream_timeout_secs() -> u64 {
    10
}
fn default_facilitator_timeout_secs() -> u64 {
    10
}
fn default_price_per_request() -> f64 {
    0.001
}
fn default_currency() -> String {
    "USD".to_string()
}
fn default_max_items() -> usize {
    50
}
fn default_news_limit() -> u32 {
    30
}
fn default_posts_per_account() -> u32 {
    5
}
fn default_search_results() -> u32 {
    30
}
fn default_queue_capacity() -> usize {
    256
}
fn default_persistence_workers() -> usize {
    2
}
fn default_facilitator_url() -> String {
    "https://facilitator.x402.org".to_string()
}
fn default_cryptonews_base_url() -> String {
    "https://cryptonews-api.com/api/v1".to_string()
}
fn default_game_x_base_url() -> String {
    "https://api.game.virtuals.io/api/twitter".to_string()
}
fn default_x_accounts() -> Vec<String> {
    [
        "lookonchain",
        "pumpdotfun",
        "virtuals_io",
        "useBackroom",
        "CreatorBid",
        "HyperliquidX",
        "solana",
        "base",
        "ArAIstotle",
        "Cointelegraph",
        "TheBlock__",
        "WatcherGuru",
        "cryptodotnews",
        "blockchainrptr",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,
    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,
    #[serde(default = "default_upstream_timeout_secs")]
    pub upstream_timeout_secs: u64,
    #[serde(default = "default_facilitator_timeout_secs")]
    pub facilitator_timeout_secs: u64,
    /// Price per request in `currency`.
    #[serde(default = "default_price_per_request")]
    pub price_per_request: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default = "default_max_items")]
    pub max_items: usize,
    #[serde(default = "default_news_limit")]
    pub news_limit: u32,
    #[serde(default = "default_posts_per_account")]
    pub posts_per_account: u32,
    #[serde(default = "default_search_results")]
    pub search_results: u32,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_persistence_workers")]
    pub persistence_workers: usize,
    /// Monitored social accounts.
    #[serde(default = "default_x_accounts")]
    pub x_accounts: Vec<String>,
    #[serde(default = "default_facilitator_url")]
    pub facilitator_url: String,
    #[serde(default = "default_cryptonews_base_url")]
    pub cryptonews_base_url: String,
    #[serde(default = "default_game_x_base_url")]
    pub game_x_base_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: default_cache_ttl_secs(),
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            upstream_timeout_secs: default_upstream_timeout_secs(),
            facilitator_timeout_secs: default_facilitator_timeout_secs(),
            price_per_request: default_price_per_request(),
            currency: default_currency(),
            max_items: default_max_items(),
            news_limit: default_news_limit(),
            posts_per_account: default_posts_per_account(),
            search_results: default_search_results(),
            queue_capacity: default_queue_capacity(),
            persistence_workers: default_persistence_workers(),
            x_accounts: default_x_accounts(),
            facilitator_url: default_facilitator_url(),
            cryptonews_base_url: default_cryptonews_base_url(),
            game_x_base_url: default_game_x_base_url(),
        }
    }
}

/// Upstream credentials, environment only.
#[derive(Clone, Default)]
pub struct Credentials {
    pub cryptonews_api_key: String,
    pub game_api_key: String,
    pub game_access_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // key lengths only
        f.debug_struct("Credentials")
            .field("cryptonews_api_key_len", &self.cryptonews_api_key.len())
            .field("game_api_key_len", &self.game_api_key.len())
            .field("game_access_token_len", &self.game_access_token.len())
            .finish()
    }
}

impl Credentials {
    pub fn from_env() -> Self {
        let var = |k: &str| std::env::var(k).unwrap_or_default();
        Self {
            cryptonews_api_key: var("CRYPTO_NEWS_API_KEY"),
            game_api_key: var("GAME_API_KEY"),
            game_access_token: var("GAME_ACCESS_TOKEN"),
        }
    }
}

impl AppConfig {
    /// Load from an explicit TOML file, without env overrides.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        let cfg: AppConfig =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(cfg)
    }

    /// Full resolution: file (env path → default path → defaults), env overrides, validation.
    pub fn load() -> Result<Self> {
        let mut cfg = match std::env::var(ENV_CONFIG_PATH) {
            Ok(p) => {
                let pb = PathBuf::from(p);
                if !pb.exists() {
                    return Err(anyhow!("{ENV_CONFIG_PATH} points to non-existent path"));
                }
                Self::load_from(&pb)?
            }
            Err(_) => {
                let default_p = PathBuf::from(DEFAULT_CONFIG_PATH);
                if default_p.exists() {
                    Self::load_from(&default_p)?
                } else {
                    Self::default()
                }
            }
        };
        cfg.apply_env_overrides()?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn apply_env_overrides(&mut self) -> Result<()> {
        override_u64("CACHE_TTL_SECS", &mut self.cache_ttl_secs)?;
        override_u64("RETENTION_SECS", &mut self.retention_secs)?;
        override_u64("SWEEP_INTERVAL_SECS", &mut self.sweep_interval_secs)?;
        override_u64("UPSTREAM_TIMEOUT_SECS", &mut self.upstream_timeout_secs)?;
        if let Ok(v) = std::env::var("PAYMENT_PRICE_PER_REQUEST") {
            self.price_per_request = v
                .trim()
                .parse()
                .with_context(|| format!("PAYMENT_PRICE_PER_REQUEST='{v}' is not a number"))?;
        }
        if let Ok(v) = std::env::var("FACILITATOR_URL") {
            if !v.trim().is_empty() {
                self.facilitator_url = v.trim().to_string();
            }
        }
        if let Ok(v) = std::env::var("X_ACCOUNTS") {
            let accounts = clean_list(v.split(','));
            if !accounts.is_empty() {
                self.x_accounts = accounts;
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("cache_ttl_secs", self.cache_ttl_secs),
            ("retention_secs", self.retention_secs),
            ("sweep_interval_secs", self.sweep_interval_secs),
            ("upstream_timeout_secs", self.upstream_timeout_secs),
            ("facilitator_timeout_secs", self.facilitator_timeout_secs),
        ] {
            if v == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        if !(self.price_per_request.is_finite() && self.price_per_request > 0.0) {
            bail!("price_per_request must be a positive number");
        }
        for (name, v) in [
            ("max_items", self.max_items),
            ("queue_capacity", self.queue_capacity),
            ("persistence_workers", self.persistence_workers),
            ("news_limit", self.news_limit as usize),
            ("posts_per_account", self.posts_per_account as usize),
            ("search_results", self.search_results as usize),
        ] {
            if v == 0 {
                bail!("{name} must be greater than zero");
            }
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache_ttl_secs)
    }
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
    pub fn facilitator_timeout(&self) -> Duration {
        Duration::from_secs(self.facilitator_timeout_secs)
    }

    /// Facilitator base URL with a scheme; bare hosts get `https://`.
    pub fn facilitator_base(&self) -> String {
        let u = self.facilitator_url.trim().trim_end_matches('/');
        if u.starts_with("http://") || u.starts_with("https://") {
            u.to_string()
        } else {
            format!("https://{u}")
        }
    }
}

fn override_u64(key: &str, slot: &mut u64) -> Result<()> {
    if let Ok(v) = std::env::var(key) {
        *slot = v
            .trim()
            .parse()
            .with_context(|| format!("{key}='{v}' is not a non-negative integer"))?;
    }
    Ok(())
}

fn clean_list<'a>(items: impl Iterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for it in items {
        let t = it.trim().trim_start_matches('@');
        if !t.is_empty() && !out.iter().any(|o| o.eq_ignore_ascii_case(t)) {
            out.push(t.to_string());
        }
    }
    out
}
