//! Crypto markets gateway: binary entrypoint.
//! Wires configuration, providers, cache, payment gate, persistence and the
//! retention sweeper into the axum router served by Shuttle.

use std::sync::Arc;

use shuttle_axum::ShuttleAxum;
use tracing::info;

use crypto_markets_gateway::{
    api::{self, AppState},
    cache::CategoryCache,
    config::{AppConfig, Credentials},
    ingest::providers::{game_x::GameXSettings, CryptoNewsProvider, GameXProvider},
    merge::MergeOptions,
    metrics::Metrics,
    orchestrator::{MarketOptions, MarketService},
    payment::{facilitator::HttpFacilitator, GateSettings, PaymentGate},
    persistence::{spawn_workers, MemoryStore, PersistenceQueue, RetryPolicy, SignalStore},
    retention::spawn_retention_sweeper,
    telemetry,
};

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments.
    let _ = dotenvy::dotenv();
    telemetry::init_tracing();

    let cfg = AppConfig::load()?;
    let creds = Credentials::from_env();
    info!(?creds, accounts = cfg.x_accounts.len(), "configuration loaded");

    let metrics = Metrics::init(cfg.cache_ttl_secs)?;

    let news = Arc::new(CryptoNewsProvider::new(
        cfg.cryptonews_base_url.clone(),
        creds.cryptonews_api_key.clone(),
        cfg.news_limit,
    ));
    let social = Arc::new(GameXProvider::new(GameXSettings {
        base_url: cfg.game_x_base_url.clone(),
        api_key: creds.game_api_key.clone(),
        access_token: creds.game_access_token.clone(),
        accounts: cfg.x_accounts.clone(),
        posts_per_account: cfg.posts_per_account,
        search_results: cfg.search_results,
    }));

    let store = Arc::new(MemoryStore::new());
    let signal_store: Arc<dyn SignalStore> = store.clone();

    let (queue, rx) = PersistenceQueue::channel(cfg.queue_capacity);
    spawn_workers(
        rx,
        Arc::clone(&signal_store),
        cfg.persistence_workers,
        RetryPolicy::default(),
    );
    spawn_retention_sweeper(
        Arc::clone(&signal_store),
        cfg.sweep_interval(),
        cfg.retention(),
    );

    let markets = Arc::new(MarketService::new(
        news,
        social,
        Arc::new(CategoryCache::new(cfg.cache_ttl())),
        queue,
        MarketOptions {
            upstream_timeout: cfg.upstream_timeout(),
            merge: MergeOptions {
                max_items: cfg.max_items,
            },
        },
    ));

    let facilitator = Arc::new(
        HttpFacilitator::new(cfg.facilitator_base()).with_timeout(cfg.facilitator_timeout()),
    );
    let payments = Arc::new(PaymentGate::new(
        store,
        facilitator,
        GateSettings {
            price: cfg.price_per_request,
            currency: cfg.currency.clone(),
            facilitator_url: cfg.facilitator_base(),
            facilitator_timeout: cfg.facilitator_timeout(),
        },
    ));

    let state = AppState {
        markets,
        payments,
        store: signal_store,
    };
    let router = api::router(state).merge(metrics.router());

    info!(
        ttl_secs = cfg.cache_ttl_secs,
        retention_secs = cfg.retention_secs,
        "crypto markets gateway ready"
    );
    Ok(router.into())
}
