// tests/api_http.rs
//
// HTTP-level tests for the public Router without opening sockets.
// We exercise the router directly via tower::ServiceExt::oneshot.
//
// Covered:
// - GET /health, GET /
// - GET /markets/{category}: 404 unknown, 402 challenge, 402/403/503 rejections,
//   200 with payload + X-Cache, 503 when every source is down

mod common;

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value as Json;
use shuttle_axum::axum::{
    body::{self, Body},
    http::{HeaderMap, Request, StatusCode},
    Router,
};
use tokio::sync::mpsc;
use tower::ServiceExt as _; // for `oneshot`

use common::{service_with, trend_articles, trend_posts, StubFacilitator, StubFetcher};
use crypto_markets_gateway::api::{self, AppState};
use crypto_markets_gateway::content::{MergedResult, Source};
use crypto_markets_gateway::payment::{GateSettings, PaymentGate};
use crypto_markets_gateway::persistence::MemoryStore;

const BODY_LIMIT: usize = 1024 * 1024;

struct App {
    router: Router,
    news: Arc<StubFetcher>,
    facilitator: Arc<StubFacilitator>,
    // held so the persistence queue stays open for /health
    _rx: mpsc::Receiver<Arc<MergedResult>>,
}

fn app_with(news: Arc<StubFetcher>, social: Arc<StubFetcher>, facilitator: Arc<StubFacilitator>) -> App {
    let h = service_with(news.clone(), social, Duration::from_secs(60), Duration::from_secs(2));
    let store = Arc::new(MemoryStore::new());
    let payments = PaymentGate::new(
        store.clone(),
        facilitator.clone(),
        GateSettings {
            price: 0.001,
            currency: "USD".into(),
            facilitator_url: "https://facilitator.example".into(),
            facilitator_timeout: Duration::from_secs(2),
        },
    );
    let state = AppState {
        markets: h.service,
        payments: Arc::new(payments),
        store,
    };
    App {
        router: api::router(state),
        news,
        facilitator,
        _rx: h.rx,
    }
}

fn default_app() -> App {
    app_with(
        StubFetcher::new(Source::CryptoNews, trend_articles(25)),
        StubFetcher::new(Source::X, trend_posts(20)),
        StubFacilitator::accepting(),
    )
}

async fn get(app: &Router, uri: &str, payment: Option<&str>) -> (StatusCode, HeaderMap, Json) {
    let mut req = Request::builder().method("GET").uri(uri);
    if let Some(p) = payment {
        req = req.header("X-Payment-Hash", p);
    }
    let req = req.body(Body::empty()).expect("build request");
    let resp = app.clone().oneshot(req).await.expect("oneshot");
    let status = resp.status();
    let headers = resp.headers().clone();
    let bytes = body::to_bytes(resp.into_body(), BODY_LIMIT)
        .await
        .expect("read body")
        .to_vec();
    let v: Json = serde_json::from_slice(&bytes).unwrap_or(Json::Null);
    (status, headers, v)
}

#[tokio::test]
async fn health_reports_components() {
    let app = default_app();
    let (status, _, v) = get(&app.router, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["status"], "ok");
    assert_eq!(v["store"], true);
    assert_eq!(v["persistence_queue"], true);
}

#[tokio::test]
async fn index_lists_endpoints_and_payment_header() {
    let app = default_app();
    let (status, _, v) = get(&app.router, "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["payment"]["header"], "X-Payment-Hash");
    let endpoints = v["endpoints"].as_array().expect("endpoints array");
    assert_eq!(endpoints.len(), 5);
    assert!(endpoints.iter().any(|e| e == "/markets/proof_of_work"));
}

#[tokio::test]
async fn unknown_category_is_404() {
    let app = default_app();
    let (status, _, v) = get(&app.router, "/markets/defi", Some("0xpaid")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(v["categories"].as_array().map(|a| a.len()), Some(5));
    assert_eq!(app.facilitator.verify_calls(), 0);
}

#[tokio::test]
async fn unpaid_request_gets_402_challenge() {
    let app = default_app();
    let (status, headers, v) = get(&app.router, "/markets/trends", None).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(v["payment"]["endpoint"], "/markets/trends");
    assert_eq!(v["payment"]["amount"], 0.001);
    assert_eq!(headers["x-accepts-payment"], "true");
    assert_eq!(headers["x-payment-required"], "true");
    assert_eq!(headers["x-payment-endpoint"], "/markets/trends");
    assert_eq!(headers["x-payment-currency"], "USD");
    assert_eq!(app.news.calls(), 0, "no upstream work before payment");
}

#[tokio::test]
async fn paid_request_returns_merged_payload_and_cache_header() {
    let app = default_app();
    let (status, headers, v) = get(&app.router, "/markets/trends", Some("0xpaid")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-cache"], "MISS");
    assert_eq!(v["category"], "trends");
    assert_eq!(v["total_items"], 45);
    assert_eq!(v["news_count"], 25);
    assert_eq!(v["tweets_count"], 20);
    assert_eq!(v["items"].as_array().map(|a| a.len()), Some(45));
    assert!(v["timestamp"].as_str().is_some());

    let (status, headers, _) = get(&app.router, "/markets/trends", Some("0xpaid")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers["x-cache"], "HIT");
    assert_eq!(app.news.calls(), 1);
    assert_eq!(app.facilitator.verify_calls(), 1, "settled reference reused");
}

#[tokio::test]
async fn invalid_payment_is_402_with_reason() {
    let app = app_with(
        StubFetcher::new(Source::CryptoNews, trend_articles(1)),
        StubFetcher::new(Source::X, vec![]),
        StubFacilitator::answering(Ok(false)),
    );
    let (status, _, v) = get(&app.router, "/markets/trends", Some("0xbogus")).await;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(v["reason"], "invalid_payment");
    assert_eq!(app.news.calls(), 0);
}

#[tokio::test]
async fn reference_for_other_endpoint_is_403() {
    let app = default_app();
    get(&app.router, "/markets/trends", Some("0xpaid")).await;
    let (status, _, v) = get(&app.router, "/markets/agents", Some("0xpaid")).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(v["reason"], "payment_endpoint_mismatch");
}

#[tokio::test]
async fn facilitator_down_is_503_with_reason() {
    let app = app_with(
        StubFetcher::new(Source::CryptoNews, trend_articles(1)),
        StubFetcher::new(Source::X, vec![]),
        StubFacilitator::answering(Err(
            crypto_markets_gateway::error::FacilitatorError::Timeout,
        )),
    );
    let (status, _, v) = get(&app.router, "/markets/trends", Some("0xmaybe")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(v["reason"], "facilitator_unavailable");
}

#[tokio::test]
async fn all_sources_down_is_503_with_retry_after() {
    let app = app_with(
        StubFetcher::failing(Source::CryptoNews),
        StubFetcher::failing(Source::X),
        StubFacilitator::accepting(),
    );
    let (status, headers, v) = get(&app.router, "/markets/liquidity", Some("0xpaid")).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(headers.contains_key("retry-after"));
    assert!(v["error"].as_str().unwrap_or_default().contains("retry later"));
}

#[tokio::test]
async fn partial_content_is_labelled() {
    let app = app_with(
        StubFetcher::new(Source::CryptoNews, trend_articles(3)),
        StubFetcher::failing(Source::X),
        StubFacilitator::accepting(),
    );
    let (status, _, v) = get(&app.router, "/markets/trends", Some("0xpaid")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(v["total_items"], 3);
    assert_eq!(v["degraded_sources"], serde_json::json!(["twitter"]));
}
