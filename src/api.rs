//! HTTP surface: `GET /markets/{category}` behind the payment gate, plus `/health` and `/`.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use shuttle_axum::axum::{
    extract::{Path, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use tower_http::cors::CorsLayer;

use crate::content::{Category, ContentItem, MergedResult, Source};
use crate::error::PaymentError;
use crate::orchestrator::{MarketService, Served};
use crate::payment::{Authorization, PaymentChallenge, PaymentGate, PAYMENT_HEADER};
use crate::persistence::SignalStore;

/// Seconds suggested to callers when no source could be reached.
const RETRY_AFTER_SECS: u64 = 30;

#[derive(Clone)]
pub struct AppState {
    pub markets: Arc<MarketService>,
    pub payments: Arc<PaymentGate>,
    pub store: Arc<dyn SignalStore>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health))
        .route("/markets/{category}", get(markets))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

#[derive(Serialize)]
struct MarketResponse<'a> {
    category: Category,
    total_items: usize,
    news_count: usize,
    tweets_count: usize,
    items: &'a [ContentItem],
    timestamp: String,
    degraded_sources: &'a [Source],
}

impl<'a> From<&'a MergedResult> for MarketResponse<'a> {
    fn from(r: &'a MergedResult) -> Self {
        Self {
            category: r.category,
            total_items: r.total_items(),
            news_count: r.source_counts.news,
            tweets_count: r.source_counts.tweets,
            items: &r.items,
            timestamp: r.generated_at.to_rfc3339(),
            degraded_sources: &r.degraded_sources,
        }
    }
}

async fn markets(
    State(state): State<AppState>,
    Path(segment): Path<String>,
    headers: HeaderMap,
) -> Response {
    let category: Category = match segment.parse::<Category>() {
        Ok(c) => c,
        Err(e) => {
            return (
                StatusCode::NOT_FOUND,
                Json(json!({ "error": e.to_string(), "categories": category_names() })),
            )
                .into_response();
        }
    };

    let endpoint = category.endpoint();
    let reference = headers
        .get(PAYMENT_HEADER)
        .and_then(|v| v.to_str().ok());

    match state.payments.authorize(reference, &endpoint).await {
        Authorization::Unpaid(challenge) => payment_required(&challenge),
        Authorization::Rejected(reason) => rejected(reason),
        Authorization::Authorized(_) => match state.markets.get_category(category).await {
            Ok(Served { result, cache }) => {
                let mut rsp = Json(MarketResponse::from(result.as_ref())).into_response();
                rsp.headers_mut()
                    .insert("x-cache", HeaderValue::from_static(cache.header_value()));
                rsp
            }
            Err(e) => {
                let mut rsp = (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(json!({ "error": e.to_string(), "category": category })),
                )
                    .into_response();
                rsp.headers_mut()
                    .insert("retry-after", HeaderValue::from(RETRY_AFTER_SECS));
                rsp
            }
        },
    }
}

fn payment_required(challenge: &PaymentChallenge) -> Response {
    let body = json!({
        "error": "payment required",
        "payment": challenge,
    });
    let mut rsp = (StatusCode::PAYMENT_REQUIRED, Json(body)).into_response();
    let h = rsp.headers_mut();
    let pairs = [
        ("x-accepts-payment", "true".to_string()),
        ("x-payment-required", "true".to_string()),
        ("x-payment-amount", challenge.amount.to_string()),
        ("x-payment-currency", challenge.currency.clone()),
        ("x-payment-facilitator", challenge.facilitator.clone()),
        ("x-payment-endpoint", challenge.endpoint.clone()),
    ];
    for (name, value) in pairs {
        if let Ok(v) = HeaderValue::from_str(&value) {
            h.insert(HeaderName::from_static(name), v);
        }
    }
    rsp
}

fn rejected(reason: PaymentError) -> Response {
    let status = match reason {
        PaymentError::EndpointMismatch => StatusCode::FORBIDDEN,
        PaymentError::FacilitatorUnavailable | PaymentError::LedgerUnavailable => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        PaymentError::InvalidPayment | PaymentError::SettlementFailed => {
            StatusCode::PAYMENT_REQUIRED
        }
    };
    (
        status,
        Json(json!({ "error": reason.to_string(), "reason": reason.code() })),
    )
        .into_response()
}

fn category_names() -> Vec<&'static str> {
    Category::ALL.into_iter().map(Category::as_str).collect()
}

async fn index(State(state): State<AppState>) -> Json<serde_json::Value> {
    let endpoints: Vec<String> = Category::ALL.into_iter().map(Category::endpoint).collect();
    Json(json!({
        "service": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": endpoints,
        "payment": {
            "header": PAYMENT_HEADER,
            "protocol": "x402",
            "price_per_request": state.payments.price(),
        },
    }))
}

async fn health(State(state): State<AppState>) -> Response {
    let store_ok = state.store.ping().await.is_ok();
    let queue_ok = !state.markets.queue().is_closed();
    let status = if store_ok && queue_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (
        status,
        Json(json!({
            "status": if status == StatusCode::OK { "ok" } else { "degraded" },
            "store": store_ok,
            "persistence_queue": queue_ok,
        })),
    )
        .into_response()
}
