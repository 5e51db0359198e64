use anyhow::{Context, Result};
use axum::{routing::get, Router};
use metrics::{describe_counter, describe_gauge, describe_histogram, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use once_cell::sync::OnceCell;

pub struct Metrics {
    pub handle: PrometheusHandle,
}

impl Metrics {
    /// Install the Prometheus recorder and publish the configured cache TTL.
    pub fn init(cache_ttl_secs: u64) -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;

        describe_all();
        // absolute TTL, reads never extend it
        gauge!("markets_cache_ttl_secs").set(cache_ttl_secs as f64);

        Ok(Self { handle })
    }

    /// `/metrics` in the Prometheus exposition format.
    pub fn router(&self) -> Router {
        let handle = self.handle.clone();
        Router::new().route(
            "/metrics",
            get(move || {
                let h = handle.clone();
                async move { h.render() }
            }),
        )
    }
}

/// Register descriptions once so every series shows up with help text.
pub fn describe_all() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!("markets_cache_hits_total", "Requests served from a fresh cache entry.");
        describe_counter!("markets_cache_misses_total", "Requests that found no fresh entry.");
        describe_counter!("markets_fetch_cycles_total", "Upstream fetch cycles started.");
        describe_counter!(
            "markets_upstream_failures_total",
            "Per-source fetch failures (timeout or error)."
        );
        describe_counter!(
            "markets_all_sources_unavailable_total",
            "Fetch cycles where every source failed."
        );
        describe_histogram!("markets_fetch_cycle_ms", "Fetch-merge cycle time in milliseconds.");
        describe_gauge!("markets_cache_ttl_secs", "Configured cache TTL in seconds.");
        describe_counter!("persistence_enqueued_total", "Results handed to the persistence queue.");
        describe_counter!(
            "persistence_enqueue_failed_total",
            "Results dropped because the queue was full or closed."
        );
        describe_counter!("persistence_records_written_total", "Durable records written.");
        describe_counter!("retention_deleted_total", "Rows removed by the retention sweeper.");
        describe_counter!("retention_failures_total", "Retention sweeps that failed.");
        describe_counter!("payment_outcomes_total", "Payment gate decisions by outcome.");
    });
    crate::ingest::ensure_metrics_described();
}
