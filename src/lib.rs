// src/lib.rs
// Library surface shared by the service binary and the integration tests.

pub mod api;
pub mod cache;
pub mod categorize;
pub mod config;
pub mod content;
pub mod error;
pub mod ingest;
pub mod merge;
pub mod metrics;
pub mod orchestrator;
pub mod payment;
pub mod persistence;
pub mod retention;
pub mod telemetry;

pub use crate::api::{router, AppState};
pub use crate::orchestrator::{CacheStatus, MarketService};

/// Short stable id for values that must not appear raw in logs.
pub(crate) fn anon_hash(text: &str) -> String {
    use sha2::{Digest, Sha256};
    let digest = Sha256::digest(text.as_bytes());
    let mut out = String::with_capacity(12);
    for b in digest.iter().take(6) {
        use std::fmt::Write as _;
        let _ = write!(&mut out, "{:02x}", b);
    }
    out
}

/// Exponential backoff before retry number `attempt` (1-based): `base`, `2*base`,
/// `4*base`, ... The doubling stops after ten steps.
pub(crate) fn backoff_delay(base: std::time::Duration, attempt: u8) -> std::time::Duration {
    let exp = u32::from(attempt.saturating_sub(1)).min(10);
    base.saturating_mul(1u32 << exp)
}
