// src/ingest/providers/mod.rs
pub mod cryptonews;
pub mod game_x;

pub use cryptonews::CryptoNewsProvider;
pub use game_x::GameXProvider;

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use metrics::counter;
use serde::de::DeserializeOwned;
use serde::Deserialize;

/// `{ "data": [...] }` envelope shared by both providers.
#[derive(Debug, Deserialize)]
pub(crate) struct DataEnvelope<T> {
    #[serde(default = "Vec::new")]
    pub data: Vec<T>,
}

/// GET `req` and decode the envelope, retrying transport errors and non-2xx
/// answers with exponential backoff.
pub(crate) async fn get_envelope<T: DeserializeOwned>(
    req: reqwest::RequestBuilder,
    provider: &'static str,
    max_attempts: u8,
    base_delay: Duration,
) -> Result<Vec<T>> {
    let mut attempt: u8 = 0;
    loop {
        attempt += 1;
        let template = req
            .try_clone()
            .ok_or_else(|| anyhow!("{provider}: request body is not cloneable"))?;
        let res = template.send().await;
        let err = match res {
            Ok(rsp) => match rsp.error_for_status() {
                Ok(rsp) => {
                    let env: DataEnvelope<T> = rsp
                        .json()
                        .await
                        .with_context(|| format!("{provider}: decoding response"))?;
                    return Ok(env.data);
                }
                Err(e) => anyhow!("{provider} HTTP error: {e}"),
            },
            Err(e) => anyhow!("{provider} request failed: {e}"),
        };
        counter!("ingest_provider_errors_total", "provider" => provider).increment(1);
        if attempt >= max_attempts {
            return Err(err);
        }
        tracing::debug!(target: "ingest", provider, attempt, error = %err, "retrying provider call");
        tokio::time::sleep(crate::backoff_delay(base_delay, attempt)).await;
    }
}
