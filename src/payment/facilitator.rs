//! Facilitator capability: verify and settle a payment reference.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;

use crate::error::FacilitatorError;

#[async_trait]
pub trait Facilitator: Send + Sync {
    /// `Ok(true)` when the reference pays `amount` for `endpoint`, `Ok(false)` when it does not.
    async fn verify(
        &self,
        reference: &str,
        endpoint: &str,
        amount: f64,
    ) -> Result<bool, FacilitatorError>;

    async fn settle(&self, reference: &str, amount: f64) -> Result<bool, FacilitatorError>;
}

#[derive(Serialize)]
struct VerifyBody<'a> {
    payment_hash: &'a str,
    endpoint: &'a str,
    amount: f64,
}

#[derive(Serialize)]
struct SettleBody<'a> {
    payment_hash: &'a str,
    amount: f64,
}

/// Facilitator reached over HTTP: `POST {base}/verify` and `POST {base}/settle`.
///
/// 2xx means yes, 4xx means no, anything else (5xx, transport error) means the
/// facilitator could not answer.
#[derive(Clone)]
pub struct HttpFacilitator {
    base: String,
    client: Client,
    timeout: Duration,
}

impl HttpFacilitator {
    pub fn new(base: impl Into<String>) -> Self {
        Self {
            base: base.into().trim_end_matches('/').to_string(),
            client: Client::new(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn post<B: Serialize + Sync>(&self, path: &str, body: &B) -> Result<bool, FacilitatorError> {
        let url = format!("{}/{}", self.base, path);
        let rsp = self
            .client
            .post(&url)
            .timeout(self.timeout)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FacilitatorError::Timeout
                } else {
                    FacilitatorError::Unavailable(e.to_string())
                }
            })?;
        classify(rsp.status())
    }
}

fn classify(status: StatusCode) -> Result<bool, FacilitatorError> {
    if status.is_success() {
        Ok(true)
    } else if status.is_client_error() {
        Ok(false)
    } else {
        Err(FacilitatorError::Unavailable(format!("HTTP {status}")))
    }
}

#[async_trait]
impl Facilitator for HttpFacilitator {
    async fn verify(
        &self,
        reference: &str,
        endpoint: &str,
        amount: f64,
    ) -> Result<bool, FacilitatorError> {
        self.post(
            "verify",
            &VerifyBody {
                payment_hash: reference,
                endpoint,
                amount,
            },
        )
        .await
    }

    async fn settle(&self, reference: &str, amount: f64) -> Result<bool, FacilitatorError> {
        self.post(
            "settle",
            &SettleBody {
                payment_hash: reference,
                amount,
            },
        )
        .await
    }
}
