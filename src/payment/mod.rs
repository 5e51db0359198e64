//! # Payment gate
//! Classifies a request as unpaid, authorized or rejected from an optional
//! payment reference. Every attempt with a reference is written to the ledger
//! before the facilitator is consulted. Facilitator ambiguity (timeout, 5xx,
//! transport error) always rejects.
//!
//! A settled reference stays valid for the endpoint it was first presented on.
//! Presenting it for any other endpoint is rejected.
//!
//! Requests carrying the same reference are decided one at a time, so a proof
//! is verified and settled at most once even under concurrent presentation.

pub mod facilitator;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{info, warn};

use crate::error::{PaymentError, StoreError};

pub use facilitator::{Facilitator, HttpFacilitator};

/// Header carrying the caller's payment reference.
pub const PAYMENT_HEADER: &str = "X-Payment-Hash";

/// One row per payment reference. `verified` and `settled` only move false -> true.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentRecord {
    pub payment_reference: String,
    pub endpoint: String,
    pub amount: f64,
    pub verified: bool,
    pub settled: bool,
    pub attempts: u32,
    pub created_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
    pub verified_at: Option<DateTime<Utc>>,
    pub settled_at: Option<DateTime<Utc>>,
}

impl PaymentRecord {
    pub fn new(reference: &str, endpoint: &str, amount: f64, now: DateTime<Utc>) -> Self {
        Self {
            payment_reference: reference.to_string(),
            endpoint: endpoint.to_string(),
            amount,
            verified: false,
            settled: false,
            attempts: 0,
            created_at: now,
            last_attempt_at: now,
            verified_at: None,
            settled_at: None,
        }
    }

    pub fn mark_verified(&mut self, at: DateTime<Utc>) {
        if !self.verified {
            self.verified = true;
            self.verified_at = Some(at);
        }
    }

    /// Settling implies verified.
    pub fn mark_settled(&mut self, at: DateTime<Utc>) {
        self.mark_verified(at);
        if !self.settled {
            self.settled = true;
            self.settled_at = Some(at);
        }
    }
}

/// Durable payment-transaction relation, unique on the reference.
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Create the row on first sight (bound to `endpoint`) or bump its attempt count.
    async fn record_attempt(
        &self,
        reference: &str,
        endpoint: &str,
        amount: f64,
        now: DateTime<Utc>,
    ) -> Result<PaymentRecord, StoreError>;

    async fn mark_verified(
        &self,
        reference: &str,
        at: DateTime<Utc>,
    ) -> Result<PaymentRecord, StoreError>;

    async fn mark_settled(
        &self,
        reference: &str,
        at: DateTime<Utc>,
    ) -> Result<PaymentRecord, StoreError>;

    async fn find(&self, reference: &str) -> Result<Option<PaymentRecord>, StoreError>;
}

/// Machine-readable instructions for obtaining a payment reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PaymentChallenge {
    pub amount: f64,
    pub currency: String,
    pub endpoint: String,
    pub facilitator: String,
    pub header: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Authorization {
    Unpaid(PaymentChallenge),
    Authorized(PaymentRecord),
    Rejected(PaymentError),
}

#[derive(Debug, Clone)]
pub struct GateSettings {
    pub price: f64,
    pub currency: String,
    pub facilitator_url: String,
    pub facilitator_timeout: Duration,
}

type Claims = Mutex<HashMap<String, Arc<AsyncMutex<()>>>>;

pub struct PaymentGate {
    ledger: Arc<dyn PaymentLedger>,
    facilitator: Arc<dyn Facilitator>,
    settings: GateSettings,
    claims: Claims,
}

/// Exclusive hold on one reference. The map entry goes away with the last holder.
struct ReferenceClaim<'a> {
    claims: &'a Claims,
    reference: String,
    held: Option<OwnedMutexGuard<()>>,
}

impl Drop for ReferenceClaim<'_> {
    fn drop(&mut self) {
        let mut claims = self.claims.lock().unwrap_or_else(|p| p.into_inner());
        drop(self.held.take());
        if claims
            .get(&self.reference)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            claims.remove(&self.reference);
        }
    }
}

impl PaymentGate {
    pub fn new(
        ledger: Arc<dyn PaymentLedger>,
        facilitator: Arc<dyn Facilitator>,
        settings: GateSettings,
    ) -> Self {
        Self {
            ledger,
            facilitator,
            settings,
            claims: Mutex::new(HashMap::new()),
        }
    }

    pub fn price(&self) -> f64 {
        self.settings.price
    }

    pub fn challenge(&self, endpoint: &str) -> PaymentChallenge {
        PaymentChallenge {
            amount: self.settings.price,
            currency: self.settings.currency.clone(),
            endpoint: endpoint.to_string(),
            facilitator: self.settings.facilitator_url.clone(),
            header: PAYMENT_HEADER,
        }
    }

    pub async fn authorize(&self, reference: Option<&str>, endpoint: &str) -> Authorization {
        let reference = reference.map(str::trim).filter(|r| !r.is_empty());
        let Some(reference) = reference else {
            record_outcome("unpaid");
            return Authorization::Unpaid(self.challenge(endpoint));
        };

        let id = crate::anon_hash(reference);
        let _claim = self.claim(reference).await;
        match self.decide(reference, endpoint).await {
            Ok(rec) => {
                record_outcome("authorized");
                info!(target: "payment", %id, endpoint, attempts = rec.attempts, "payment authorized");
                Authorization::Authorized(rec)
            }
            Err(reason) => {
                record_outcome(reason.code());
                warn!(target: "payment", %id, endpoint, reason = reason.code(), "payment rejected");
                Authorization::Rejected(reason)
            }
        }
    }

    async fn claim(&self, reference: &str) -> ReferenceClaim<'_> {
        let lock = {
            let mut claims = self.claims.lock().unwrap_or_else(|p| p.into_inner());
            Arc::clone(claims.entry(reference.to_string()).or_default())
        };
        ReferenceClaim {
            claims: &self.claims,
            reference: reference.to_string(),
            held: Some(lock.lock_owned().await),
        }
    }

    /// Runs under the reference's claim; the ledger row read here is current.
    async fn decide(&self, reference: &str, endpoint: &str) -> Result<PaymentRecord, PaymentError> {
        let amount = self.settings.price;
        let record = self
            .ledger
            .record_attempt(reference, endpoint, amount, Utc::now())
            .await
            .map_err(|e| {
                warn!(target: "payment", error = %e, "payment ledger write failed");
                PaymentError::LedgerUnavailable
            })?;

        if record.endpoint != endpoint {
            return Err(PaymentError::EndpointMismatch);
        }
        if record.settled {
            return Ok(record);
        }

        let timeout = self.settings.facilitator_timeout;
        let verified = tokio::time::timeout(
            timeout,
            self.facilitator.verify(reference, endpoint, amount),
        )
        .await;
        match verified {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => return Err(PaymentError::InvalidPayment),
            Ok(Err(e)) => {
                warn!(target: "payment", error = %e, "verify failed");
                return Err(PaymentError::FacilitatorUnavailable);
            }
            Err(_) => {
                warn!(target: "payment", "verify timed out");
                return Err(PaymentError::FacilitatorUnavailable);
            }
        }

        self.ledger
            .mark_verified(reference, Utc::now())
            .await
            .map_err(|e| {
                warn!(target: "payment", error = %e, "payment ledger verify update failed");
                PaymentError::LedgerUnavailable
            })?;

        let settled =
            tokio::time::timeout(timeout, self.facilitator.settle(reference, amount)).await;
        match settled {
            Ok(Ok(true)) => {}
            Ok(Ok(false)) => return Err(PaymentError::SettlementFailed),
            Ok(Err(e)) => {
                warn!(target: "payment", error = %e, "settle failed");
                return Err(PaymentError::FacilitatorUnavailable);
            }
            Err(_) => {
                warn!(target: "payment", "settle timed out");
                return Err(PaymentError::FacilitatorUnavailable);
            }
        }

        self.ledger
            .mark_settled(reference, Utc::now())
            .await
            .map_err(|e| {
                warn!(target: "payment", error = %e, "payment ledger settle update failed");
                PaymentError::LedgerUnavailable
            })
    }
}

fn record_outcome(outcome: &'static str) {
    counter!("payment_outcomes_total", "outcome" => outcome).increment(1);
}
