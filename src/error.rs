//! Error taxonomy for the request pipeline and its background tasks.

use thiserror::Error;

use crate::content::Source;

/// Why a single source contributed nothing to a fetch cycle. Never fatal on its own.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("{provider} timed out")]
    UpstreamTimeout { provider: Source },
    #[error("{provider} failed: {message}")]
    UpstreamError { provider: Source, message: String },
}

impl FetchFailure {
    pub fn provider(&self) -> Source {
        match self {
            FetchFailure::UpstreamTimeout { provider }
            | FetchFailure::UpstreamError { provider, .. } => *provider,
        }
    }
}

/// Errors surfaced by the orchestrator to its callers.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MarketError {
    /// Every source failed; nothing was cached.
    #[error("no data available from any source, retry later")]
    AllSourcesUnavailable,
    #[error("unknown category '{0}'")]
    UnknownCategory(String),
}

/// Reason a payment reference was rejected by the gate.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum PaymentError {
    #[error("payment could not be verified")]
    InvalidPayment,
    #[error("payment facilitator unavailable")]
    FacilitatorUnavailable,
    #[error("payment reference is bound to a different endpoint")]
    EndpointMismatch,
    #[error("payment settlement failed")]
    SettlementFailed,
    /// The payment ledger could not record the attempt.
    #[error("payment ledger unavailable")]
    LedgerUnavailable,
}

impl PaymentError {
    /// Stable machine-readable code returned to callers.
    pub fn code(self) -> &'static str {
        match self {
            PaymentError::InvalidPayment => "invalid_payment",
            PaymentError::FacilitatorUnavailable => "facilitator_unavailable",
            PaymentError::EndpointMismatch => "payment_endpoint_mismatch",
            PaymentError::SettlementFailed => "settlement_failed",
            PaymentError::LedgerUnavailable => "payment_ledger_unavailable",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FacilitatorError {
    #[error("facilitator unreachable: {0}")]
    Unavailable(String),
    #[error("facilitator call timed out")]
    Timeout,
}

/// Persistence enqueue failures; logged, never surfaced to the request.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum EnqueueError {
    #[error("persistence queue is full")]
    QueueFull,
    #[error("persistence queue is closed")]
    QueueClosed,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}
