// tests/payment_gate.rs
//
// PaymentGate against a scripted facilitator and the in-memory ledger.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::StubFacilitator;
use crypto_markets_gateway::error::{FacilitatorError, PaymentError};
use crypto_markets_gateway::payment::{
    Authorization, GateSettings, PaymentGate, PaymentLedger, PAYMENT_HEADER,
};
use crypto_markets_gateway::persistence::MemoryStore;

const TRENDS: &str = "/markets/trends";
const AGENTS: &str = "/markets/agents";

fn settings(timeout: Duration) -> GateSettings {
    GateSettings {
        price: 0.001,
        currency: "USD".into(),
        facilitator_url: "https://facilitator.example".into(),
        facilitator_timeout: timeout,
    }
}

fn gate(facilitator: Arc<StubFacilitator>) -> (PaymentGate, Arc<MemoryStore>) {
    let ledger = Arc::new(MemoryStore::new());
    let gate = PaymentGate::new(
        ledger.clone(),
        facilitator,
        settings(Duration::from_secs(2)),
    );
    (gate, ledger)
}

#[tokio::test]
async fn missing_reference_yields_challenge() {
    let f = StubFacilitator::accepting();
    let (gate, _) = gate(f.clone());

    for reference in [None, Some(""), Some("   ")] {
        match gate.authorize(reference, TRENDS).await {
            Authorization::Unpaid(ch) => {
                assert_eq!(ch.endpoint, TRENDS);
                assert_eq!(ch.amount, 0.001);
                assert_eq!(ch.header, PAYMENT_HEADER);
            }
            other => panic!("expected Unpaid, got {other:?}"),
        }
    }
    assert_eq!(f.verify_calls(), 0);
}

#[tokio::test]
async fn valid_reference_is_verified_settled_and_recorded() {
    let f = StubFacilitator::accepting();
    let (gate, ledger) = gate(f.clone());

    let rec = match gate.authorize(Some("0xpaid"), TRENDS).await {
        Authorization::Authorized(rec) => rec,
        other => panic!("expected Authorized, got {other:?}"),
    };
    assert!(rec.verified && rec.settled);
    assert!(rec.verified_at.is_some() && rec.settled_at.is_some());
    assert_eq!((f.verify_calls(), f.settle_calls()), (1, 1));

    let stored = ledger.find("0xpaid").await.unwrap().unwrap();
    assert_eq!(stored.endpoint, TRENDS);
    assert!(stored.settled);
}

#[tokio::test]
async fn settled_reference_is_reused_without_facilitator() {
    let f = StubFacilitator::accepting();
    let (gate, _) = gate(f.clone());

    assert!(matches!(
        gate.authorize(Some("0xpaid"), TRENDS).await,
        Authorization::Authorized(_)
    ));
    assert!(matches!(
        gate.authorize(Some("0xpaid"), TRENDS).await,
        Authorization::Authorized(_)
    ));
    assert_eq!(f.verify_calls(), 1, "second use must not re-verify");
    assert_eq!(f.settle_calls(), 1);
}

#[tokio::test]
async fn settled_reference_on_other_endpoint_is_rejected() {
    let f = StubFacilitator::accepting();
    let (gate, ledger) = gate(f.clone());

    gate.authorize(Some("0xpaid"), TRENDS).await;
    assert_eq!(
        gate.authorize(Some("0xpaid"), AGENTS).await,
        Authorization::Rejected(PaymentError::EndpointMismatch)
    );
    assert_eq!(f.verify_calls(), 1);
    // binding unchanged
    assert_eq!(ledger.find("0xpaid").await.unwrap().unwrap().endpoint, TRENDS);
}

#[tokio::test]
async fn invalid_reference_never_becomes_verified_and_is_retried() {
    let f = StubFacilitator::answering(Ok(false));
    let (gate, ledger) = gate(f.clone());

    for _ in 0..2 {
        assert_eq!(
            gate.authorize(Some("0xbogus"), TRENDS).await,
            Authorization::Rejected(PaymentError::InvalidPayment)
        );
    }
    assert_eq!(f.verify_calls(), 2, "failure is not cached");
    assert_eq!(f.settle_calls(), 0);

    let rec = ledger.find("0xbogus").await.unwrap().unwrap();
    assert!(!rec.verified && !rec.settled);
    assert_eq!(rec.attempts, 2, "every attempt is recorded");
}

#[tokio::test]
async fn unreachable_facilitator_fails_closed() {
    let f = StubFacilitator::answering(Err(FacilitatorError::Unavailable("down".into())));
    let (gate, ledger) = gate(f);

    assert_eq!(
        gate.authorize(Some("0xmaybe"), TRENDS).await,
        Authorization::Rejected(PaymentError::FacilitatorUnavailable)
    );
    let rec = ledger.find("0xmaybe").await.unwrap().unwrap();
    assert_eq!(rec.attempts, 1);
    assert!(!rec.verified);
}

#[tokio::test]
async fn facilitator_timeout_fails_closed() {
    let f = StubFacilitator::hanging(Duration::from_millis(500));
    let ledger = Arc::new(MemoryStore::new());
    let gate = PaymentGate::new(ledger, f, settings(Duration::from_millis(50)));

    assert_eq!(
        gate.authorize(Some("0xslow"), TRENDS).await,
        Authorization::Rejected(PaymentError::FacilitatorUnavailable)
    );
}

#[tokio::test]
async fn refused_settlement_keeps_record_verified_only() {
    let f = StubFacilitator::accepting();
    *f.settle_answer.lock().unwrap() = Ok(false);
    let (gate, ledger) = gate(f);

    assert_eq!(
        gate.authorize(Some("0xhalf"), TRENDS).await,
        Authorization::Rejected(PaymentError::SettlementFailed)
    );
    let rec = ledger.find("0xhalf").await.unwrap().unwrap();
    assert!(rec.verified);
    assert!(!rec.settled);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_presentations_settle_once() {
    let f = StubFacilitator::hanging(Duration::from_millis(100));
    let ledger = Arc::new(MemoryStore::new());
    let gate = Arc::new(PaymentGate::new(
        ledger.clone(),
        f.clone(),
        settings(Duration::from_secs(2)),
    ));

    let a = {
        let gate = Arc::clone(&gate);
        tokio::spawn(async move { gate.authorize(Some("0xpaid"), TRENDS).await })
    };
    let b = {
        let gate = Arc::clone(&gate);
        tokio::spawn(async move { gate.authorize(Some("0xpaid"), TRENDS).await })
    };
    let (a, b) = (a.await.unwrap(), b.await.unwrap());

    assert!(matches!(a, Authorization::Authorized(_)));
    assert!(matches!(b, Authorization::Authorized(_)));
    assert_eq!((f.verify_calls(), f.settle_calls()), (1, 1));
    assert_eq!(ledger.find("0xpaid").await.unwrap().unwrap().attempts, 2);
}
