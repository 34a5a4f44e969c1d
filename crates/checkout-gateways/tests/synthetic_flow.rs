//! Synthetic methods resolved through the guard and the tokio scheduler

use rust_decimal_macros::dec;
use std::sync::Arc;
use std::time::Duration;

use checkout_core::{
    CardDetails, CheckoutConfig, Course, CourseId, MemoryActivityLog, MemoryCatalog,
    MemoryLedger, PaymentMethod, PaymentState, PaymentStatus, ProviderRegistry, PurchaseGuard,
    PurchaseOutcome, PurchaseRequest, Settlement, TokioScheduler, UserId,
};
use checkout_gateways::SyntheticAdapter;

fn guard(config: CheckoutConfig) -> (PurchaseGuard, MemoryActivityLog) {
    let ledger = Arc::new(MemoryLedger::new());
    let activity = MemoryActivityLog::new();
    let settlement = Settlement::new(ledger, Arc::new(activity.clone()));

    let synthetic = Arc::new(SyntheticAdapter::new(
        settlement.clone(),
        Arc::new(TokioScheduler),
        &config,
    ));
    let mut registry = ProviderRegistry::new();
    for method in [PaymentMethod::Dev, PaymentMethod::Card, PaymentMethod::BankTransfer] {
        registry.register_shared(method, synthetic.clone());
    }

    let catalog = MemoryCatalog::new([Course {
        id: CourseId(42),
        title: "Async Rust".into(),
        price: Some(dec!(29.99)),
    }]);
    let guard = PurchaseGuard::new(settlement, Arc::new(catalog), Arc::new(registry), config);
    (guard, activity)
}

fn request(method: &str) -> PurchaseRequest {
    PurchaseRequest {
        course_id: CourseId(42),
        amount: dec!(29.99),
        method: method.into(),
        currency: None,
        card: None,
    }
}

async fn settle_delay() {
    tokio::time::sleep(Duration::from_secs(4)).await;
    tokio::task::yield_now().await;
}

#[tokio::test(start_paused = true)]
async fn test_dev_payment_approves_in_development() {
    let (guard, activity) = guard(CheckoutConfig::development());

    let outcome = guard.request_purchase(UserId(1), request("dev")).await.unwrap();
    let PurchaseOutcome::Initiated { payment, checkout_url } = outcome else {
        panic!("expected initiation");
    };
    assert_eq!(payment.state, PaymentState::Pending);
    assert!(checkout_url.is_none());
    assert!(!guard.has_access(UserId(1), CourseId(42)).await.unwrap());

    settle_delay().await;

    let PaymentStatus::Found(resolved) = guard.payment_status(UserId(1), CourseId(42)).await.unwrap()
    else {
        panic!("expected a payment");
    };
    assert_eq!(resolved.state, PaymentState::Approved);
    assert!(resolved.external_reference.starts_with("dev_"));
    assert!(guard.has_access(UserId(1), CourseId(42)).await.unwrap());
    assert_eq!(
        activity.actions(),
        vec!["purchase_initiated".to_string(), "payment_approved".to_string()]
    );
}

#[tokio::test(start_paused = true)]
async fn test_zero_rate_rejects_outside_development() {
    let config = CheckoutConfig {
        synthetic_approval_rate: 0.0,
        ..CheckoutConfig::default()
    };
    let (guard, _) = guard(config);

    guard
        .request_purchase(UserId(2), request("bank_transfer"))
        .await
        .unwrap();
    settle_delay().await;

    let status = guard.payment_status(UserId(2), CourseId(42)).await.unwrap();
    let PaymentStatus::Found(payment) = status else {
        panic!("expected a payment");
    };
    assert_eq!(payment.state, PaymentState::Rejected);
    assert!(payment.external_reference.is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_card_payment_with_details() {
    let (guard, _) = guard(CheckoutConfig::development());
    let card: CardDetails = serde_json::from_value(serde_json::json!({
        "number": "4242424242424242",
        "expiry": "12/30",
        "cvv": "123"
    }))
    .unwrap();

    let mut with_card = request("card");
    with_card.card = Some(card);
    guard.request_purchase(UserId(3), with_card).await.unwrap();
    settle_delay().await;

    let status = guard.payment_status(UserId(3), CourseId(42)).await.unwrap();
    assert_eq!(status.label(), "approved");
    let PaymentStatus::Found(payment) = status else {
        panic!("expected a payment");
    };
    assert!(payment.external_reference.starts_with("card_"));
}
