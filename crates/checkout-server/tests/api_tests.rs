//! Integration tests for the checkout HTTP surface

use async_trait::async_trait;
use axum::http::{header, HeaderName, HeaderValue, StatusCode};
use axum_test::TestServer;
use rust_decimal_macros::dec;
use serde_json::json;
use std::sync::Arc;

use checkout_core::{
    CheckoutConfig, Course, CourseId, Initiation, MemoryActivityLog, MemoryCatalog, MemoryLedger,
    Payment, PaymentMethod, PaymentState, ProviderAdapter, ProviderRegistry, PurchaseGuard, Result,
    Settlement,
};
use checkout_gateways::signature::sign_hex;
use checkout_server::{create_router, AppState, StaticTokenAuthenticator, WebhookVerifiers};

const SECRET: &str = "whsec_test";

/// Hosted checkout that hands out a fixed-format reference
struct HostedStub;

#[async_trait]
impl ProviderAdapter for HostedStub {
    fn name(&self) -> &str {
        "hosted-stub"
    }

    async fn initiate(&self, payment: &Payment, _course: &Course) -> Result<Initiation> {
        Ok(Initiation {
            reference: Some(format!("CHG-{}", payment.id)),
            checkout_url: Some(format!("https://pay.test/{}", payment.id)),
        })
    }
}

/// Redirect checkout whose order id is derived from the payment and which
/// always captures successfully
struct RedirectStub;

#[async_trait]
impl ProviderAdapter for RedirectStub {
    fn name(&self) -> &str {
        "redirect-stub"
    }

    async fn initiate(&self, payment: &Payment, _course: &Course) -> Result<Initiation> {
        Ok(Initiation {
            reference: Some(format!("ORDER-{}", payment.id)),
            checkout_url: Some(format!("https://paypal.test/approve/{}", payment.id)),
        })
    }

    fn supports_capture(&self) -> bool {
        true
    }

    async fn capture(&self, _payment: &Payment, _token: &str) -> Result<Option<PaymentState>> {
        Ok(Some(PaymentState::Approved))
    }
}

fn create_test_server(config: CheckoutConfig, generic_secret: Option<&str>) -> TestServer {
    let ledger = Arc::new(MemoryLedger::new());
    let settlement = Settlement::new(ledger, Arc::new(MemoryActivityLog::new()));

    let mut registry = ProviderRegistry::new();
    registry.register(PaymentMethod::Coinbase, HostedStub);
    registry.register(PaymentMethod::PayPal, RedirectStub);

    let catalog = MemoryCatalog::new([Course {
        id: CourseId(7),
        title: "Rust for Web Developers".into(),
        price: Some(dec!(49.00)),
    }]);
    let guard = PurchaseGuard::new(settlement, Arc::new(catalog), Arc::new(registry), config);

    let authenticator = Arc::new(StaticTokenAuthenticator::parse("alice:1,bob:2").unwrap());
    let webhooks = WebhookVerifiers {
        generic_secret: generic_secret.map(String::from),
        ..WebhookVerifiers::default()
    };
    let state = AppState::new(guard, authenticator, webhooks, "https://shop.test");

    TestServer::new(create_router(state)).unwrap()
}

fn bearer(token: &str) -> HeaderValue {
    HeaderValue::from_str(&format!("Bearer {}", token)).unwrap()
}

fn signature(body: &str) -> HeaderValue {
    HeaderValue::from_str(&sign_hex(SECRET, body.as_bytes())).unwrap()
}

fn signature_header() -> HeaderName {
    HeaderName::from_static("x-checkout-signature")
}

fn purchase_body() -> serde_json::Value {
    json!({ "course_id": 7, "amount": "49.00", "method": "coinbase" })
}

// ============ Health ============

#[tokio::test]
async fn test_health_check() {
    let server = create_test_server(CheckoutConfig::development(), None);

    let response = server.get("/health").await;

    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["environment"], "development");
    assert_eq!(body["methods"], json!(["paypal", "coinbase"]));
}

// ============ Purchase ============

#[tokio::test]
async fn test_purchase_requires_bearer_token() {
    let server = create_test_server(CheckoutConfig::development(), None);

    let response = server.post("/api/payments").json(&purchase_body()).await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = server
        .post("/api/payments")
        .add_header(header::AUTHORIZATION, bearer("mallory"))
        .json(&purchase_body())
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_purchase_validation_errors() {
    let server = create_test_server(CheckoutConfig::development(), None);

    let response = server
        .post("/api/payments")
        .add_header(header::AUTHORIZATION, bearer("alice"))
        .json(&json!({ "course_id": 7, "amount": "49.00", "method": "barter" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INVALID_METHOD");

    let response = server
        .post("/api/payments")
        .add_header(header::AUTHORIZATION, bearer("alice"))
        .json(&json!({ "course_id": 999, "amount": "49.00", "method": "coinbase" }))
        .await;
    response.assert_status_not_found();

    let response = server
        .post("/api/payments")
        .add_header(header::AUTHORIZATION, bearer("alice"))
        .json(&json!({ "course_id": 7, "amount": "1.00", "method": "coinbase" }))
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "INVALID_AMOUNT");
}

#[tokio::test]
async fn test_purchase_webhook_access_flow() {
    let server = create_test_server(CheckoutConfig::development(), Some(SECRET));

    let response = server.get("/api/payments/7").add_header(header::AUTHORIZATION, bearer("alice")).await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["state"], "not_paid");

    let response = server
        .post("/api/payments")
        .add_header(header::AUTHORIZATION, bearer("alice"))
        .json(&purchase_body())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["state"], "pending");
    assert_eq!(body["already_owned"], false);
    let payment_id = body["payment_id"].as_u64().unwrap();
    assert_eq!(body["checkout_url"], format!("https://pay.test/{}", payment_id));

    let response = server.get("/api/payments/7").add_header(header::AUTHORIZATION, bearer("alice")).await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["state"], "pending");
    assert_eq!(body["payment"]["external_reference"], format!("CHG-{}", payment_id));

    let notice = json!({ "payment_id": payment_id, "state": "approved" }).to_string();
    let response = server
        .post("/api/payments/webhook")
        .add_header(signature_header(), signature(&notice))
        .text(notice.clone())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["outcome"], "applied");
    assert_eq!(body["state"], "approved");

    // Replay is acknowledged without a second transition
    let response = server
        .post("/api/payments/webhook")
        .add_header(signature_header(), signature(&notice))
        .text(notice)
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["outcome"], "unchanged");

    let response = server
        .get("/api/courses/7/access")
        .add_header(header::AUTHORIZATION, bearer("alice"))
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["has_access"], true);

    let response = server
        .get("/api/courses/7/access")
        .add_header(header::AUTHORIZATION, bearer("bob"))
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["has_access"], false);

    let response = server
        .post("/api/payments")
        .add_header(header::AUTHORIZATION, bearer("alice"))
        .json(&purchase_body())
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["already_owned"], true);
    assert_eq!(body["payment_id"].as_u64().unwrap(), payment_id);
}

// ============ Webhooks ============

#[tokio::test]
async fn test_generic_webhook_signature_enforced_in_production() {
    let server = create_test_server(CheckoutConfig::default(), Some(SECRET));
    let notice = json!({ "payment_id": 1, "state": "approved" }).to_string();

    let response = server.post("/api/payments/webhook").text(notice.clone()).await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = server
        .post("/api/payments/webhook")
        .add_header(signature_header(), HeaderValue::from_static("deadbeef"))
        .text(notice.clone())
        .await;
    response.assert_status(StatusCode::UNAUTHORIZED);

    let response = server
        .post("/api/payments/webhook")
        .add_header(signature_header(), signature(&notice))
        .text(notice)
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    assert_eq!(body["outcome"], "unmatched");
}

#[tokio::test]
async fn test_generic_webhook_without_secret_in_production() {
    let server = create_test_server(CheckoutConfig::default(), None);
    let notice = json!({ "payment_id": 1, "state": "approved" }).to_string();

    let response = server.post("/api/payments/webhook").text(notice).await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_generic_webhook_malformed_body() {
    let server = create_test_server(CheckoutConfig::development(), None);

    let response = server.post("/api/payments/webhook").text("not json").await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server
        .post("/api/payments/webhook")
        .text(json!({ "payment_id": 1, "state": "refunded" }).to_string())
        .await;
    response.assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unconfigured_provider_webhooks() {
    let server = create_test_server(CheckoutConfig::development(), None);

    let response = server.post("/api/payments/paypal/webhook").text("{}").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);

    let response = server.post("/api/payments/coinbase/webhook").text("{}").await;
    response.assert_status(StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = response.json();
    assert_eq!(body["code"], "PAYMENTS_DISABLED");
}

// ============ Capture callback ============

#[tokio::test]
async fn test_capture_callback_redirects_to_failure() {
    let server = create_test_server(CheckoutConfig::development(), None);

    let response = server.get("/api/payments/paypal/callback").await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "https://shop.test/payments/failed");

    let response = server
        .get("/api/payments/paypal/callback?payment_id=55&course_id=7&token=EC-1")
        .await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(
        response.header("location"),
        "https://shop.test/payments/failed?payment_id=55"
    );

    let response = server
        .get("/api/payments/paypal/callback?payment_id=abc")
        .await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "https://shop.test/payments/failed");
}

#[tokio::test]
async fn test_capture_callback_redirects_to_course() {
    let server = create_test_server(CheckoutConfig::development(), None);

    let response = server
        .post("/api/payments")
        .add_header(header::AUTHORIZATION, bearer("alice"))
        .json(&json!({ "course_id": 7, "amount": "49.00", "method": "paypal" }))
        .await;
    response.assert_status_ok();
    let body: serde_json::Value = response.json();
    let payment_id = body["payment_id"].as_u64().unwrap();

    let response = server
        .get(&format!(
            "/api/payments/paypal/callback?payment_id={}&course_id=7&token=ORDER-{}",
            payment_id, payment_id
        ))
        .await;
    response.assert_status(StatusCode::SEE_OTHER);
    assert_eq!(response.header("location"), "https://shop.test/courses/7");

    let response = server
        .get("/api/courses/7/access")
        .add_header(header::AUTHORIZATION, bearer("alice"))
        .await;
    let body: serde_json::Value = response.json();
    assert_eq!(body["has_access"], true);
}
