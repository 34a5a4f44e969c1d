//! Coinbase Commerce Hosted Charge
//!
//! A charge is created up front and the buyer pays on Coinbase's hosted page.
//! Confirmation arrives only by webhook, signed with a shared secret.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Value};

use checkout_core::{
    CheckoutError, Course, Initiation, Payment, PaymentId, ProviderAdapter, ProviderEvent, Result,
    WebhookSource,
};

use crate::http::{self, expect_success, optional_env, required_env, transport};
use crate::signature;

const DEFAULT_API: &str = "https://api.commerce.coinbase.com";
const API_VERSION: &str = "2018-03-22";

/// Header carrying the webhook signature
pub const SIGNATURE_HEADER: &str = "x-cc-webhook-signature";

/// Coinbase Commerce credentials and URLs
#[derive(Clone, Debug)]
pub struct CoinbaseConfig {
    pub api_key: String,

    /// Shared secret for webhook signatures
    pub webhook_secret: Option<String>,

    pub api_base: String,

    /// Storefront root, used for the redirect and cancel URLs
    pub frontend_url: String,
}

impl CoinbaseConfig {
    /// Read `COINBASE_API_KEY`, `COINBASE_WEBHOOK_SECRET` and `COINBASE_API_BASE`
    pub fn from_env(frontend_url: &str) -> Result<Self> {
        Ok(Self {
            api_key: required_env("COINBASE_API_KEY")?,
            webhook_secret: optional_env("COINBASE_WEBHOOK_SECRET"),
            api_base: optional_env("COINBASE_API_BASE")
                .unwrap_or_else(|| DEFAULT_API.to_string())
                .trim_end_matches('/')
                .to_string(),
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct ChargeEnvelope {
    data: Charge,
}

#[derive(Debug, Deserialize)]
struct Charge {
    #[serde(default)]
    code: String,
    #[serde(default)]
    hosted_url: String,
}

/// Coinbase Commerce charges client
pub struct CoinbaseAdapter {
    http: reqwest::Client,
    config: CoinbaseConfig,
}

impl CoinbaseAdapter {
    pub fn new(config: CoinbaseConfig, timeout: std::time::Duration) -> Result<Self> {
        Ok(Self {
            http: http::client(timeout)?,
            config,
        })
    }

    /// Whether a webhook secret is configured
    pub fn can_verify(&self) -> bool {
        self.config.webhook_secret.is_some()
    }

    /// Check `X-CC-Webhook-Signature` against the raw body
    pub fn verify_webhook(&self, body: &[u8], signature: &str) -> Result<()> {
        let secret = self
            .config
            .webhook_secret
            .as_deref()
            .ok_or_else(|| CheckoutError::Config("COINBASE_WEBHOOK_SECRET not set".into()))?;
        signature::verify_hex(secret, body, signature)
    }

    fn charge_body(&self, payment: &Payment, course: &Course) -> Value {
        json!({
            "name": course.title,
            "description": format!("Course #{}: {}", course.id, course.title),
            "pricing_type": "fixed_price",
            "local_price": {
                "amount": format!("{:.2}", payment.amount.round_dp(2)),
                "currency": payment.currency,
            },
            "metadata": {
                "payment_id": payment.id.to_string(),
                "course_id": payment.course_id.to_string(),
                "buyer_id": payment.buyer_id.to_string(),
            },
            "redirect_url": format!("{}/courses/{}", self.config.frontend_url, payment.course_id),
            "cancel_url": format!("{}/payments/cancelled", self.config.frontend_url),
        })
    }
}

/// Normalize a Coinbase Commerce webhook body
pub fn parse_webhook(body: &[u8]) -> Result<ProviderEvent> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| CheckoutError::WebhookParse(format!("coinbase: {}", e)))?;
    let event = &value["event"];
    let event_type = event["type"]
        .as_str()
        .ok_or_else(|| CheckoutError::WebhookParse("coinbase: missing event.type".into()))?
        .to_string();

    let data = &event["data"];
    let payment_id = match &data["metadata"]["payment_id"] {
        Value::String(id) => id.parse().ok(),
        Value::Number(id) => id.as_u64(),
        _ => None,
    }
    .map(PaymentId);

    Ok(ProviderEvent {
        source: WebhookSource::Coinbase,
        event_type,
        reference: data["code"].as_str().map(str::to_string),
        payment_id,
    })
}

#[async_trait]
impl ProviderAdapter for CoinbaseAdapter {
    fn name(&self) -> &str {
        "coinbase"
    }

    async fn initiate(&self, payment: &Payment, course: &Course) -> Result<Initiation> {
        let response = self
            .http
            .post(format!("{}/charges", self.config.api_base))
            .header("X-CC-Api-Key", &self.config.api_key)
            .header("X-CC-Version", API_VERSION)
            .json(&self.charge_body(payment, course))
            .send()
            .await
            .map_err(|e| transport("coinbase", &e))?;

        let response = expect_success("coinbase", response).await?;
        if response.status() != StatusCode::CREATED {
            return Err(CheckoutError::ProviderRejected(format!(
                "coinbase answered {} instead of 201 Created",
                response.status()
            )));
        }

        let envelope: ChargeEnvelope = response.json().await.map_err(|e| transport("coinbase", &e))?;
        let charge = envelope.data;
        if charge.code.is_empty() || charge.hosted_url.is_empty() {
            return Err(CheckoutError::ProviderRejected(
                "coinbase charge without code or hosted_url".into(),
            ));
        }

        tracing::info!(payment_id = %payment.id, charge_code = %charge.code, "Coinbase charge created");
        Ok(Initiation {
            reference: Some(charge.code),
            checkout_url: Some(charge.hosted_url),
        })
    }
}
