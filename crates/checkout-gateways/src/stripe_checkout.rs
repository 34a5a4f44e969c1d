//! Stripe Checkout Integration
//!
//! Hosted Checkout Session in payment mode: one line item priced from the
//! ledger row, `client_reference_id` set to the payment id. Confirmation
//! arrives by webhook, verified with the `Stripe-Signature` header.

use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use stripe::{
    CheckoutSession, CheckoutSessionMode, Client, CreateCheckoutSession,
    CreateCheckoutSessionLineItems, CreateCheckoutSessionLineItemsPriceData,
    CreateCheckoutSessionLineItemsPriceDataProductData, Currency, Event, EventObject, EventType,
    StripeError, Webhook,
};

use checkout_core::{
    CheckoutError, Course, Initiation, Payment, PaymentId, ProviderAdapter, ProviderEvent, Result,
    WebhookSource,
};

use crate::http::{optional_env, required_env};

/// Header carrying the webhook signature
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Stripe client wrapper
pub struct StripeAdapter {
    client: Client,
    webhook_secret: Option<String>,
    frontend_url: String,
}

impl StripeAdapter {
    pub fn new(secret_key: &str, webhook_secret: Option<String>, frontend_url: &str) -> Self {
        Self {
            client: Client::new(secret_key),
            webhook_secret,
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
        }
    }

    /// Create from `STRIPE_SECRET_KEY` and `STRIPE_WEBHOOK_SECRET`
    pub fn from_env(frontend_url: &str) -> Result<Self> {
        let secret_key = required_env("STRIPE_SECRET_KEY")?;
        Ok(Self::new(
            &secret_key,
            optional_env("STRIPE_WEBHOOK_SECRET"),
            frontend_url,
        ))
    }

    /// Whether a webhook secret is configured
    pub fn can_verify(&self) -> bool {
        self.webhook_secret.is_some()
    }

    /// Verify the signature and parse the event
    pub fn verify_webhook(&self, payload: &str, signature: &str) -> Result<ProviderEvent> {
        let secret = self
            .webhook_secret
            .as_deref()
            .ok_or_else(|| CheckoutError::Config("STRIPE_WEBHOOK_SECRET not set".into()))?;
        let event = Webhook::construct_event(payload, signature, secret)
            .map_err(|e| CheckoutError::WebhookSignature(e.to_string()))?;
        Ok(normalize(&event))
    }
}

/// Parse an unsigned event body (development only)
pub fn parse_webhook(payload: &str) -> Result<ProviderEvent> {
    let event: Event = serde_json::from_str(payload)
        .map_err(|e| CheckoutError::WebhookParse(format!("stripe: {}", e)))?;
    Ok(normalize(&event))
}

fn event_name(event_type: &EventType) -> String {
    match event_type {
        EventType::CheckoutSessionCompleted => "checkout.session.completed".into(),
        EventType::CheckoutSessionAsyncPaymentSucceeded => {
            "checkout.session.async_payment_succeeded".into()
        }
        EventType::CheckoutSessionAsyncPaymentFailed => "checkout.session.async_payment_failed".into(),
        EventType::CheckoutSessionExpired => "checkout.session.expired".into(),
        other => format!("{:?}", other),
    }
}

fn normalize(event: &Event) -> ProviderEvent {
    let (reference, payment_id) = match &event.data.object {
        EventObject::CheckoutSession(session) => (
            Some(session.id.to_string()),
            session
                .client_reference_id
                .as_deref()
                .and_then(|id| id.parse().ok())
                .map(PaymentId),
        ),
        _ => (None, None),
    };

    ProviderEvent {
        source: WebhookSource::Stripe,
        event_type: event_name(&event.type_),
        reference,
        payment_id,
    }
}

/// Smallest currency unit for two-decimal currencies
fn to_cents(amount: Decimal) -> Result<i64> {
    (amount * Decimal::ONE_HUNDRED)
        .round()
        .to_i64()
        .ok_or_else(|| CheckoutError::InvalidAmount(format!("{} does not fit in cents", amount)))
}

fn to_currency(code: &str) -> Result<Currency> {
    serde_json::from_value(serde_json::Value::String(code.to_lowercase()))
        .map_err(|_| CheckoutError::InvalidCurrency(code.to_string()))
}

fn map_stripe_error(err: StripeError) -> CheckoutError {
    match err {
        StripeError::Stripe(request) if request.http_status < 500 => CheckoutError::ProviderRejected(
            format!("stripe answered {}: {}", request.http_status, request.message.unwrap_or_default()),
        ),
        other => CheckoutError::ProviderUnavailable(format!("stripe: {}", other)),
    }
}

#[async_trait]
impl ProviderAdapter for StripeAdapter {
    fn name(&self) -> &str {
        "stripe"
    }

    async fn initiate(&self, payment: &Payment, course: &Course) -> Result<Initiation> {
        let success_url = format!("{}/courses/{}", self.frontend_url, payment.course_id);
        let cancel_url = format!("{}/payments/cancelled", self.frontend_url);
        let client_reference = payment.id.to_string();

        let mut params = CreateCheckoutSession::new();
        params.mode = Some(CheckoutSessionMode::Payment);
        params.success_url = Some(&success_url);
        params.cancel_url = Some(&cancel_url);
        params.client_reference_id = Some(&client_reference);

        let mut metadata = std::collections::HashMap::new();
        metadata.insert("payment_id".to_string(), payment.id.to_string());
        metadata.insert("course_id".to_string(), payment.course_id.to_string());
        metadata.insert("buyer_id".to_string(), payment.buyer_id.to_string());
        params.metadata = Some(metadata);

        params.line_items = Some(vec![CreateCheckoutSessionLineItems {
            quantity: Some(1),
            price_data: Some(CreateCheckoutSessionLineItemsPriceData {
                currency: to_currency(&payment.currency)?,
                unit_amount: Some(to_cents(payment.amount)?),
                product_data: Some(CreateCheckoutSessionLineItemsPriceDataProductData {
                    name: course.title.clone(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            ..Default::default()
        }]);

        let session = CheckoutSession::create(&self.client, params)
            .await
            .map_err(map_stripe_error)?;

        let checkout_url = session
            .url
            .ok_or_else(|| CheckoutError::ProviderRejected("No checkout URL returned".into()))?;

        tracing::info!(payment_id = %payment.id, session_id = %session.id, "Stripe checkout session created");
        Ok(Initiation {
            reference: Some(session.id.to_string()),
            checkout_url: Some(checkout_url),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cents_conversion() {
        assert_eq!(to_cents(dec!(29.99)).unwrap(), 2999);
        assert_eq!(to_cents(dec!(10)).unwrap(), 1000);
        assert_eq!(to_cents(dec!(0.005)).unwrap(), 0);
    }

    #[test]
    fn test_currency_lookup() {
        assert_eq!(to_currency("USD").unwrap(), Currency::USD);
        assert!(matches!(to_currency("ZZZ"), Err(CheckoutError::InvalidCurrency(_))));
    }

    #[test]
    fn test_verify_requires_secret() {
        let adapter = StripeAdapter::new("sk_test_x", None, "http://localhost:3000");
        assert!(!adapter.can_verify());
        assert!(matches!(
            adapter.verify_webhook("{}", "t=1,v1=abc"),
            Err(CheckoutError::Config(_))
        ));
    }
}
