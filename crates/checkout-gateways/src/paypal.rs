//! PayPal Redirect Checkout
//!
//! Orders v2 with intent `CAPTURE`. The buyer approves on PayPal, returns to
//! the capture callback, and the order is captured there. Webhooks and status
//! polls confirm the same order when the buyer never comes back.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use checkout_core::{
    paypal_status_target, CheckoutError, Course, Initiation, Payment, PaymentId, PaymentState,
    ProviderAdapter, ProviderEvent, Result, WebhookSource,
};

use crate::http::{self, expect_success, optional_env, required_env, transport};

const SANDBOX_API: &str = "https://api-m.sandbox.paypal.com";
const LIVE_API: &str = "https://api-m.paypal.com";

/// Seconds shaved off the token lifetime before it is refreshed
const TOKEN_EXPIRY_MARGIN_SECS: i64 = 60;

/// Issue name PayPal returns when capturing a captured order
const ALREADY_CAPTURED: &str = "ORDER_ALREADY_CAPTURED";

/// PayPal credentials and URLs
#[derive(Clone, Debug)]
pub struct PayPalConfig {
    pub client_id: String,
    pub client_secret: String,

    /// REST API root (sandbox, live, or a test server)
    pub api_base: String,

    /// Webhook id used for signature verification
    pub webhook_id: Option<String>,

    /// Public root of this service, used for the return URL
    pub public_base_url: String,

    /// Storefront root, used for the cancel URL
    pub frontend_url: String,
}

impl PayPalConfig {
    /// Read `PAYPAL_CLIENT_ID`, `PAYPAL_CLIENT_SECRET`, `PAYPAL_MODE`,
    /// `PAYPAL_API_BASE` and `PAYPAL_WEBHOOK_ID`
    pub fn from_env(public_base_url: &str, frontend_url: &str) -> Result<Self> {
        let client_id = required_env("PAYPAL_CLIENT_ID")?;
        let client_secret = required_env("PAYPAL_CLIENT_SECRET")?;
        let api_base = optional_env("PAYPAL_API_BASE").unwrap_or_else(|| {
            match optional_env("PAYPAL_MODE").as_deref() {
                Some("live") => LIVE_API.to_string(),
                _ => SANDBOX_API.to_string(),
            }
        });

        Ok(Self {
            client_id,
            client_secret,
            api_base: api_base.trim_end_matches('/').to_string(),
            webhook_id: optional_env("PAYPAL_WEBHOOK_ID"),
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
            frontend_url: frontend_url.trim_end_matches('/').to_string(),
        })
    }
}

/// HATEOAS link from an order response
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Link {
    pub href: String,
    pub rel: String,
    #[serde(default)]
    pub method: Option<String>,
}

impl Link {
    fn is_navigable(&self) -> bool {
        matches!(
            self.method.as_deref().map(str::to_uppercase).as_deref(),
            Some("GET" | "REDIRECT")
        )
    }
}

/// Pick the buyer-facing approval URL from an order's links.
///
/// Precedence: `approve` (or legacy `approval_url`), then `payer-action`, then
/// a GET/REDIRECT link whose href mentions `checkout`, then any GET/REDIRECT
/// link on `paypal.com`.
pub fn select_approval_link(links: &[Link]) -> Option<&str> {
    let by_rel = |rels: &[&str]| {
        links
            .iter()
            .find(|l| rels.iter().any(|r| l.rel.eq_ignore_ascii_case(r)))
    };

    by_rel(&["approve", "approval_url"])
        .or_else(|| by_rel(&["payer-action"]))
        .or_else(|| {
            links
                .iter()
                .find(|l| l.is_navigable() && l.href.contains("checkout"))
        })
        .or_else(|| {
            links
                .iter()
                .find(|l| l.is_navigable() && l.href.contains("paypal.com"))
        })
        .map(|l| l.href.as_str())
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_token_lifetime")]
    expires_in: i64,
}

fn default_token_lifetime() -> i64 {
    3600
}

#[derive(Debug, Deserialize)]
struct Order {
    id: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    links: Vec<Link>,
}

/// Transmission headers PayPal attaches to every webhook delivery
#[derive(Clone, Debug, Serialize)]
pub struct PayPalTransmission {
    pub auth_algo: String,
    pub cert_url: String,
    pub transmission_id: String,
    pub transmission_sig: String,
    pub transmission_time: String,
}

impl PayPalTransmission {
    /// Extract the `PAYPAL-*` headers; `None` if any is missing
    pub fn from_headers(headers: &HeaderMap) -> Option<Self> {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Some(Self {
            auth_algo: get("paypal-auth-algo")?,
            cert_url: get("paypal-cert-url")?,
            transmission_id: get("paypal-transmission-id")?,
            transmission_sig: get("paypal-transmission-sig")?,
            transmission_time: get("paypal-transmission-time")?,
        })
    }
}

/// PayPal Orders v2 client
pub struct PayPalAdapter {
    http: reqwest::Client,
    config: PayPalConfig,
    token: RwLock<Option<(String, DateTime<Utc>)>>,
}

impl PayPalAdapter {
    pub fn new(config: PayPalConfig, timeout: std::time::Duration) -> Result<Self> {
        Ok(Self {
            http: http::client(timeout)?,
            config,
            token: RwLock::new(None),
        })
    }

    pub fn config(&self) -> &PayPalConfig {
        &self.config
    }

    /// Whether a webhook id is configured for signature verification
    pub fn can_verify(&self) -> bool {
        self.config.webhook_id.is_some()
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_base, path)
    }

    /// Cached client-credentials token, refreshed shortly before it expires
    async fn access_token(&self) -> Result<String> {
        if let Some((token, expires_at)) = &*self.token.read().await {
            if *expires_at > Utc::now() {
                return Ok(token.clone());
            }
        }

        let response = self
            .http
            .post(self.url("/v1/oauth2/token"))
            .basic_auth(&self.config.client_id, Some(&self.config.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| transport("paypal", &e))?;

        // Any failure to authenticate leaves us unable to reach PayPal
        let response = expect_success("paypal", response)
            .await
            .map_err(|e| CheckoutError::ProviderUnavailable(e.to_string()))?;
        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| CheckoutError::ProviderUnavailable(format!("paypal token: {}", e)))?;

        let lifetime = (body.expires_in - TOKEN_EXPIRY_MARGIN_SECS).max(0);
        let expires_at = Utc::now() + chrono::Duration::seconds(lifetime);
        *self.token.write().await = Some((body.access_token.clone(), expires_at));

        tracing::debug!(expires_in = body.expires_in, "PayPal access token refreshed");
        Ok(body.access_token)
    }

    fn order_body(&self, payment: &Payment, course: &Course) -> Value {
        json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": format!("payment_{}", payment.id),
                "custom_id": payment.id.to_string(),
                "description": course.title,
                "amount": {
                    "currency_code": payment.currency,
                    "value": format!("{:.2}", payment.amount.round_dp(2)),
                },
            }],
            "application_context": {
                "return_url": format!(
                    "{}/api/payments/paypal/callback?payment_id={}&course_id={}",
                    self.config.public_base_url, payment.id, payment.course_id
                ),
                "cancel_url": format!("{}/payments/cancelled", self.config.frontend_url),
                "user_action": "PAY_NOW",
                "shipping_preference": "NO_SHIPPING",
            },
        })
    }

    /// Current order status mapped to a ledger state
    async fn order_status(&self, payment: &Payment, order_id: &str) -> Result<Option<PaymentState>> {
        let request = self.http.get(self.url(&format!("/v2/checkout/orders/{}", order_id)));
        let order = self.send_order(request).await?;

        tracing::debug!(payment_id = %payment.id, order_id = %order.id, status = %order.status, "PayPal order status");
        Ok(paypal_status_target(&order.status))
    }

    async fn send_order(&self, request: reqwest::RequestBuilder) -> Result<Order> {
        let token = self.access_token().await?;
        let response = request
            .bearer_auth(token)
            .send()
            .await
            .map_err(|e| transport("paypal", &e))?;
        let response = expect_success("paypal", response).await?;
        response.json().await.map_err(|e| transport("paypal", &e))
    }

    /// Confirm a webhook delivery with PayPal's verification API
    pub async fn verify_webhook(&self, transmission: &PayPalTransmission, body: &[u8]) -> Result<()> {
        let webhook_id = self
            .config
            .webhook_id
            .as_deref()
            .ok_or_else(|| CheckoutError::Config("PAYPAL_WEBHOOK_ID not set".into()))?;
        let event: Value = serde_json::from_slice(body)
            .map_err(|e| CheckoutError::WebhookParse(e.to_string()))?;

        let token = self.access_token().await?;
        let response = self
            .http
            .post(self.url("/v1/notifications/verify-webhook-signature"))
            .bearer_auth(token)
            .json(&json!({
                "auth_algo": transmission.auth_algo,
                "cert_url": transmission.cert_url,
                "transmission_id": transmission.transmission_id,
                "transmission_sig": transmission.transmission_sig,
                "transmission_time": transmission.transmission_time,
                "webhook_id": webhook_id,
                "webhook_event": event,
            }))
            .send()
            .await
            .map_err(|e| transport("paypal", &e))?;
        let response = expect_success("paypal", response).await?;
        let verdict: Value = response.json().await.map_err(|e| transport("paypal", &e))?;

        match verdict["verification_status"].as_str() {
            Some("SUCCESS") => Ok(()),
            other => Err(CheckoutError::WebhookSignature(format!(
                "paypal verification status {:?}",
                other
            ))),
        }
    }
}

/// Normalize a PayPal webhook body.
///
/// Capture events carry the capture id as `resource.id`; the order id lives in
/// `supplementary_data.related_ids.order_id`. The local payment id comes from
/// `custom_id` or the `payment_<id>` purchase unit reference.
pub fn parse_webhook(body: &[u8]) -> Result<ProviderEvent> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| CheckoutError::WebhookParse(format!("paypal: {}", e)))?;
    let event_type = value["event_type"]
        .as_str()
        .ok_or_else(|| CheckoutError::WebhookParse("paypal: missing event_type".into()))?
        .to_string();

    let resource = &value["resource"];
    let reference = resource["supplementary_data"]["related_ids"]["order_id"]
        .as_str()
        .or_else(|| resource["id"].as_str())
        .map(str::to_string);

    let unit = &resource["purchase_units"][0];
    let payment_id = resource["custom_id"]
        .as_str()
        .or_else(|| unit["custom_id"].as_str())
        .and_then(|id| id.parse().ok())
        .or_else(|| {
            unit["reference_id"]
                .as_str()
                .and_then(|r| r.strip_prefix("payment_"))
                .and_then(|id| id.parse().ok())
        })
        .map(PaymentId);

    Ok(ProviderEvent {
        source: WebhookSource::PayPal,
        event_type,
        reference,
        payment_id,
    })
}

#[async_trait]
impl ProviderAdapter for PayPalAdapter {
    fn name(&self) -> &str {
        "paypal"
    }

    async fn initiate(&self, payment: &Payment, course: &Course) -> Result<Initiation> {
        let request = self
            .http
            .post(self.url("/v2/checkout/orders"))
            .json(&self.order_body(payment, course));
        let order = self.send_order(request).await?;

        let approval = select_approval_link(&order.links).ok_or_else(|| {
            tracing::warn!(
                payment_id = %payment.id,
                order_id = %order.id,
                links = ?order.links.iter().map(|l| l.rel.as_str()).collect::<Vec<_>>(),
                "PayPal order has no approval link"
            );
            CheckoutError::ProviderRejected(format!("paypal order {} has no approval link", order.id))
        })?;

        tracing::info!(payment_id = %payment.id, order_id = %order.id, status = %order.status, "PayPal order created");
        Ok(Initiation {
            reference: Some(order.id.clone()),
            checkout_url: Some(approval.to_string()),
        })
    }

    fn supports_reconcile(&self) -> bool {
        true
    }

    async fn reconcile(&self, payment: &Payment) -> Result<Option<PaymentState>> {
        self.order_status(payment, &payment.external_reference).await
    }

    fn supports_capture(&self) -> bool {
        true
    }

    async fn capture(&self, payment: &Payment, token: &str) -> Result<Option<PaymentState>> {
        let access = self.access_token().await?;
        let response = self
            .http
            .post(self.url(&format!("/v2/checkout/orders/{}/capture", token)))
            .bearer_auth(access)
            .json(&json!({}))
            .send()
            .await
            .map_err(|e| transport("paypal", &e))?;

        if response.status() == StatusCode::UNPROCESSABLE_ENTITY {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if body.contains(ALREADY_CAPTURED) {
                tracing::info!(payment_id = %payment.id, order_id = %token, "PayPal order was already captured");
                return self.order_status(payment, token).await;
            }
            return Err(http::status_error("paypal", status, &body));
        }

        let order: Order = expect_success("paypal", response)
            .await?
            .json()
            .await
            .map_err(|e| transport("paypal", &e))?;

        tracing::info!(payment_id = %payment.id, order_id = %order.id, status = %order.status, "PayPal order captured");
        Ok(paypal_status_target(&order.status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(rel: &str, href: &str, method: &str) -> Link {
        Link {
            href: href.into(),
            rel: rel.into(),
            method: Some(method.into()),
        }
    }

    #[test]
    fn test_approval_link_precedence() {
        let links = vec![
            link("self", "https://api.paypal.com/v2/checkout/orders/1", "GET"),
            link("payer-action", "https://www.paypal.com/checkoutnow?token=1", "GET"),
            link("approve", "https://www.paypal.com/approve?token=1", "GET"),
        ];
        assert_eq!(
            select_approval_link(&links),
            Some("https://www.paypal.com/approve?token=1")
        );
    }

    #[test]
    fn test_payer_action_only() {
        let links = vec![link("payer-action", "https://www.paypal.com/pay?token=2", "GET")];
        assert_eq!(
            select_approval_link(&links),
            Some("https://www.paypal.com/pay?token=2")
        );
    }

    #[test]
    fn test_fallback_links() {
        let checkout = vec![
            link("capture", "https://api.paypal.com/v2/checkout/orders/3/capture", "POST"),
            link("other", "https://www.sandbox.paypal.com/checkoutnow?token=3", "REDIRECT"),
        ];
        assert_eq!(
            select_approval_link(&checkout),
            Some("https://www.sandbox.paypal.com/checkoutnow?token=3")
        );

        let host_only = vec![link("other", "https://www.paypal.com/webapps/x", "GET")];
        assert_eq!(select_approval_link(&host_only), Some("https://www.paypal.com/webapps/x"));

        let none = vec![link("capture", "https://api.paypal.com/capture", "POST")];
        assert_eq!(select_approval_link(&none), None);
    }

    #[test]
    fn test_parse_capture_webhook() {
        let body = br#"{
            "event_type": "PAYMENT.CAPTURE.COMPLETED",
            "resource": {
                "id": "CAPTURE-9",
                "custom_id": "7",
                "supplementary_data": {"related_ids": {"order_id": "ORDER-7"}}
            }
        }"#;
        let event = parse_webhook(body).unwrap();
        assert_eq!(event.reference.as_deref(), Some("ORDER-7"));
        assert_eq!(event.payment_id, Some(PaymentId(7)));
        assert_eq!(event.target(), Some(PaymentState::Approved));
    }

    #[test]
    fn test_parse_order_webhook() {
        let body = br#"{
            "event_type": "CHECKOUT.ORDER.APPROVED",
            "resource": {"id": "ORDER-8", "purchase_units": [{"reference_id": "payment_8"}]}
        }"#;
        let event = parse_webhook(body).unwrap();
        assert_eq!(event.reference.as_deref(), Some("ORDER-8"));
        assert_eq!(event.payment_id, Some(PaymentId(8)));
        assert_eq!(event.target(), None);

        assert!(matches!(
            parse_webhook(b"{\"resource\": {}}"),
            Err(CheckoutError::WebhookParse(_))
        ));
    }

    #[test]
    fn test_transmission_headers() {
        let mut headers = HeaderMap::new();
        for (name, value) in [
            ("paypal-auth-algo", "SHA256withRSA"),
            ("paypal-cert-url", "https://api.paypal.com/cert"),
            ("paypal-transmission-id", "t-1"),
            ("paypal-transmission-sig", "sig"),
        ] {
            headers.insert(name, value.parse().unwrap());
        }
        assert!(PayPalTransmission::from_headers(&headers).is_none());

        headers.insert("paypal-transmission-time", "2026-01-01T00:00:00Z".parse().unwrap());
        let transmission = PayPalTransmission::from_headers(&headers).unwrap();
        assert_eq!(transmission.transmission_id, "t-1");
    }
}
