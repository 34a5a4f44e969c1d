//! Provider Event Tables
//!
//! Fixed mappings from provider signals (webhook event types, order and
//! capture statuses) to ledger states. Anything not listed maps to `None`
//! and is acknowledged without effect.

use serde::{Deserialize, Serialize};

use crate::model::{PaymentId, PaymentMethod, PaymentState};

/// Provider that delivered a webhook
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookSource {
    PayPal,
    Coinbase,
    Stripe,
}

impl WebhookSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookSource::PayPal => "paypal",
            WebhookSource::Coinbase => "coinbase",
            WebhookSource::Stripe => "stripe",
        }
    }
    
    /// Source whose webhooks may settle payments of `method`
    pub fn for_method(method: PaymentMethod) -> Option<Self> {
        match method {
            PaymentMethod::PayPal => Some(WebhookSource::PayPal),
            PaymentMethod::Coinbase => Some(WebhookSource::Coinbase),
            PaymentMethod::Stripe => Some(WebhookSource::Stripe),
            PaymentMethod::Dev | PaymentMethod::Card | PaymentMethod::BankTransfer => None,
        }
    }
    
    /// Target state for a webhook event type
    pub fn event_target(&self, event_type: &str) -> Option<PaymentState> {
        match self {
            WebhookSource::PayPal => match event_type {
                // An approved order has not been captured; it stays pending
                "PAYMENT.CAPTURE.COMPLETED" | "CHECKOUT.ORDER.COMPLETED" => {
                    Some(PaymentState::Approved)
                }
                "PAYMENT.CAPTURE.DECLINED" | "PAYMENT.CAPTURE.DENIED" => Some(PaymentState::Rejected),
                _ => None,
            },
            WebhookSource::Coinbase => match event_type {
                "charge:confirmed" => Some(PaymentState::Approved),
                "charge:failed" => Some(PaymentState::Rejected),
                _ => None,
            },
            WebhookSource::Stripe => match event_type {
                "checkout.session.completed" | "checkout.session.async_payment_succeeded" => {
                    Some(PaymentState::Approved)
                }
                "checkout.session.async_payment_failed" | "checkout.session.expired" => {
                    Some(PaymentState::Rejected)
                }
                _ => None,
            },
        }
    }
}

/// Target state for a PayPal order or capture status.
///
/// `APPROVED` means the buyer consented but no funds moved, so only
/// `COMPLETED` settles the payment.
pub fn paypal_status_target(status: &str) -> Option<PaymentState> {
    match status.to_uppercase().as_str() {
        "COMPLETED" => Some(PaymentState::Approved),
        "DECLINED" | "FAILED" | "VOIDED" => Some(PaymentState::Rejected),
        _ => None,
    }
}

/// A webhook normalized by its provider-specific parser
#[derive(Clone, Debug, PartialEq)]
pub struct ProviderEvent {
    pub source: WebhookSource,
    pub event_type: String,
    
    /// Provider reference (order id, charge code, session id)
    pub reference: Option<String>,
    
    /// Local payment id carried in provider metadata, used when the reference is unknown
    pub payment_id: Option<PaymentId>,
}

impl ProviderEvent {
    pub fn target(&self) -> Option<PaymentState> {
        self.source.event_target(&self.event_type)
    }
}
