//! Confirmation Channel
//!
//! Moves pending payments to a terminal state from three inputs: provider
//! webhooks, reconciliation during a status poll, and the buyer returning
//! from a redirect checkout. All of them settle through [`Settlement`], so a
//! payment that is already terminal is never changed again.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{CheckoutError, Result};
use crate::events::{ProviderEvent, WebhookSource};
use crate::ledger::Transition;
use crate::model::{CourseId, Payment, PaymentId, PaymentState};
use crate::provider::{bounded, ProviderRegistry};
use crate::settle::Settlement;

/// Result of ingesting a webhook
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// The payment changed state
    Applied {
        payment_id: PaymentId,
        state: PaymentState,
    },

    /// The payment was already terminal (or the notification asked for no change)
    Unchanged {
        payment_id: PaymentId,
        state: PaymentState,
    },

    /// Event type has no mapping
    Ignored { event_type: String },

    /// No payment matched the event
    Unmatched,
}

impl WebhookOutcome {
    fn from_transition(transition: &Transition) -> Self {
        let payment = transition.payment();
        if transition.is_applied() {
            WebhookOutcome::Applied {
                payment_id: payment.id,
                state: payment.state,
            }
        } else {
            WebhookOutcome::Unchanged {
                payment_id: payment.id,
                state: payment.state,
            }
        }
    }
}

/// Notification from the generic webhook endpoint
#[derive(Clone, Debug, Deserialize)]
pub struct GenericNotification {
    pub payment_id: PaymentId,
    pub state: String,
    #[serde(default)]
    pub external_reference: Option<String>,
}

/// Query parameters of the redirect-checkout return URL
#[derive(Clone, Debug, Default, Deserialize)]
pub struct CaptureReturn {
    pub payment_id: Option<PaymentId>,
    pub course_id: Option<CourseId>,
    pub token: Option<String>,
}

/// Where to send the buyer after a capture attempt
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaptureRedirect {
    /// Purchase is approved; show the course
    Course(CourseId),

    /// Anything else; the payment id is included when known
    Failed(Option<PaymentId>),
}

/// Applies provider confirmations to the ledger
#[derive(Clone)]
pub struct ConfirmationChannel {
    settlement: Settlement,
    registry: Arc<ProviderRegistry>,
    provider_timeout: Duration,
}

impl ConfirmationChannel {
    pub fn new(
        settlement: Settlement,
        registry: Arc<ProviderRegistry>,
        provider_timeout: Duration,
    ) -> Self {
        Self {
            settlement,
            registry,
            provider_timeout,
        }
    }

    /// Apply a parsed provider webhook
    pub async fn ingest(&self, event: ProviderEvent) -> Result<WebhookOutcome> {
        let Some(target) = event.target() else {
            tracing::info!(
                source = event.source.as_str(),
                event_type = %event.event_type,
                "Unhandled webhook event type"
            );
            return Ok(WebhookOutcome::Ignored {
                event_type: event.event_type,
            });
        };

        let Some(payment) = self.locate(&event).await? else {
            tracing::warn!(
                source = event.source.as_str(),
                event_type = %event.event_type,
                reference = ?event.reference,
                payment_id = ?event.payment_id,
                "Webhook matched no payment"
            );
            return Ok(WebhookOutcome::Unmatched);
        };

        let transition = self
            .settlement
            .settle(
                payment.id,
                target,
                event.reference.as_deref(),
                event.source.as_str(),
            )
            .await?;

        Ok(WebhookOutcome::from_transition(&transition))
    }

    /// Find the payment an event refers to: by reference, then by the
    /// payment id from provider metadata when the method agrees.
    async fn locate(&self, event: &ProviderEvent) -> Result<Option<Payment>> {
        let ledger = self.settlement.ledger();

        if let Some(reference) = event.reference.as_deref().filter(|r| !r.is_empty()) {
            if let Some(payment) = ledger.find_by_reference(reference).await? {
                return Ok(Some(payment));
            }
        }

        let Some(id) = event.payment_id else {
            return Ok(None);
        };

        match ledger.get(id).await? {
            Some(payment) if WebhookSource::for_method(payment.method) == Some(event.source) => {
                Ok(Some(payment))
            }
            Some(payment) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    method = %payment.method,
                    source = event.source.as_str(),
                    "Webhook metadata points at a payment of another method"
                );
                Ok(None)
            }
            None => Ok(None),
        }
    }

    /// Apply a notification from the generic endpoint
    pub async fn ingest_generic(&self, notice: GenericNotification) -> Result<WebhookOutcome> {
        let target: PaymentState = notice.state.parse()?;
        let reference = notice
            .external_reference
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty());
        let ledger = self.settlement.ledger();

        let Some(payment) = ledger.get(notice.payment_id).await? else {
            tracing::warn!(payment_id = %notice.payment_id, "Generic webhook for unknown payment");
            return Ok(WebhookOutcome::Unmatched);
        };

        if target == PaymentState::Pending {
            let payment = match reference {
                Some(reference) if payment.is_pending() => {
                    ledger.set_reference(payment.id, reference).await?
                }
                _ => payment,
            };
            return Ok(WebhookOutcome::Unchanged {
                payment_id: payment.id,
                state: payment.state,
            });
        }

        let transition = self
            .settlement
            .settle(payment.id, target, reference, "webhook")
            .await?;

        Ok(WebhookOutcome::from_transition(&transition))
    }

    /// Ask the provider about a pending payment and record an approval.
    ///
    /// Provider failures are logged; the payment is returned as stored.
    pub async fn reconcile(&self, payment: Payment) -> Payment {
        if !payment.is_pending() || !payment.has_reference() {
            return payment;
        }
        let Some(adapter) = self.registry.get(payment.method) else {
            return payment;
        };
        if !adapter.supports_reconcile() {
            return payment;
        }

        match bounded(self.provider_timeout, adapter.name(), adapter.reconcile(&payment)).await {
            Ok(Some(PaymentState::Approved)) => {
                match self
                    .settlement
                    .settle(payment.id, PaymentState::Approved, None, "reconciliation")
                    .await
                {
                    Ok(transition) => transition.into_payment(),
                    Err(e) => {
                        tracing::warn!(payment_id = %payment.id, error = %e, "Could not record reconciled approval");
                        payment
                    }
                }
            }
            Ok(reported) => {
                tracing::debug!(payment_id = %payment.id, reported = ?reported, "Provider has not approved payment yet");
                payment
            }
            Err(e) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    provider = adapter.name(),
                    error = %e,
                    "Reconciliation failed"
                );
                payment
            }
        }
    }

    /// Handle the buyer's return from a redirect checkout.
    ///
    /// Never fails; every problem becomes a failure redirect.
    pub async fn capture_return(&self, params: CaptureReturn) -> CaptureRedirect {
        let Some(id) = params.payment_id else {
            tracing::warn!("Capture return without payment id");
            return CaptureRedirect::Failed(None);
        };
        let failed = CaptureRedirect::Failed(Some(id));

        let Some(token) = params.token.filter(|t| !t.trim().is_empty()) else {
            tracing::warn!(payment_id = %id, "Capture return without token");
            return failed;
        };

        let payment = match self.settlement.ledger().get(id).await {
            Ok(Some(payment)) => payment,
            Ok(None) => {
                tracing::warn!(payment_id = %id, "Capture return for unknown payment");
                return failed;
            }
            Err(e) => {
                tracing::error!(payment_id = %id, error = %e, "Ledger lookup failed during capture");
                return failed;
            }
        };

        if let Some(course_id) = params.course_id {
            if course_id != payment.course_id {
                tracing::warn!(
                    payment_id = %id,
                    claimed = %course_id,
                    actual = %payment.course_id,
                    "Capture return course does not match payment"
                );
            }
        }

        match payment.state {
            PaymentState::Approved => return CaptureRedirect::Course(payment.course_id),
            PaymentState::Rejected => return failed,
            PaymentState::Pending => {}
        }

        if payment.has_reference() && payment.external_reference != token {
            tracing::warn!(payment_id = %id, "Capture token does not match stored reference");
            return failed;
        }

        let Some(adapter) = self
            .registry
            .get(payment.method)
            .filter(|adapter| adapter.supports_capture())
        else {
            tracing::warn!(payment_id = %id, method = %payment.method, "Method does not support capture");
            return failed;
        };

        let target = match bounded(
            self.provider_timeout,
            adapter.name(),
            adapter.capture(&payment, &token),
        )
        .await
        {
            Ok(Some(target)) => target,
            Ok(None) => {
                tracing::info!(payment_id = %id, "Capture did not reach a final status");
                return failed;
            }
            Err(e) => {
                tracing::warn!(payment_id = %id, provider = adapter.name(), error = %e, "Capture failed");
                return failed;
            }
        };

        match self
            .settlement
            .settle(id, target, Some(&token), "capture")
            .await
        {
            Ok(transition) if transition.payment().is_approved() => {
                CaptureRedirect::Course(payment.course_id)
            }
            Ok(_) => failed,
            Err(e) => {
                tracing::error!(payment_id = %id, error = %e, "Could not record capture result");
                failed
            }
        }
    }
}

/// Parse a generic notification body
pub fn parse_generic(body: &[u8]) -> Result<GenericNotification> {
    serde_json::from_slice(body)
        .map_err(|e| CheckoutError::WebhookParse(format!("invalid notification: {}", e)))
}
