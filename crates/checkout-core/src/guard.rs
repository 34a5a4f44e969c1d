//! Purchase Guard
//!
//! Entry point for buying a course. Validates the request, short-circuits
//! when the buyer already owns the course, records a pending payment and
//! hands it to the provider adapter for the chosen method.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::collab::{Activity, CourseCatalog};
use crate::config::CheckoutConfig;
use crate::confirm::ConfirmationChannel;
use crate::error::{CheckoutError, Result};
use crate::model::{
    normalize_currency, CardDetails, CourseId, NewPayment, Payment, PaymentMethod, UserId,
};
use crate::provider::{bounded, ProviderRegistry};
use crate::settle::Settlement;

/// Purchase request body
#[derive(Clone, Debug, Deserialize)]
pub struct PurchaseRequest {
    pub course_id: CourseId,
    pub amount: Decimal,
    pub method: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub card: Option<CardDetails>,
}

/// Result of a purchase request
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PurchaseOutcome {
    /// Buyer already holds an approved payment for the course
    AlreadyOwned { payment: Payment },

    /// A new pending payment was recorded and handed to the provider
    Initiated {
        payment: Payment,
        checkout_url: Option<String>,
    },
}

/// What the status poll reports for a buyer and course
#[derive(Clone, Debug, PartialEq)]
pub enum PaymentStatus {
    NotPaid,
    Found(Payment),
}

impl PaymentStatus {
    /// Wire label: a payment state or `not_paid`
    pub fn label(&self) -> &'static str {
        match self {
            PaymentStatus::NotPaid => "not_paid",
            PaymentStatus::Found(payment) => payment.state.as_str(),
        }
    }
}

pub struct PurchaseGuard {
    settlement: Settlement,
    catalog: Arc<dyn CourseCatalog>,
    registry: Arc<ProviderRegistry>,
    confirmation: ConfirmationChannel,
    config: CheckoutConfig,
}

impl PurchaseGuard {
    pub fn new(
        settlement: Settlement,
        catalog: Arc<dyn CourseCatalog>,
        registry: Arc<ProviderRegistry>,
        config: CheckoutConfig,
    ) -> Self {
        let confirmation = ConfirmationChannel::new(
            settlement.clone(),
            registry.clone(),
            config.provider_timeout,
        );
        Self {
            settlement,
            catalog,
            registry,
            confirmation,
            config,
        }
    }

    /// Channel sharing this guard's ledger and adapters
    pub fn confirmation(&self) -> &ConfirmationChannel {
        &self.confirmation
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    pub fn config(&self) -> &CheckoutConfig {
        &self.config
    }

    /// Start a purchase of `request.course_id` for `buyer`
    pub async fn request_purchase(
        &self,
        buyer: UserId,
        request: PurchaseRequest,
    ) -> Result<PurchaseOutcome> {
        let method: PaymentMethod = request.method.parse()?;
        let adapter = self.registry.require(method)?;

        if method == PaymentMethod::Card {
            let card = request
                .card
                .as_ref()
                .ok_or_else(|| CheckoutError::MissingFields("card".into()))?;
            let missing = card.missing_fields();
            if !missing.is_empty() {
                return Err(CheckoutError::MissingFields(missing.join(", ")));
            }
        }

        let currency = match request.currency.as_deref().map(str::trim) {
            Some(code) if !code.is_empty() => normalize_currency(code)?,
            _ => self.config.default_currency.clone(),
        };

        let course = self
            .catalog
            .find(request.course_id)
            .await?
            .ok_or(CheckoutError::ItemNotFound(request.course_id.get()))?;

        if request.amount <= Decimal::ZERO {
            return Err(CheckoutError::InvalidAmount(format!(
                "{} is not positive",
                request.amount
            )));
        }
        if let Some(price) = course.price {
            if price != request.amount {
                return Err(CheckoutError::InvalidAmount(format!(
                    "expected {}, got {}",
                    price, request.amount
                )));
            }
        }

        let ledger = self.settlement.ledger();

        if let Some(owned) = ledger.find_approved(buyer, course.id).await? {
            tracing::info!(
                buyer_id = %buyer,
                course_id = %course.id,
                payment_id = %owned.id,
                "Course already owned"
            );
            return Ok(PurchaseOutcome::AlreadyOwned { payment: owned });
        }

        let payment = ledger
            .insert(NewPayment {
                buyer_id: buyer,
                course_id: course.id,
                amount: request.amount,
                currency,
                method,
            })
            .await?;

        tracing::info!(
            payment_id = %payment.id,
            buyer_id = %buyer,
            course_id = %course.id,
            method = %method,
            amount = %payment.amount,
            currency = %payment.currency,
            "Payment created"
        );
        self.settlement.record(Activity::new(
            buyer,
            "purchase_initiated",
            format!(
                "payment {} for course {} via {} ({} {})",
                payment.id, course.id, method, payment.amount, payment.currency
            ),
        ));

        let initiation = match bounded(
            self.config.provider_timeout,
            adapter.name(),
            adapter.initiate(&payment, &course),
        )
        .await
        {
            Ok(initiation) => initiation,
            Err(e) => {
                tracing::warn!(
                    payment_id = %payment.id,
                    provider = adapter.name(),
                    error = %e,
                    "Provider initiation failed; payment stays pending"
                );
                return Err(e);
            }
        };

        let payment = match initiation.reference.as_deref().filter(|r| !r.is_empty()) {
            Some(reference) => ledger.set_reference(payment.id, reference).await?,
            None => payment,
        };

        Ok(PurchaseOutcome::Initiated {
            payment,
            checkout_url: initiation.checkout_url,
        })
    }

    /// Current payment status for a buyer and course, reconciling a
    /// pending redirect payment with its provider on the way.
    pub async fn payment_status(&self, buyer: UserId, course: CourseId) -> Result<PaymentStatus> {
        let ledger = self.settlement.ledger();
        let payment = match ledger.find_approved(buyer, course).await? {
            Some(approved) => Some(approved),
            None => ledger.latest_for(buyer, course).await?,
        };

        match payment {
            Some(payment) => Ok(PaymentStatus::Found(
                self.confirmation.reconcile(payment).await,
            )),
            None => Ok(PaymentStatus::NotPaid),
        }
    }

    /// Whether `buyer` holds an approved payment for `course`
    pub async fn has_access(&self, buyer: UserId, course: CourseId) -> Result<bool> {
        Ok(self
            .settlement
            .ledger()
            .find_approved(buyer, course)
            .await?
            .is_some())
    }
}
