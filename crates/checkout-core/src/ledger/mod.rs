//! Payment Ledger
//!
//! Durable record of purchase attempts. Every implementation must make
//! [`PaymentLedger::transition`] a single conditional update: the state only
//! changes when the stored row is still `pending`, so concurrent confirmation
//! paths collapse into exactly one winner.

mod memory;
#[cfg(feature = "sled-ledger")]
mod sled;

pub use memory::MemoryLedger;
#[cfg(feature = "sled-ledger")]
pub use self::sled::SledLedger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::model::{CourseId, NewPayment, Payment, PaymentId, PaymentState, UserId};

/// Result of a conditional state change
#[derive(Clone, Debug, PartialEq)]
pub enum Transition {
    /// This call moved the payment out of `pending`
    Applied(Payment),
    
    /// Nothing changed: the payment was already terminal or the target was `pending`
    Unchanged(Payment),
}

impl Transition {
    pub fn payment(&self) -> &Payment {
        match self {
            Transition::Applied(p) | Transition::Unchanged(p) => p,
        }
    }
    
    pub fn into_payment(self) -> Payment {
        match self {
            Transition::Applied(p) | Transition::Unchanged(p) => p,
        }
    }
    
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied(_))
    }
}

/// Ledger storage trait
#[async_trait]
pub trait PaymentLedger: Send + Sync {
    /// Insert a new `pending` row and assign its id
    async fn insert(&self, new: NewPayment) -> Result<Payment>;
    
    /// Get payment by id
    async fn get(&self, id: PaymentId) -> Result<Option<Payment>>;
    
    /// Get payment by provider reference
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>>;
    
    /// All payments for a buyer/course pair, oldest first
    async fn list_for(&self, buyer: UserId, course: CourseId) -> Result<Vec<Payment>>;
    
    /// Set the provider reference if none is stored yet; returns the current row
    async fn set_reference(&self, id: PaymentId, reference: &str) -> Result<Payment>;
    
    /// Conditionally move a pending payment to `to`, adopting `reference` if the row has none
    async fn transition(
        &self,
        id: PaymentId,
        to: PaymentState,
        reference: Option<&str>,
    ) -> Result<Transition>;
    
    /// First approved payment for the pair, if any
    async fn find_approved(&self, buyer: UserId, course: CourseId) -> Result<Option<Payment>> {
        Ok(self
            .list_for(buyer, course)
            .await?
            .into_iter()
            .find(Payment::is_approved))
    }
    
    /// Most recently created payment for the pair
    async fn latest_for(&self, buyer: UserId, course: CourseId) -> Result<Option<Payment>> {
        Ok(self
            .list_for(buyer, course)
            .await?
            .into_iter()
            .max_by_key(|p| (p.created_at, p.id)))
    }
}

/// Compute the row produced by a conditional transition, or `None` for a no-op
pub(crate) fn apply_transition(
    current: &Payment,
    to: PaymentState,
    reference: Option<&str>,
    now: DateTime<Utc>,
) -> Option<Payment> {
    if current.state.is_terminal() || !to.is_terminal() {
        return None;
    }
    
    let mut next = current.clone();
    next.state = to;
    if let Some(reference) = reference.filter(|r| !r.is_empty()) {
        if !next.has_reference() {
            next.external_reference = reference.to_string();
        }
    }
    next.updated_at = now;
    Some(next)
}

/// Compute the row produced by setting a reference, or `None` if one is already stored
pub(crate) fn apply_reference(
    current: &Payment,
    reference: &str,
    now: DateTime<Utc>,
) -> Option<Payment> {
    if current.has_reference() || reference.is_empty() {
        if current.has_reference() && current.external_reference != reference {
            tracing::warn!(
                payment_id = %current.id,
                stored = %current.external_reference,
                offered = %reference,
                "Ignoring attempt to replace external reference"
            );
        }
        return None;
    }
    
    let mut next = current.clone();
    next.external_reference = reference.to_string();
    next.updated_at = now;
    Some(next)
}
