use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

use super::{apply_reference, apply_transition, PaymentLedger, Transition};
use crate::error::{CheckoutError, Result};
use crate::model::{CourseId, NewPayment, Payment, PaymentId, PaymentState, UserId};

#[derive(Default)]
struct Inner {
    payments: BTreeMap<PaymentId, Payment>,
    by_reference: HashMap<String, PaymentId>,
    next_id: u64,
}

/// In-memory ledger (for development and tests)
///
/// All mutations happen under one write lock, which makes every
/// check-and-set atomic.
#[derive(Default)]
pub struct MemoryLedger {
    inner: RwLock<Inner>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Number of rows ever recorded
    pub async fn len(&self) -> usize {
        self.inner.read().await.payments.len()
    }
    
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl PaymentLedger for MemoryLedger {
    async fn insert(&self, new: NewPayment) -> Result<Payment> {
        let mut inner = self.inner.write().await;
        inner.next_id += 1;
        let payment = new.into_payment(PaymentId(inner.next_id), Utc::now());
        inner.payments.insert(payment.id, payment.clone());
        Ok(payment)
    }
    
    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        Ok(self.inner.read().await.payments.get(&id).cloned())
    }
    
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .by_reference
            .get(reference)
            .and_then(|id| inner.payments.get(id))
            .cloned())
    }
    
    async fn list_for(&self, buyer: UserId, course: CourseId) -> Result<Vec<Payment>> {
        let inner = self.inner.read().await;
        Ok(inner
            .payments
            .values()
            .filter(|p| p.buyer_id == buyer && p.course_id == course)
            .cloned()
            .collect())
    }
    
    async fn set_reference(&self, id: PaymentId, reference: &str) -> Result<Payment> {
        let mut inner = self.inner.write().await;
        let current = inner
            .payments
            .get(&id)
            .cloned()
            .ok_or_else(|| CheckoutError::PaymentNotFound(id.to_string()))?;
        
        match apply_reference(&current, reference, Utc::now()) {
            Some(next) => {
                inner.by_reference.insert(next.external_reference.clone(), id);
                inner.payments.insert(id, next.clone());
                Ok(next)
            }
            None => Ok(current),
        }
    }
    
    async fn transition(
        &self,
        id: PaymentId,
        to: PaymentState,
        reference: Option<&str>,
    ) -> Result<Transition> {
        let mut inner = self.inner.write().await;
        let current = inner
            .payments
            .get(&id)
            .cloned()
            .ok_or_else(|| CheckoutError::PaymentNotFound(id.to_string()))?;
        
        match apply_transition(&current, to, reference, Utc::now()) {
            Some(next) => {
                if next.external_reference != current.external_reference {
                    inner.by_reference.insert(next.external_reference.clone(), id);
                }
                inner.payments.insert(id, next.clone());
                Ok(Transition::Applied(next))
            }
            None => Ok(Transition::Unchanged(current)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::PaymentMethod;
    use rust_decimal_macros::dec;
    use std::sync::Arc;

    fn new_payment(buyer: u64, course: u64) -> NewPayment {
        NewPayment {
            buyer_id: UserId(buyer),
            course_id: CourseId(course),
            amount: dec!(29.99),
            currency: "USD".into(),
            method: PaymentMethod::Coinbase,
        }
    }

    #[tokio::test]
    async fn test_insert_assigns_sequential_ids() {
        let ledger = MemoryLedger::new();
        let a = ledger.insert(new_payment(1, 42)).await.unwrap();
        let b = ledger.insert(new_payment(1, 42)).await.unwrap();
        assert_eq!(a.id, PaymentId(1));
        assert_eq!(b.id, PaymentId(2));
        assert_eq!(a.state, PaymentState::Pending);
        assert_eq!(ledger.len().await, 2);
    }

    #[tokio::test]
    async fn test_reference_lookup() {
        let ledger = MemoryLedger::new();
        let payment = ledger.insert(new_payment(1, 42)).await.unwrap();
        ledger.set_reference(payment.id, "CHARGE01").await.unwrap();
        
        let found = ledger.find_by_reference("CHARGE01").await.unwrap().unwrap();
        assert_eq!(found.id, payment.id);
        assert!(ledger.find_by_reference("OTHER").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transition_is_sticky() {
        let ledger = MemoryLedger::new();
        let payment = ledger.insert(new_payment(1, 42)).await.unwrap();
        
        let first = ledger.transition(payment.id, PaymentState::Rejected, None).await.unwrap();
        assert!(first.is_applied());
        
        let second = ledger.transition(payment.id, PaymentState::Approved, None).await.unwrap();
        assert!(!second.is_applied());
        assert_eq!(second.payment().state, PaymentState::Rejected);
    }

    #[tokio::test]
    async fn test_transition_unknown_payment() {
        let ledger = MemoryLedger::new();
        let result = ledger.transition(PaymentId(99), PaymentState::Approved, None).await;
        assert!(matches!(result, Err(CheckoutError::PaymentNotFound(_))));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_transitions_have_one_winner() {
        let ledger = Arc::new(MemoryLedger::new());
        let payment = ledger.insert(new_payment(1, 42)).await.unwrap();
        
        let mut handles = Vec::new();
        for i in 0..16 {
            let ledger = ledger.clone();
            let to = if i % 2 == 0 { PaymentState::Approved } else { PaymentState::Rejected };
            handles.push(tokio::spawn(async move {
                ledger.transition(payment.id, to, None).await.unwrap()
            }));
        }
        
        let mut applied = 0;
        for handle in handles {
            if handle.await.unwrap().is_applied() {
                applied += 1;
            }
        }
        assert_eq!(applied, 1);
    }

    #[tokio::test]
    async fn test_pair_queries() {
        let ledger = MemoryLedger::new();
        let first = ledger.insert(new_payment(1, 42)).await.unwrap();
        let second = ledger.insert(new_payment(1, 42)).await.unwrap();
        ledger.insert(new_payment(2, 42)).await.unwrap();
        
        assert!(ledger.find_approved(UserId(1), CourseId(42)).await.unwrap().is_none());
        ledger.transition(first.id, PaymentState::Approved, None).await.unwrap();
        
        let approved = ledger.find_approved(UserId(1), CourseId(42)).await.unwrap().unwrap();
        assert_eq!(approved.id, first.id);
        
        let latest = ledger.latest_for(UserId(1), CourseId(42)).await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(ledger.list_for(UserId(1), CourseId(42)).await.unwrap().len(), 2);
    }
}
