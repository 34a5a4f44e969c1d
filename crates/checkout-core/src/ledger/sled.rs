//! Sled-backed durable ledger
//!
//! Rows are stored as JSON under big-endian id keys. Conditional transitions
//! use `compare_and_swap`, retried until the row is observed in a stable state.

use async_trait::async_trait;
use chrono::Utc;
use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

use super::{apply_reference, apply_transition, PaymentLedger, Transition};
use crate::error::{CheckoutError, Result};
use crate::model::{CourseId, NewPayment, Payment, PaymentId, PaymentState, UserId};

const PAYMENTS_TREE: &str = "payments";
const REFERENCES_TREE: &str = "references";
const PAIRS_TREE: &str = "pairs";

fn storage(context: &str) -> impl Fn(sled::Error) -> CheckoutError + '_ {
    move |e| CheckoutError::Database(format!("{}: {}", context, e))
}

/// Durable ledger on an embedded sled database
#[derive(Debug, Clone)]
pub struct SledLedger {
    db: sled::Db,
    payments: sled::Tree,
    references: sled::Tree,
    pairs: sled::Tree,
}

impl SledLedger {
    /// Open or create the ledger at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path).map_err(storage("Failed to open sled db"))?;
        let payments = db
            .open_tree(PAYMENTS_TREE)
            .map_err(storage("Failed to open payments tree"))?;
        let references = db
            .open_tree(REFERENCES_TREE)
            .map_err(storage("Failed to open references tree"))?;
        let pairs = db
            .open_tree(PAIRS_TREE)
            .map_err(storage("Failed to open pairs tree"))?;
        
        Ok(Self { db, payments, references, pairs })
    }
    
    /// Flush pending writes to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush().map_err(storage("Failed to flush db"))?;
        Ok(())
    }
    
    fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| CheckoutError::Database(e.to_string()))
    }
    
    fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
        serde_json::from_slice(bytes).map_err(|e| CheckoutError::Database(e.to_string()))
    }
    
    fn id_key(id: PaymentId) -> [u8; 8] {
        id.get().to_be_bytes()
    }
    
    fn pair_prefix(buyer: UserId, course: CourseId) -> Vec<u8> {
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(&buyer.get().to_be_bytes());
        key.extend_from_slice(&course.get().to_be_bytes());
        key
    }
    
    fn id_from_bytes(bytes: &[u8]) -> Result<PaymentId> {
        let raw: [u8; 8] = bytes
            .try_into()
            .map_err(|_| CheckoutError::Database("corrupt payment id".into()))?;
        Ok(PaymentId(u64::from_be_bytes(raw)))
    }
    
    fn index_reference(&self, payment: &Payment) -> Result<()> {
        self.references
            .insert(payment.external_reference.as_bytes(), Self::id_key(payment.id).to_vec())
            .map_err(storage("Failed to index reference"))?;
        Ok(())
    }
}

#[async_trait]
impl PaymentLedger for SledLedger {
    async fn insert(&self, new: NewPayment) -> Result<Payment> {
        let id = self.db.generate_id().map_err(storage("Failed to generate id"))? + 1;
        let payment = new.into_payment(PaymentId(id), Utc::now());
        
        self.payments
            .insert(Self::id_key(payment.id), Self::serialize(&payment)?)
            .map_err(storage("Failed to save payment"))?;
        
        let mut pair_key = Self::pair_prefix(payment.buyer_id, payment.course_id);
        pair_key.extend_from_slice(&Self::id_key(payment.id));
        self.pairs
            .insert(pair_key, Vec::<u8>::new())
            .map_err(storage("Failed to index payment"))?;
        
        Ok(payment)
    }
    
    async fn get(&self, id: PaymentId) -> Result<Option<Payment>> {
        match self
            .payments
            .get(Self::id_key(id))
            .map_err(storage("Failed to get payment"))?
        {
            Some(bytes) => Ok(Some(Self::deserialize(&bytes)?)),
            None => Ok(None),
        }
    }
    
    async fn find_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        match self
            .references
            .get(reference.as_bytes())
            .map_err(storage("Failed to get reference"))?
        {
            Some(bytes) => self.get(Self::id_from_bytes(&bytes)?).await,
            None => Ok(None),
        }
    }
    
    async fn list_for(&self, buyer: UserId, course: CourseId) -> Result<Vec<Payment>> {
        let prefix = Self::pair_prefix(buyer, course);
        let mut payments = Vec::new();
        
        for item in self.pairs.scan_prefix(&prefix) {
            let (key, _) = item.map_err(storage("Failed to iterate payments"))?;
            let id = Self::id_from_bytes(&key[prefix.len()..])?;
            if let Some(payment) = self.get(id).await? {
                payments.push(payment);
            }
        }
        
        Ok(payments)
    }
    
    async fn set_reference(&self, id: PaymentId, reference: &str) -> Result<Payment> {
        let key = Self::id_key(id);
        loop {
            let old = self
                .payments
                .get(key)
                .map_err(storage("Failed to get payment"))?
                .ok_or_else(|| CheckoutError::PaymentNotFound(id.to_string()))?;
            let current: Payment = Self::deserialize(&old)?;
            
            let Some(next) = apply_reference(&current, reference, Utc::now()) else {
                return Ok(current);
            };
            
            let swapped = self
                .payments
                .compare_and_swap(key, Some(old), Some(Self::serialize(&next)?))
                .map_err(storage("Failed to update payment"))?;
            if swapped.is_ok() {
                self.index_reference(&next)?;
                return Ok(next);
            }
        }
    }
    
    async fn transition(
        &self,
        id: PaymentId,
        to: PaymentState,
        reference: Option<&str>,
    ) -> Result<Transition> {
        let key = Self::id_key(id);
        loop {
            let old = self
                .payments
                .get(key)
                .map_err(storage("Failed to get payment"))?
                .ok_or_else(|| CheckoutError::PaymentNotFound(id.to_string()))?;
            let current: Payment = Self::deserialize(&old)?;
            
            let Some(next) = apply_transition(&current, to, reference, Utc::now()) else {
                return Ok(Transition::Unchanged(current));
            };
            
            let swapped = self
                .payments
                .compare_and_swap(key, Some(old), Some(Self::serialize(&next)?))
                .map_err(storage("Failed to update payment"))?;
            if swapped.is_ok() {
                if next.external_reference != current.external_reference {
                    self.index_reference(&next)?;
                }
                return Ok(Transition::Applied(next));
            }
            
            tracing::debug!(payment_id = %id, "Concurrent ledger update, retrying transition");
        }
    }
}
