//! Settlement
//!
//! The single write path for payment state. Webhooks, reconciliation, the
//! capture callback and synthetic resolution all settle through here.

use std::sync::Arc;

use crate::collab::{Activity, ActivitySink};
use crate::error::Result;
use crate::ledger::{PaymentLedger, Transition};
use crate::model::{PaymentId, PaymentState};

/// Applies conditional transitions and records their side effects
#[derive(Clone)]
pub struct Settlement {
    ledger: Arc<dyn PaymentLedger>,
    activity: Arc<dyn ActivitySink>,
}

impl Settlement {
    pub fn new(ledger: Arc<dyn PaymentLedger>, activity: Arc<dyn ActivitySink>) -> Self {
        Self { ledger, activity }
    }
    
    pub fn ledger(&self) -> &Arc<dyn PaymentLedger> {
        &self.ledger
    }
    
    /// Emit an activity record
    pub fn record(&self, activity: Activity) {
        self.activity.record(activity);
    }
    
    /// Move a pending payment to `to`; a no-op for terminal payments
    pub async fn settle(
        &self,
        id: PaymentId,
        to: PaymentState,
        reference: Option<&str>,
        via: &str,
    ) -> Result<Transition> {
        let transition = self.ledger.transition(id, to, reference).await?;
        
        match &transition {
            Transition::Applied(payment) => {
                tracing::info!(
                    payment_id = %payment.id,
                    method = %payment.method,
                    state = %payment.state,
                    via = via,
                    "Payment settled"
                );
                self.activity.record(Activity::new(
                    payment.buyer_id,
                    format!("payment_{}", payment.state),
                    format!(
                        "payment {} for course {} {} via {}",
                        payment.id, payment.course_id, payment.state, via
                    ),
                ));
            }
            Transition::Unchanged(payment) => {
                tracing::debug!(
                    payment_id = %payment.id,
                    state = %payment.state,
                    requested = %to,
                    via = via,
                    "Settlement was a no-op"
                );
            }
        }
        
        Ok(transition)
    }
}
