//! Synthetic Provider
//!
//! Serves `dev`, `card` and `bank_transfer`. Nothing leaves the process: the
//! payment is resolved by a delayed task. Development always approves;
//! otherwise approval is drawn with a fixed probability.

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;

use checkout_core::{
    CheckoutConfig, Course, Initiation, Payment, PaymentId, PaymentMethod, PaymentState,
    ProviderAdapter, Result, Settlement, TaskScheduler,
};

/// Adapter that resolves payments locally after a delay
pub struct SyntheticAdapter {
    settlement: Settlement,
    scheduler: Arc<dyn TaskScheduler>,
    delay: Duration,

    /// `None` in development: every payment is approved
    approval_rate: Option<f64>,
}

impl SyntheticAdapter {
    pub fn new(settlement: Settlement, scheduler: Arc<dyn TaskScheduler>, config: &CheckoutConfig) -> Self {
        let approval_rate = if config.environment.is_development() {
            None
        } else {
            Some(config.synthetic_approval_rate.clamp(0.0, 1.0))
        };

        Self {
            settlement,
            scheduler,
            delay: config.synthetic_delay,
            approval_rate,
        }
    }

    fn draw(approval_rate: Option<f64>) -> PaymentState {
        match approval_rate {
            None => PaymentState::Approved,
            Some(rate) if rand::random::<f64>() < rate => PaymentState::Approved,
            Some(_) => PaymentState::Rejected,
        }
    }
}

/// Local transaction reference: `<prefix>_<unix-ts>_<random>`
pub fn generate_reference(method: PaymentMethod) -> String {
    let suffix: u32 = rand::thread_rng().gen_range(1000..10000);
    format!("{}_{}_{}", method.reference_prefix(), Utc::now().timestamp(), suffix)
}

async fn resolve(settlement: Settlement, id: PaymentId, method: PaymentMethod, approval_rate: Option<f64>) {
    let state = SyntheticAdapter::draw(approval_rate);
    let reference = (state == PaymentState::Approved).then(|| generate_reference(method));

    if let Err(e) = settlement
        .settle(id, state, reference.as_deref(), "synthetic")
        .await
    {
        tracing::error!(payment_id = %id, error = %e, "Synthetic resolution failed");
    }
}

#[async_trait]
impl ProviderAdapter for SyntheticAdapter {
    fn name(&self) -> &str {
        "synthetic"
    }

    async fn initiate(&self, payment: &Payment, _course: &Course) -> Result<Initiation> {
        let task = resolve(self.settlement.clone(), payment.id, payment.method, self.approval_rate);
        self.scheduler.schedule(self.delay, Box::pin(task));

        tracing::debug!(
            payment_id = %payment.id,
            method = %payment.method,
            delay_secs = self.delay.as_secs(),
            "Synthetic resolution scheduled"
        );

        Ok(Initiation::default())
    }
}
