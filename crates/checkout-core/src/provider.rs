//! Provider Adapter Strategy Pattern
//!
//! Every payment method family implements [`ProviderAdapter`]. Initiation is
//! mandatory; reconciliation and capture are optional capabilities that only
//! redirect-style providers offer.
//!
//! ```text
//! ┌──────────────┐     ┌──────────────────┐     ┌───────────────────┐
//! │ PurchaseGuard│────▶│ ProviderRegistry │────▶│ dyn ProviderAdapter│
//! │              │     │ (method → impl)  │     │ synthetic / paypal │
//! └──────────────┘     └──────────────────┘     │ coinbase / stripe  │
//!                                               └───────────────────┘
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use crate::collab::Course;
use crate::error::{CheckoutError, Result};
use crate::model::{Payment, PaymentMethod, PaymentState};

/// What a provider returned for a new purchase
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Initiation {
    /// Provider reference to persist on the payment
    pub reference: Option<String>,
    
    /// Where to send the buyer; `None` for flows that resolve without a redirect
    pub checkout_url: Option<String>,
}

/// Strategy trait for payment providers
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;
    
    /// Start a purchase with the provider
    async fn initiate(&self, payment: &Payment, course: &Course) -> Result<Initiation>;
    
    /// Whether [`ProviderAdapter::reconcile`] queries the provider
    fn supports_reconcile(&self) -> bool {
        false
    }
    
    /// Ask the provider for the current outcome of `payment`
    async fn reconcile(&self, payment: &Payment) -> Result<Option<PaymentState>> {
        Err(CheckoutError::Unsupported(format!(
            "{} does not support reconciliation of payment {}",
            self.name(),
            payment.id
        )))
    }
    
    /// Whether [`ProviderAdapter::capture`] is available
    fn supports_capture(&self) -> bool {
        false
    }
    
    /// Complete a buyer-approved purchase using the one-time token from the return redirect
    async fn capture(&self, payment: &Payment, _token: &str) -> Result<Option<PaymentState>> {
        Err(CheckoutError::Unsupported(format!(
            "{} does not support capture of payment {}",
            self.name(),
            payment.id
        )))
    }
}

/// Run a provider call under the configured deadline.
///
/// An elapsed deadline is reported as `ProviderUnavailable`.
pub async fn bounded<T, F>(limit: Duration, provider: &str, call: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(CheckoutError::ProviderUnavailable(format!(
            "{} did not answer within {}s",
            provider,
            limit.as_secs()
        ))),
    }
}

/// Dispatch table from method tag to adapter
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    adapters: HashMap<PaymentMethod, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }
    
    /// Register an adapter for a method
    pub fn register<A: ProviderAdapter + 'static>(&mut self, method: PaymentMethod, adapter: A) {
        self.adapters.insert(method, Arc::new(adapter));
    }
    
    /// Register a shared adapter (one adapter can serve several methods)
    pub fn register_shared(&mut self, method: PaymentMethod, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(method, adapter);
    }
    
    /// Get the adapter for a method
    pub fn get(&self, method: PaymentMethod) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&method).cloned()
    }
    
    /// Adapter for a method, or `InvalidMethod` if it is not enabled
    pub fn require(&self, method: PaymentMethod) -> Result<Arc<dyn ProviderAdapter>> {
        self.get(method).ok_or_else(|| {
            CheckoutError::InvalidMethod(format!("{} is not enabled", method))
        })
    }
    
    /// Enabled methods in declaration order
    pub fn methods(&self) -> Vec<PaymentMethod> {
        PaymentMethod::ALL
            .into_iter()
            .filter(|m| self.adapters.contains_key(m))
            .collect()
    }
    
    pub fn len(&self) -> usize {
        self.adapters.len()
    }
    
    pub fn is_empty(&self) -> bool {
        self.adapters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CourseId, NewPayment, PaymentId, UserId};
    use chrono::Utc;
    use rust_decimal_macros::dec;

    struct NullAdapter;

    #[async_trait]
    impl ProviderAdapter for NullAdapter {
        fn name(&self) -> &str {
            "null"
        }

        async fn initiate(&self, _payment: &Payment, _course: &Course) -> Result<Initiation> {
            Ok(Initiation::default())
        }
    }

    #[test]
    fn test_registry_dispatch() {
        let mut registry = ProviderRegistry::new();
        registry.register(PaymentMethod::Coinbase, NullAdapter);
        let shared: Arc<dyn ProviderAdapter> = Arc::new(NullAdapter);
        registry.register_shared(PaymentMethod::Card, shared.clone());
        registry.register_shared(PaymentMethod::BankTransfer, shared);
        
        assert_eq!(registry.len(), 3);
        assert_eq!(
            registry.methods(),
            vec![PaymentMethod::Card, PaymentMethod::BankTransfer, PaymentMethod::Coinbase]
        );
        assert!(registry.get(PaymentMethod::PayPal).is_none());
        assert!(matches!(
            registry.require(PaymentMethod::PayPal),
            Err(CheckoutError::InvalidMethod(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_maps_elapsed_deadline() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, CheckoutError>(())
        };
        let result = bounded(Duration::from_secs(15), "slowpay", slow).await;
        assert!(matches!(result, Err(CheckoutError::ProviderUnavailable(_))));
        
        let fast = bounded(Duration::from_secs(15), "fastpay", async { Ok(7) }).await;
        assert_eq!(fast.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_optional_capabilities_default_off() {
        let adapter = NullAdapter;
        assert!(!adapter.supports_reconcile());
        assert!(!adapter.supports_capture());

        let payment = NewPayment {
            buyer_id: UserId(1),
            course_id: CourseId(42),
            amount: dec!(29.99),
            currency: "USD".into(),
            method: PaymentMethod::Card,
        }
        .into_payment(PaymentId(3), Utc::now());
        assert!(matches!(
            adapter.capture(&payment, "TOKEN").await,
            Err(CheckoutError::Unsupported(_))
        ));
        assert!(matches!(
            adapter.reconcile(&payment).await,
            Err(CheckoutError::Unsupported(_))
        ));
    }
}
