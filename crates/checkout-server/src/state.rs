//! Application State

use std::sync::Arc;

use checkout_core::{Authenticator, ConfirmationChannel, Environment, PurchaseGuard};
use checkout_gateways::{CoinbaseAdapter, PayPalAdapter};
#[cfg(feature = "stripe")]
use checkout_gateways::StripeAdapter;

/// Provider clients needed to authenticate webhook deliveries.
///
/// A provider that is `None` is not configured; its webhook answers 503.
#[derive(Clone, Default)]
pub struct WebhookVerifiers {
    /// Secret for the generic notification endpoint
    pub generic_secret: Option<String>,

    pub paypal: Option<Arc<PayPalAdapter>>,

    pub coinbase: Option<Arc<CoinbaseAdapter>>,

    #[cfg(feature = "stripe")]
    pub stripe: Option<Arc<StripeAdapter>>,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Purchase entry point, status poll and access fact
    pub guard: Arc<PurchaseGuard>,

    /// Webhook and capture callback processing
    pub confirmation: ConfirmationChannel,

    /// Bearer token resolution
    pub authenticator: Arc<dyn Authenticator>,

    /// Webhook signature checks
    pub webhooks: WebhookVerifiers,

    /// Storefront root for capture callback redirects
    pub frontend_url: String,
}

impl AppState {
    pub fn new(
        guard: PurchaseGuard,
        authenticator: Arc<dyn Authenticator>,
        webhooks: WebhookVerifiers,
        frontend_url: impl Into<String>,
    ) -> Self {
        let confirmation = guard.confirmation().clone();
        Self {
            guard: Arc::new(guard),
            confirmation,
            authenticator,
            webhooks,
            frontend_url: frontend_url.into(),
        }
    }

    pub fn environment(&self) -> Environment {
        self.guard.config().environment
    }
}
