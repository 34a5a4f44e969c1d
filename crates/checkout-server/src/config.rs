//! Server Configuration

use std::path::PathBuf;

use checkout_core::{CheckoutConfig, CheckoutError, Result};

/// Settings for the HTTP surface; provider credentials are read by each gateway
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Listen address
    pub bind_addr: String,

    /// Public root of this service (PayPal return URL)
    pub public_base_url: String,

    /// Storefront root (capture callback redirects)
    pub frontend_url: String,

    /// Secret for `X-Checkout-Signature` on the generic webhook
    pub webhook_secret: Option<String>,

    /// sled directory; in-memory ledger when unset
    pub ledger_path: Option<PathBuf>,

    /// JSON course catalog
    pub catalog_path: PathBuf,

    /// `token:user_id` pairs, comma separated
    pub api_tokens: String,

    /// Shared checkout settings
    pub checkout: CheckoutConfig,
}

impl ServerConfig {
    /// Read `BIND_ADDR`, `PUBLIC_BASE_URL`, `FRONTEND_URL`, `CHECKOUT_WEBHOOK_SECRET`,
    /// `CHECKOUT_LEDGER_PATH`, `CHECKOUT_CATALOG_PATH`, `CHECKOUT_API_TOKENS`
    /// and the core checkout variables
    pub fn from_env() -> Result<Self> {
        let var = |name: &str| std::env::var(name).ok().filter(|v| !v.trim().is_empty());

        let checkout = CheckoutConfig::from_env()?;
        let webhook_secret = var("CHECKOUT_WEBHOOK_SECRET");
        if webhook_secret.is_none() && !checkout.environment.is_development() {
            tracing::warn!("CHECKOUT_WEBHOOK_SECRET not set - generic webhook will reject every delivery");
        }

        let config = Self {
            bind_addr: var("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".into()),
            public_base_url: trim_url(var("PUBLIC_BASE_URL"), "http://localhost:8080"),
            frontend_url: trim_url(var("FRONTEND_URL"), "http://localhost:3000"),
            webhook_secret,
            ledger_path: var("CHECKOUT_LEDGER_PATH").map(PathBuf::from),
            catalog_path: var("CHECKOUT_CATALOG_PATH")
                .map(PathBuf::from)
                .ok_or_else(|| CheckoutError::Config("CHECKOUT_CATALOG_PATH not set".into()))?,
            api_tokens: var("CHECKOUT_API_TOKENS").unwrap_or_default(),
            checkout,
        };

        if config.api_tokens.is_empty() {
            tracing::warn!("CHECKOUT_API_TOKENS not set - authenticated routes will answer 401");
        }

        Ok(config)
    }
}

fn trim_url(value: Option<String>, default: &str) -> String {
    value
        .as_deref()
        .unwrap_or(default)
        .trim_end_matches('/')
        .to_string()
}
