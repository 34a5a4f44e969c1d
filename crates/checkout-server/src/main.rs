//! checkout-server
//!
//! Course checkout HTTP server. Providers are enabled from the environment;
//! anything left unconfigured is skipped with a warning.

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use checkout_core::{
    ActivitySink, MemoryCatalog, MemoryLedger, PaymentLedger, PaymentMethod, ProviderAdapter,
    ProviderRegistry, PurchaseGuard, Settlement, SledLedger, TaskScheduler, TokioScheduler,
    TracingActivitySink,
};
use checkout_gateways::{CoinbaseAdapter, CoinbaseConfig, PayPalAdapter, PayPalConfig, SyntheticAdapter};
use checkout_server::{create_router, AppState, ServerConfig, StaticTokenAuthenticator, WebhookVerifiers};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();

    let config = ServerConfig::from_env()?;
    tracing::info!("Environment: {}", config.checkout.environment.as_str());

    // Ledger
    let ledger: Arc<dyn PaymentLedger> = match &config.ledger_path {
        Some(path) => {
            tracing::info!("✓ sled ledger at {}", path.display());
            Arc::new(SledLedger::open(path)?)
        }
        None => {
            tracing::warn!("⚠ CHECKOUT_LEDGER_PATH not set - payments are kept in memory");
            Arc::new(MemoryLedger::new())
        }
    };

    // Catalog
    let catalog_json = std::fs::read_to_string(&config.catalog_path)?;
    let catalog = MemoryCatalog::from_json(&catalog_json)?;
    tracing::info!("Loaded {} courses", catalog.len());

    let activity: Arc<dyn ActivitySink> = Arc::new(TracingActivitySink);
    let settlement = Settlement::new(ledger, activity);
    let timeout = config.checkout.provider_timeout;

    // Providers
    let mut registry = ProviderRegistry::new();
    let scheduler: Arc<dyn TaskScheduler> = Arc::new(TokioScheduler);
    let synthetic: Arc<dyn ProviderAdapter> = Arc::new(SyntheticAdapter::new(
        settlement.clone(),
        scheduler,
        &config.checkout,
    ));
    registry.register_shared(PaymentMethod::Card, synthetic.clone());
    registry.register_shared(PaymentMethod::BankTransfer, synthetic.clone());
    if config.checkout.environment.is_development() {
        registry.register_shared(PaymentMethod::Dev, synthetic);
    }

    let mut webhooks = WebhookVerifiers {
        generic_secret: config.webhook_secret.clone(),
        ..WebhookVerifiers::default()
    };

    match PayPalConfig::from_env(&config.public_base_url, &config.frontend_url)
        .and_then(|c| PayPalAdapter::new(c, timeout))
    {
        Ok(paypal) => {
            let paypal = Arc::new(paypal);
            registry.register_shared(PaymentMethod::PayPal, paypal.clone());
            webhooks.paypal = Some(paypal);
            tracing::info!("✓ PayPal configured");
        }
        Err(e) => tracing::warn!("⚠ PayPal disabled: {}", e),
    }

    match CoinbaseConfig::from_env(&config.frontend_url).and_then(|c| CoinbaseAdapter::new(c, timeout)) {
        Ok(coinbase) => {
            let coinbase = Arc::new(coinbase);
            registry.register_shared(PaymentMethod::Coinbase, coinbase.clone());
            webhooks.coinbase = Some(coinbase);
            tracing::info!("✓ Coinbase Commerce configured");
        }
        Err(e) => tracing::warn!("⚠ Coinbase Commerce disabled: {}", e),
    }

    #[cfg(feature = "stripe")]
    match checkout_gateways::StripeAdapter::from_env(&config.frontend_url) {
        Ok(stripe) => {
            let stripe = Arc::new(stripe);
            registry.register_shared(PaymentMethod::Stripe, stripe.clone());
            webhooks.stripe = Some(stripe);
            tracing::info!("✓ Stripe configured");
        }
        Err(e) => tracing::warn!("⚠ Stripe disabled: {}", e),
    }

    tracing::info!("Enabled payment methods:");
    for method in registry.methods() {
        tracing::info!("  • {}", method);
    }

    let authenticator = Arc::new(StaticTokenAuthenticator::parse(&config.api_tokens)?);
    tracing::info!("Loaded {} API tokens", authenticator.len());

    let guard = PurchaseGuard::new(
        settlement,
        Arc::new(catalog),
        Arc::new(registry),
        config.checkout.clone(),
    );
    let state = AppState::new(guard, authenticator, webhooks, config.frontend_url.clone());
    let app = create_router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 checkout-server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("Endpoints:");
    tracing::info!("  GET  /health                          - Health check");
    tracing::info!("  POST /api/payments                    - Start a purchase");
    tracing::info!("  GET  /api/payments/{{course_id}}        - Payment status");
    tracing::info!("  GET  /api/courses/{{course_id}}/access  - Access check");
    tracing::info!("  POST /api/payments/webhook            - Generic notification");
    tracing::info!("  POST /api/payments/paypal/webhook     - PayPal webhook");
    tracing::info!("  GET  /api/payments/paypal/callback    - PayPal return");
    tracing::info!("  POST /api/payments/coinbase/webhook   - Coinbase webhook");
    tracing::info!("  POST /api/payments/stripe/webhook     - Stripe webhook");

    axum::serve(listener, app).await?;

    Ok(())
}
