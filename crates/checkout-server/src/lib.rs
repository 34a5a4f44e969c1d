//! checkout-server
//!
//! Axum surface for course checkout: purchase, status poll, access fact,
//! provider webhooks and the PayPal capture callback.

pub mod auth;
pub mod config;
pub mod handlers;
pub mod state;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use auth::{AuthUser, StaticTokenAuthenticator};
pub use config::ServerConfig;
pub use state::{AppState, WebhookVerifiers};

use crate::handlers::{
    coinbase_webhook, course_access, create_payment, generic_webhook, health_check,
    payment_status, paypal_callback, paypal_webhook,
};

/// Build the application router
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let router = Router::new()
        .route("/health", get(health_check))
        // Buyer API
        .route("/api/payments", post(create_payment))
        .route("/api/payments/{course_id}", get(payment_status))
        .route("/api/courses/{course_id}/access", get(course_access))
        // Confirmation channel
        .route("/api/payments/webhook", post(generic_webhook))
        .route("/api/payments/paypal/webhook", post(paypal_webhook))
        .route("/api/payments/paypal/callback", get(paypal_callback))
        .route("/api/payments/coinbase/webhook", post(coinbase_webhook));

    #[cfg(feature = "stripe")]
    let router = router.route(
        "/api/payments/stripe/webhook",
        post(crate::handlers::stripe_webhook),
    );

    router
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors),
        )
        .with_state(state)
}
