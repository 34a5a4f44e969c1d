//! HTTP Handlers

use axum::{
    body::Bytes,
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Redirect,
    Json,
};
use serde::Serialize;

use checkout_core::{
    CaptureRedirect, CaptureReturn, CheckoutError, CourseId, Payment, PaymentId, PaymentMethod,
    PaymentState, PaymentStatus, PurchaseOutcome, PurchaseRequest, WebhookOutcome,
};
use checkout_gateways::{coinbase, paypal, signature, PayPalTransmission};

use crate::auth::AuthUser;
use crate::state::AppState;

/// Header carrying the generic webhook signature
pub const GENERIC_SIGNATURE_HEADER: &str = "x-checkout-signature";

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub environment: &'static str,
    pub methods: Vec<PaymentMethod>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

#[derive(Debug, Serialize)]
pub struct PurchaseResponse {
    pub payment_id: PaymentId,
    pub state: PaymentState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checkout_url: Option<String>,
    pub already_owned: bool,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment: Option<Payment>,
}

#[derive(Debug, Serialize)]
pub struct AccessResponse {
    pub course_id: CourseId,
    pub has_access: bool,
}

/// Map a checkout error to a status code and error body
pub fn api_error(err: &CheckoutError) -> ApiError {
    let status = match err {
        CheckoutError::InvalidMethod(_)
        | CheckoutError::MissingFields(_)
        | CheckoutError::InvalidCurrency(_)
        | CheckoutError::InvalidAmount(_)
        | CheckoutError::WebhookParse(_)
        | CheckoutError::Unsupported(_) => StatusCode::BAD_REQUEST,
        CheckoutError::ItemNotFound(_) | CheckoutError::PaymentNotFound(_) => StatusCode::NOT_FOUND,
        CheckoutError::ProviderUnavailable(_) | CheckoutError::ProviderRejected(_) => {
            StatusCode::BAD_GATEWAY
        }
        CheckoutError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        CheckoutError::WebhookSignature(_) => StatusCode::UNAUTHORIZED,
        CheckoutError::Config(_) => StatusCode::SERVICE_UNAVAILABLE,
    };

    if status.is_server_error() {
        tracing::error!(code = err.code(), "{}", err);
    } else {
        tracing::warn!(code = err.code(), "{}", err);
    }

    (
        status,
        Json(ErrorResponse {
            error: err.user_message(),
            code: err.code().into(),
        }),
    )
}

fn disabled(provider: &str) -> ApiError {
    api_error(&CheckoutError::Config(format!("{} is not configured", provider)))
}

/// Decide whether a webhook delivery must be verified.
///
/// Verification runs whenever it is configured and a signature is present.
/// Outside development a missing secret or signature rejects the delivery.
fn signature_required(
    state: &AppState,
    provider: &str,
    configured: bool,
    present: bool,
) -> Result<bool, ApiError> {
    if configured && present {
        return Ok(true);
    }
    if state.environment().is_development() {
        tracing::warn!(provider = provider, "Webhook signature not checked (development)");
        return Ok(false);
    }
    if !configured {
        return Err(disabled(&format!("{} webhook verification", provider)));
    }
    Err(api_error(&CheckoutError::WebhookSignature(format!(
        "{} signature header missing",
        provider
    ))))
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        environment: state.environment().as_str(),
        methods: state.guard.registry().methods(),
    })
}

/// Start a purchase
pub async fn create_payment(
    State(state): State<AppState>,
    AuthUser(buyer): AuthUser,
    Json(payload): Json<PurchaseRequest>,
) -> Result<Json<PurchaseResponse>, ApiError> {
    let outcome = state
        .guard
        .request_purchase(buyer, payload)
        .await
        .map_err(|e| api_error(&e))?;

    let response = match outcome {
        PurchaseOutcome::AlreadyOwned { payment } => PurchaseResponse {
            payment_id: payment.id,
            state: payment.state,
            checkout_url: None,
            already_owned: true,
            message: "You already own this course".into(),
        },
        PurchaseOutcome::Initiated {
            payment,
            checkout_url,
        } => PurchaseResponse {
            payment_id: payment.id,
            state: payment.state,
            message: if checkout_url.is_some() {
                "Continue to the payment provider to complete your purchase".into()
            } else {
                "Payment is being processed".into()
            },
            checkout_url,
            already_owned: false,
        },
    };

    Ok(Json(response))
}

/// Poll payment status for a course
pub async fn payment_status(
    State(state): State<AppState>,
    AuthUser(buyer): AuthUser,
    Path(course_id): Path<u64>,
) -> Result<Json<StatusResponse>, ApiError> {
    let status = state
        .guard
        .payment_status(buyer, CourseId(course_id))
        .await
        .map_err(|e| api_error(&e))?;

    let label = status.label();
    let payment = match status {
        PaymentStatus::NotPaid => None,
        PaymentStatus::Found(payment) => Some(payment),
    };
    Ok(Json(StatusResponse {
        state: label,
        payment,
    }))
}

/// Access fact for content delivery
pub async fn course_access(
    State(state): State<AppState>,
    AuthUser(buyer): AuthUser,
    Path(course_id): Path<u64>,
) -> Result<Json<AccessResponse>, ApiError> {
    let course_id = CourseId(course_id);
    let has_access = state
        .guard
        .has_access(buyer, course_id)
        .await
        .map_err(|e| api_error(&e))?;

    Ok(Json(AccessResponse {
        course_id,
        has_access,
    }))
}

/// Generic notification with an explicit target state
pub async fn generic_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookOutcome>, ApiError> {
    let provided = header(&headers, GENERIC_SIGNATURE_HEADER);
    let secret = state.webhooks.generic_secret.as_deref();

    if signature_required(&state, "generic", secret.is_some(), provided.is_some())? {
        if let (Some(secret), Some(provided)) = (secret, provided) {
            signature::verify_hex(secret, &body, provided).map_err(|e| api_error(&e))?;
        }
    }

    let notice = checkout_core::parse_generic(&body).map_err(|e| api_error(&e))?;
    let outcome = state
        .confirmation
        .ingest_generic(notice)
        .await
        .map_err(|e| api_error(&e))?;

    Ok(Json(outcome))
}

/// PayPal webhook
pub async fn paypal_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookOutcome>, ApiError> {
    let client = state.webhooks.paypal.clone().ok_or_else(|| disabled("PayPal"))?;
    let transmission = PayPalTransmission::from_headers(&headers);

    if signature_required(&state, "paypal", client.can_verify(), transmission.is_some())? {
        if let Some(transmission) = &transmission {
            client
                .verify_webhook(transmission, &body)
                .await
                .map_err(|e| api_error(&e))?;
        }
    }

    let event = paypal::parse_webhook(&body).map_err(|e| api_error(&e))?;
    let outcome = state
        .confirmation
        .ingest(event)
        .await
        .map_err(|e| api_error(&e))?;

    Ok(Json(outcome))
}

/// Coinbase Commerce webhook
pub async fn coinbase_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookOutcome>, ApiError> {
    let client = state.webhooks.coinbase.clone().ok_or_else(|| disabled("Coinbase"))?;
    let provided = header(&headers, coinbase::SIGNATURE_HEADER);

    if signature_required(&state, "coinbase", client.can_verify(), provided.is_some())? {
        if let Some(provided) = provided {
            client.verify_webhook(&body, provided).map_err(|e| api_error(&e))?;
        }
    }

    let event = coinbase::parse_webhook(&body).map_err(|e| api_error(&e))?;
    let outcome = state
        .confirmation
        .ingest(event)
        .await
        .map_err(|e| api_error(&e))?;

    Ok(Json(outcome))
}

/// Stripe webhook handler
#[cfg(feature = "stripe")]
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookOutcome>, ApiError> {
    use checkout_gateways::stripe_checkout;

    let client = state.webhooks.stripe.clone().ok_or_else(|| disabled("Stripe"))?;
    let provided = header(&headers, stripe_checkout::SIGNATURE_HEADER);

    let verify = signature_required(&state, "stripe", client.can_verify(), provided.is_some())?;
    let event = match provided {
        Some(provided) if verify => client.verify_webhook(&body, provided),
        _ => stripe_checkout::parse_webhook(&body),
    }
    .map_err(|e| api_error(&e))?;

    let outcome = state
        .confirmation
        .ingest(event)
        .await
        .map_err(|e| api_error(&e))?;

    Ok(Json(outcome))
}

/// Buyer return from PayPal; always answers with a redirect
pub async fn paypal_callback(
    State(state): State<AppState>,
    params: Result<Query<CaptureReturn>, QueryRejection>,
) -> Redirect {
    let redirect = match params {
        Ok(Query(params)) => state.confirmation.capture_return(params).await,
        Err(e) => {
            tracing::warn!("Malformed capture callback: {}", e);
            CaptureRedirect::Failed(None)
        }
    };

    let frontend = &state.frontend_url;
    let target = match redirect {
        CaptureRedirect::Course(course_id) => format!("{}/courses/{}", frontend, course_id),
        CaptureRedirect::Failed(Some(payment_id)) => {
            format!("{}/payments/failed?payment_id={}", frontend, payment_id)
        }
        CaptureRedirect::Failed(None) => format!("{}/payments/failed", frontend),
    };
    Redirect::to(&target)
}
