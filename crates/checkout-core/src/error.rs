//! Error Types

use thiserror::Error;

/// Result type alias for checkout operations
pub type Result<T> = std::result::Result<T, CheckoutError>;

/// Checkout error taxonomy
#[derive(Error, Debug)]
pub enum CheckoutError {
    /// Payment method tag is unknown or not enabled in this deployment
    #[error("Invalid payment method: {0}")]
    InvalidMethod(String),
    
    /// Method-specific fields are missing
    #[error("Missing fields: {0}")]
    MissingFields(String),
    
    /// Currency code is malformed
    #[error("Invalid currency: {0}")]
    InvalidCurrency(String),
    
    /// Amount is not positive or does not match the catalog price
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    
    /// Catalog item not found
    #[error("Item not found: {0}")]
    ItemNotFound(u64),
    
    /// Provider timed out or is down (retryable)
    #[error("Provider unavailable: {0}")]
    ProviderUnavailable(String),
    
    /// Provider actively refused the request
    #[error("Provider rejected request: {0}")]
    ProviderRejected(String),
    
    /// Unknown payment id or reference
    #[error("Payment not found: {0}")]
    PaymentNotFound(String),
    
    /// Ledger unavailable
    #[error("Database error: {0}")]
    Database(String),
    
    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),
    
    /// Webhook payload is structurally invalid
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),
    
    /// Operation not supported by the selected adapter
    #[error("Unsupported operation: {0}")]
    Unsupported(String),
    
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CheckoutError {
    /// Check if this error is retryable
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CheckoutError::ProviderUnavailable(_) | CheckoutError::Database(_)
        )
    }
    
    /// Stable machine-readable error code
    pub fn code(&self) -> &'static str {
        match self {
            CheckoutError::InvalidMethod(_) => "INVALID_METHOD",
            CheckoutError::MissingFields(_) => "MISSING_FIELDS",
            CheckoutError::InvalidCurrency(_) => "INVALID_CURRENCY",
            CheckoutError::InvalidAmount(_) => "INVALID_AMOUNT",
            CheckoutError::ItemNotFound(_) => "ITEM_NOT_FOUND",
            CheckoutError::ProviderUnavailable(_) => "PROVIDER_UNAVAILABLE",
            CheckoutError::ProviderRejected(_) => "PROVIDER_REJECTED",
            CheckoutError::PaymentNotFound(_) => "PAYMENT_NOT_FOUND",
            CheckoutError::Database(_) => "DATABASE_ERROR",
            CheckoutError::WebhookSignature(_) => "INVALID_SIGNATURE",
            CheckoutError::WebhookParse(_) => "INVALID_PAYLOAD",
            CheckoutError::Unsupported(_) => "UNSUPPORTED",
            CheckoutError::Config(_) => "PAYMENTS_DISABLED",
        }
    }
    
    /// Get user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            CheckoutError::InvalidMethod(method) => format!("Payment method '{}' is not available.", method),
            CheckoutError::MissingFields(fields) => format!("Missing required payment details: {}.", fields),
            CheckoutError::InvalidCurrency(code) => format!("Currency '{}' is not supported.", code),
            CheckoutError::InvalidAmount(reason) => format!("Invalid amount: {}.", reason),
            CheckoutError::ItemNotFound(_) => "Course not found.".into(),
            CheckoutError::ProviderUnavailable(_) => "The payment provider is currently unavailable. Please try again.".into(),
            CheckoutError::ProviderRejected(_) => "The payment provider declined the request.".into(),
            CheckoutError::PaymentNotFound(_) => "Payment not found.".into(),
            CheckoutError::Config(_) => "Payments are not configured.".into(),
            _ => "An error occurred processing your payment.".into(),
        }
    }
}
