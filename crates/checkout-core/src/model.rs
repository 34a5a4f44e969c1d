//! Domain Models
//!
//! The ledger row and the identifiers and enums it is built from.
//! All monetary values use `rust_decimal`.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};

macro_rules! numeric_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl $name {
            pub fn get(self) -> u64 {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

numeric_id!(
    /// Ledger-assigned payment identifier
    PaymentId
);
numeric_id!(
    /// Buyer identifier (owned by the user directory)
    UserId
);
numeric_id!(
    /// Catalog item identifier (owned by the course catalog)
    CourseId
);

/// Payment lifecycle state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentState {
    Pending,
    Approved,
    Rejected,
}

impl PaymentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentState::Pending => "pending",
            PaymentState::Approved => "approved",
            PaymentState::Rejected => "rejected",
        }
    }

    /// Terminal states never change again
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PaymentState::Pending)
    }
}

impl std::fmt::Display for PaymentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentState {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(PaymentState::Pending),
            "approved" => Ok(PaymentState::Approved),
            "rejected" => Ok(PaymentState::Rejected),
            other => Err(CheckoutError::WebhookParse(format!("unknown payment state '{}'", other))),
        }
    }
}

/// How a method family reaches confirmation
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderFamily {
    /// No external provider; resolved by a scheduled task
    Synthetic,

    /// Buyer is redirected to approve, then returns for capture
    RedirectCheckout,

    /// Provider hosts the whole checkout and reports back by webhook
    HostedCharge,
}

/// Closed set of payment method tags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Dev,
    Card,
    BankTransfer,
    #[serde(rename = "paypal")]
    PayPal,
    Coinbase,
    Stripe,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 6] = [
        PaymentMethod::Dev,
        PaymentMethod::Card,
        PaymentMethod::BankTransfer,
        PaymentMethod::PayPal,
        PaymentMethod::Coinbase,
        PaymentMethod::Stripe,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Dev => "dev",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::PayPal => "paypal",
            PaymentMethod::Coinbase => "coinbase",
            PaymentMethod::Stripe => "stripe",
        }
    }

    pub fn family(&self) -> ProviderFamily {
        match self {
            PaymentMethod::Dev | PaymentMethod::Card | PaymentMethod::BankTransfer => {
                ProviderFamily::Synthetic
            }
            PaymentMethod::PayPal => ProviderFamily::RedirectCheckout,
            PaymentMethod::Coinbase | PaymentMethod::Stripe => ProviderFamily::HostedCharge,
        }
    }

    /// Prefix used for locally generated transaction references
    pub fn reference_prefix(&self) -> &'static str {
        match self {
            PaymentMethod::Dev => "dev",
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "trf",
            PaymentMethod::PayPal => "pp",
            PaymentMethod::Coinbase => "cb",
            PaymentMethod::Stripe => "cs",
        }
    }
}

impl std::fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentMethod {
    type Err = CheckoutError;

    fn from_str(s: &str) -> Result<Self> {
        let tag = s.trim().to_lowercase();
        PaymentMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == tag)
            .ok_or_else(|| CheckoutError::InvalidMethod(s.to_string()))
    }
}

/// Card fields required by the `card` method. Never persisted.
#[derive(Clone, Deserialize)]
pub struct CardDetails {
    pub number: String,
    pub expiry: String,
    pub cvv: String,
}

impl CardDetails {
    /// Names of the fields that are blank
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.number.trim().is_empty() {
            missing.push("card.number");
        }
        if self.expiry.trim().is_empty() {
            missing.push("card.expiry");
        }
        if self.cvv.trim().is_empty() {
            missing.push("card.cvv");
        }
        missing
    }
}

impl std::fmt::Debug for CardDetails {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let last4: String = self
            .number
            .chars()
            .rev()
            .take(4)
            .collect::<Vec<_>>()
            .into_iter()
            .rev()
            .collect();
        f.debug_struct("CardDetails")
            .field("number", &format_args!("****{}", last4))
            .finish_non_exhaustive()
    }
}

/// Normalize and validate a three-letter currency code
pub fn normalize_currency(code: &str) -> Result<String> {
    let code = code.trim();
    if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
        Ok(code.to_ascii_uppercase())
    } else {
        Err(CheckoutError::InvalidCurrency(code.to_string()))
    }
}

/// A purchase attempt recorded in the ledger
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Payment {
    /// Ledger identity
    pub id: PaymentId,

    /// Buyer
    pub buyer_id: UserId,

    /// Purchased course
    pub course_id: CourseId,

    /// Charged amount
    pub amount: Decimal,

    /// Upper-case currency code
    pub currency: String,

    /// Selected method
    pub method: PaymentMethod,

    /// Current state
    pub state: PaymentState,

    /// Provider-assigned reference; empty until initiation succeeds
    #[serde(default)]
    pub external_reference: String,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last state or reference change
    pub updated_at: DateTime<Utc>,
}

impl Payment {
    pub fn is_pending(&self) -> bool {
        self.state == PaymentState::Pending
    }

    pub fn is_approved(&self) -> bool {
        self.state == PaymentState::Approved
    }

    pub fn has_reference(&self) -> bool {
        !self.external_reference.is_empty()
    }
}

/// Fields supplied when creating a ledger row
#[derive(Clone, Debug)]
pub struct NewPayment {
    pub buyer_id: UserId,
    pub course_id: CourseId,
    pub amount: Decimal,
    pub currency: String,
    pub method: PaymentMethod,
}

impl NewPayment {
    /// Materialize a pending row with the given id
    pub fn into_payment(self, id: PaymentId, now: DateTime<Utc>) -> Payment {
        Payment {
            id,
            buyer_id: self.buyer_id,
            course_id: self.course_id,
            amount: self.amount,
            currency: self.currency,
            method: self.method,
            state: PaymentState::Pending,
            external_reference: String::new(),
            created_at: now,
            updated_at: now,
        }
    }
}
