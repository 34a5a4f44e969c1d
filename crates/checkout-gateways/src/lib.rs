//! # checkout-gateways
//!
//! Provider adapters for course checkout.
//!
//! | method | adapter | family |
//! |---|---|---|
//! | `dev`, `card`, `bank_transfer` | [`SyntheticAdapter`] | resolved locally after a delay |
//! | `paypal` | [`PayPalAdapter`] | redirect checkout, captured on return |
//! | `coinbase` | [`CoinbaseAdapter`] | hosted charge, confirmed by webhook |
//! | `stripe` | `StripeAdapter` (feature `stripe`) | hosted session, confirmed by webhook |
//!
//! Each remote adapter also owns the parsing and signature check for its
//! provider's webhooks, producing a [`checkout_core::ProviderEvent`].
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_gateways::{PayPalAdapter, PayPalConfig};
//!
//! let config = PayPalConfig::from_env("https://api.example.com", "https://example.com")?;
//! registry.register(PaymentMethod::PayPal, PayPalAdapter::new(config, timeout)?);
//! ```

pub mod coinbase;
mod http;
pub mod paypal;
pub mod signature;
#[cfg(feature = "stripe")]
pub mod stripe_checkout;
mod synthetic;

pub use coinbase::{CoinbaseAdapter, CoinbaseConfig};
pub use paypal::{select_approval_link, Link, PayPalAdapter, PayPalConfig, PayPalTransmission};
#[cfg(feature = "stripe")]
pub use stripe_checkout::StripeAdapter;
pub use synthetic::{generate_reference, SyntheticAdapter};
