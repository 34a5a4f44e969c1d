//! # checkout-core
//!
//! Payment orchestration for course checkout: the ledger of purchase
//! attempts, the purchase guard, the confirmation channel and the access
//! fact derived from approved payments.
//!
//! ## Flow
//!
//! ```text
//! ┌────────┐  request   ┌───────────────┐ initiate ┌──────────────────┐
//! │ Buyer  │──────────▶│ PurchaseGuard │────────▶│ ProviderAdapter  │
//! └────────┘           └───────┬───────┘         └────────┬─────────┘
//!                              │ insert pending            │ webhook / capture
//!                              ▼                           ▼
//!                      ┌───────────────┐  settle  ┌──────────────────────┐
//!                      │ PaymentLedger │◀────────│ ConfirmationChannel  │
//!                      └───────────────┘          └──────────────────────┘
//! ```
//!
//! A payment leaves `pending` exactly once. Every confirmation path goes
//! through the ledger's conditional transition, so late or conflicting
//! provider signals are acknowledged without effect.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use checkout_core::{PurchaseGuard, PurchaseRequest, Settlement, MemoryLedger};
//!
//! let settlement = Settlement::new(Arc::new(MemoryLedger::new()), Arc::new(TracingActivitySink));
//! let guard = PurchaseGuard::new(settlement, catalog, Arc::new(registry), CheckoutConfig::from_env()?);
//!
//! let outcome = guard.request_purchase(buyer, request).await?;
//! // Redirect the buyer to the checkout URL, if any
//! ```

mod collab;
mod config;
mod confirm;
mod error;
mod events;
mod guard;
pub mod ledger;
mod model;
mod provider;
mod scheduler;
mod settle;

pub use collab::{
    Activity, ActivitySink, Authenticator, Course, CourseCatalog, MemoryActivityLog,
    MemoryCatalog, TracingActivitySink,
};
pub use config::{CheckoutConfig, Environment};
pub use confirm::{
    parse_generic, CaptureRedirect, CaptureReturn, ConfirmationChannel, GenericNotification,
    WebhookOutcome,
};
pub use error::{CheckoutError, Result};
pub use events::{paypal_status_target, ProviderEvent, WebhookSource};
pub use guard::{PaymentStatus, PurchaseGuard, PurchaseOutcome, PurchaseRequest};
pub use ledger::{MemoryLedger, PaymentLedger, Transition};
#[cfg(feature = "sled-ledger")]
pub use ledger::SledLedger;
pub use model::{
    normalize_currency, CardDetails, CourseId, NewPayment, Payment, PaymentId, PaymentMethod,
    PaymentState, ProviderFamily, UserId,
};
pub use provider::{bounded, Initiation, ProviderAdapter, ProviderRegistry};
pub use scheduler::{ScheduledTask, Task, TaskScheduler, TokioScheduler};
pub use settle::Settlement;
