//! Payment gateway adapter.
//!
//! Builds HMAC-signed payment requests for the hosted payment page, keeps one
//! [`PaymentRecord`](domain::PaymentRecord) per order and applies verified
//! gateway callbacks to the payment and its order. Callbacks are idempotent:
//! once a payment is terminal, repeats are acknowledged without effect.

pub mod config;
pub mod error;
pub mod gateway;
pub mod signing;

pub use config::GatewayConfig;
pub use error::{PaymentError, Result};
pub use gateway::{PaymentGateway, PaymentRequest, ReturnParams, WebhookOutcome};
