//! Payment error types.

use common::OrderId;
use fulfillment::FulfillmentError;
use store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PaymentError {
    /// Merchant id, secret or gateway URL is missing from the configuration.
    #[error("Payment gateway credentials are not configured")]
    GatewayNotConfigured,

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("No payment exists for order {0}")]
    PaymentNotFound(OrderId),

    /// A callback arrived without `platform_order_id`.
    #[error("Callback is missing the order id")]
    MissingOrderId,

    #[error("Callback order id is not valid: {0}")]
    InvalidOrderId(String),

    #[error("Callback is missing field '{0}'")]
    MissingField(&'static str),

    #[error("Unknown payment status '{0}'")]
    UnknownStatus(String),

    /// The HMAC over the callback fields did not match.
    #[error("Callback signature mismatch")]
    SignatureMismatch,

    /// The callback reuses the nonce of the outbound payment request.
    #[error("Callback nonce was already used by the payment request")]
    NonceReused,

    /// The order is not awaiting a gateway payment.
    #[error("Order {order_id} cannot be paid through the gateway: {reason}")]
    NotPayable { order_id: OrderId, reason: String },

    /// Signed amount or currency differ from the stored payment request.
    #[error("Callback amount {amount} {currency} does not match the payment request")]
    AmountMismatch { amount: String, currency: String },

    #[error(transparent)]
    Transition(#[from] domain::TransitionError),

    #[error("Concurrent update on payment for order {0}, try again")]
    Contention(OrderId),

    #[error(transparent)]
    Fulfillment(FulfillmentError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<FulfillmentError> for PaymentError {
    fn from(err: FulfillmentError) -> Self {
        match err {
            FulfillmentError::OrderNotFound(order_id) => PaymentError::OrderNotFound(order_id),
            other => PaymentError::Fulfillment(other),
        }
    }
}

/// Convenience type alias for payment results.
pub type Result<T> = std::result::Result<T, PaymentError>;
