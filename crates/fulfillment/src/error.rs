//! Fulfillment error types.

use common::{CartId, OrderId, ProductId, SellerId};
use domain::{CartError, OrderError, TransitionError};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur in the cart, order and fan-out services.
#[derive(Debug, Error)]
pub enum FulfillmentError {
    #[error("Cart not found: {0}")]
    CartNotFound(CartId),

    #[error("Product not found: {0}")]
    ProductNotFound(ProductId),

    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    #[error("Seller order not found: order {order_id}, seller {seller_id}")]
    SellerOrderNotFound {
        order_id: OrderId,
        seller_id: SellerId,
    },

    /// The aggregate kept changing underneath us; retries were exhausted.
    #[error("Concurrent update on {0}, try again")]
    Contention(String),

    /// Cart invariant violated.
    #[error(transparent)]
    Cart(#[from] CartError),

    /// Order invariant violated (empty cart, invalid details, ...).
    #[error(transparent)]
    Order(#[from] OrderError),

    /// A status machine refused the change.
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience type alias for fulfillment results.
pub type Result<T> = std::result::Result<T, FulfillmentError>;
