//! Order aggregate and related types.

mod aggregate;
pub(crate) mod customer;
mod number;
mod state;

pub use aggregate::{Order, OrderLine};
pub use customer::{Address, CheckoutDetails, Customer, PaymentMethod};
pub use number::format_order_number;
pub use state::OrderStatus;

use common::CartId;
use thiserror::Error;

use crate::cart::CartStatus;
use crate::error::{TransitionError, ValidationError};

/// Errors that can occur during order operations.
#[derive(Debug, Error)]
pub enum OrderError {
    /// The cart snapshot has no items and no bundles.
    #[error("Cart {cart_id} is empty")]
    EmptyCart { cart_id: CartId },

    /// The cart was already converted, merged or abandoned.
    #[error("Cart {cart_id} is {status}; only active carts can be checked out")]
    CartNotActive { cart_id: CartId, status: CartStatus },

    /// Customer or address data failed validation.
    #[error("Invalid checkout details: {0}")]
    Validation(#[from] ValidationError),

    /// The order or payment status machine refused the change.
    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),
}
