//! Cart aggregate and related types.

mod aggregate;
mod items;
mod status;

pub use aggregate::Cart;
pub use items::{BundleLine, CartBundle, CartItem};
pub use status::CartStatus;

use common::{ItemId, ProductId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Owner of a cart: a signed-in user id or an anonymous session id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OwnerKey(String);

impl OwnerKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for OwnerKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Errors that can occur during cart operations.
#[derive(Debug, Error)]
pub enum CartError {
    /// The cart no longer accepts mutations.
    #[error("Cart is {status} and cannot be modified")]
    NotActive { status: CartStatus },

    /// Quantities must be strictly positive.
    #[error("Invalid quantity: {quantity} (must be greater than 0)")]
    InvalidQuantity { quantity: i64 },

    /// Item not found in cart.
    #[error("Item not found: {item_id}")]
    ItemNotFound { item_id: ItemId },

    /// Bundle not found in cart.
    #[error("Bundle not found: {bundle_id}")]
    BundleNotFound { bundle_id: ItemId },

    /// The product is inactive and cannot be added.
    #[error("Product unavailable: {product_id}")]
    ProductUnavailable { product_id: ProductId },

    /// The product has no stock left.
    #[error("Product out of stock: {product_id}")]
    OutOfStock { product_id: ProductId },

    /// A bundle must contain at least one line and a positive price.
    #[error("Invalid bundle: {reason}")]
    InvalidBundle { reason: &'static str },
}
