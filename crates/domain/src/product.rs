//! Product stock entries.

use chrono::{DateTime, Utc};
use common::{Money, ProductId, SellerId};
use serde::{Deserialize, Serialize};

/// A sellable product together with its stock counter.
///
/// `stock` is unsigned: the ledger clamps instead of going negative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub seller_id: SellerId,
    pub name: String,
    pub price: Money,
    pub stock: u32,
    pub active: bool,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn new(
        id: impl Into<ProductId>,
        seller_id: impl Into<SellerId>,
        name: impl Into<String>,
        price: Money,
        stock: u32,
    ) -> Self {
        Self {
            id: id.into(),
            seller_id: seller_id.into(),
            name: name.into(),
            price,
            stock,
            active: true,
            updated_at: Utc::now(),
        }
    }

    /// Returns true when the product can be put in a cart.
    pub fn is_purchasable(&self) -> bool {
        self.active && self.stock > 0
    }

    /// Applies a stock decrement and returns what happened.
    ///
    /// `new_stock = max(0, stock - quantity)`. When the request exceeds the
    /// available stock the product is also deactivated; the oversell is
    /// reported, not prevented.
    pub fn decrement(&mut self, quantity: u32, now: DateTime<Utc>) -> StockChange {
        let previous = self.stock;
        let oversold = quantity > previous;
        self.stock = previous.saturating_sub(quantity);

        let deactivated = oversold && self.active;
        if oversold {
            self.active = false;
        }
        self.updated_at = now;

        StockChange {
            product_id: self.id.clone(),
            previous,
            requested: quantity,
            new_stock: self.stock,
            oversold,
            deactivated,
        }
    }
}

/// Outcome of a single stock decrement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub product_id: ProductId,
    pub previous: u32,
    pub requested: u32,
    pub new_stock: u32,
    /// The request asked for more than was available.
    pub oversold: bool,
    /// This decrement flipped the product to inactive.
    pub deactivated: bool,
}
