//! Cart lines and bundles.

use common::{ItemId, Money, ProductId, SellerId};
use serde::{Deserialize, Serialize};

use crate::product::Product;

/// A single product line in a cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub id: ItemId,
    pub product_id: ProductId,
    pub seller_id: SellerId,
    pub product_name: String,
    pub variation_id: Option<String>,
    pub(super) quantity: u32,
    /// Unit price captured when the item was (last) added.
    pub(super) unit_price: Money,
    /// Product stock at add-time; later quantity updates are clamped to it.
    pub(super) stock_cap: u32,
    total_price: Money,
}

impl CartItem {
    pub(crate) fn from_product(
        product: &Product,
        quantity: u32,
        variation_id: Option<String>,
    ) -> Self {
        let mut item = Self {
            id: ItemId::new(),
            product_id: product.id.clone(),
            seller_id: product.seller_id.clone(),
            product_name: product.name.clone(),
            variation_id,
            quantity,
            unit_price: product.price,
            stock_cap: product.stock,
            total_price: Money::zero(),
        };
        item.refresh_total();
        item
    }

    /// Returns true if this line is for the given product and variation.
    pub fn matches(&self, product_id: &ProductId, variation_id: Option<&str>) -> bool {
        &self.product_id == product_id && self.variation_id.as_deref() == variation_id
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn stock_cap(&self) -> u32 {
        self.stock_cap
    }

    /// Returns `quantity * unit_price`.
    pub fn total_price(&self) -> Money {
        self.total_price
    }

    pub(crate) fn refresh_total(&mut self) {
        self.total_price = self.unit_price.multiply(self.quantity);
    }
}

/// One product inside a bundle, per bundle unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleLine {
    pub product_id: ProductId,
    pub seller_id: SellerId,
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl BundleLine {
    pub fn from_product(product: &Product, quantity: u32) -> Self {
        Self {
            product_id: product.id.clone(),
            seller_id: product.seller_id.clone(),
            product_name: product.name.clone(),
            quantity,
            unit_price: product.price,
        }
    }
}

/// A set of products sold together for a fixed bundle price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartBundle {
    pub id: ItemId,
    pub code: String,
    pub name: String,
    pub lines: Vec<BundleLine>,
    /// Number of bundles.
    pub quantity: u32,
    /// Price of one bundle.
    pub bundle_price: Money,
}

impl CartBundle {
    pub fn new(
        code: impl Into<String>,
        name: impl Into<String>,
        lines: Vec<BundleLine>,
        quantity: u32,
        bundle_price: Money,
    ) -> Self {
        Self {
            id: ItemId::new(),
            code: code.into(),
            name: name.into(),
            lines,
            quantity,
            bundle_price,
        }
    }

    /// List price of one bundle (sum of its lines at unit price).
    pub fn unit_list_price(&self) -> Money {
        self.lines
            .iter()
            .map(|line| line.unit_price.multiply(line.quantity))
            .sum()
    }

    /// List price of all bundles; counted in the cart subtotal.
    pub fn list_total(&self) -> Money {
        self.unit_list_price().multiply(self.quantity)
    }

    /// What the customer actually pays for the bundles.
    pub fn total_price(&self) -> Money {
        self.bundle_price.multiply(self.quantity)
    }

    /// Savings against list price; counted in the cart discount.
    pub fn savings(&self) -> Money {
        (self.unit_list_price() - self.bundle_price)
            .non_negative()
            .multiply(self.quantity)
    }
}
