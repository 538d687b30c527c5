//! Order aggregate implementation.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use common::{CartId, Money, OrderId, ProductId, SellerId};
use serde::{Deserialize, Serialize};

use crate::cart::{Cart, OwnerKey};
use crate::payment::PaymentStatus;
use crate::pricing::Totals;

use super::{Address, CheckoutDetails, Customer, OrderError, OrderStatus, PaymentMethod};

/// A line of an order with the price captured at checkout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub seller_id: SellerId,
    pub product_name: String,
    pub variation_id: Option<String>,
    /// Set when the line was expanded from a cart bundle.
    pub bundle_code: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub total_price: Money,
}

/// Order aggregate root.
///
/// An order is an immutable snapshot of a checkout. The only permitted
/// mutations are status transitions, which bump `version`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    id: OrderId,
    order_number: String,
    cart_id: CartId,
    owner_key: OwnerKey,
    customer: Customer,
    billing_address: Address,
    shipping_address: Address,
    payment_method: PaymentMethod,
    lines: Vec<OrderLine>,
    totals: Totals,
    status: OrderStatus,
    payment_status: PaymentStatus,
    version: u64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

// Query methods
impl Order {
    pub fn id(&self) -> OrderId {
        self.id
    }

    pub fn order_number(&self) -> &str {
        &self.order_number
    }

    pub fn cart_id(&self) -> CartId {
        self.cart_id
    }

    pub fn owner_key(&self) -> &OwnerKey {
        &self.owner_key
    }

    pub fn customer(&self) -> &Customer {
        &self.customer
    }

    pub fn billing_address(&self) -> &Address {
        &self.billing_address
    }

    pub fn shipping_address(&self) -> &Address {
        &self.shipping_address
    }

    pub fn payment_method(&self) -> PaymentMethod {
        self.payment_method
    }

    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    pub fn status(&self) -> OrderStatus {
        self.status
    }

    pub fn payment_status(&self) -> PaymentStatus {
        self.payment_status
    }

    /// Returns the optimistic concurrency version.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns the distinct sellers in this order, in sorted order.
    pub fn seller_ids(&self) -> BTreeSet<SellerId> {
        self.lines.iter().map(|l| l.seller_id.clone()).collect()
    }

    /// Returns the total quantity per product across all lines.
    pub fn quantities_by_product(&self) -> Vec<(ProductId, u32)> {
        let mut totals: Vec<(ProductId, u32)> = Vec::new();
        for line in &self.lines {
            match totals.iter_mut().find(|(id, _)| *id == line.product_id) {
                Some((_, qty)) => *qty = qty.saturating_add(line.quantity),
                None => totals.push((line.product_id.clone(), line.quantity)),
            }
        }
        totals
    }
}

// Command methods
impl Order {
    /// Checks everything `place` requires without building the order.
    pub fn check_checkout(cart: &Cart, details: &CheckoutDetails) -> Result<(), OrderError> {
        if !cart.status().can_modify() {
            return Err(OrderError::CartNotActive {
                cart_id: cart.id(),
                status: cart.status(),
            });
        }
        if cart.is_empty() {
            return Err(OrderError::EmptyCart { cart_id: cart.id() });
        }
        details.validate()?;
        Ok(())
    }

    /// Snapshots a cart into a new pending order.
    ///
    /// Prices, names and totals are copied, so later product changes do not
    /// affect the order.
    pub fn place(
        id: OrderId,
        order_number: String,
        cart: &Cart,
        details: CheckoutDetails,
        now: DateTime<Utc>,
    ) -> Result<Self, OrderError> {
        Self::check_checkout(cart, &details)?;

        let mut lines: Vec<OrderLine> = cart
            .items()
            .iter()
            .map(|item| OrderLine {
                product_id: item.product_id.clone(),
                seller_id: item.seller_id.clone(),
                product_name: item.product_name.clone(),
                variation_id: item.variation_id.clone(),
                bundle_code: None,
                quantity: item.quantity(),
                unit_price: item.unit_price(),
                total_price: item.total_price(),
            })
            .collect();

        for bundle in cart.bundles() {
            for line in &bundle.lines {
                let quantity = line.quantity.saturating_mul(bundle.quantity);
                lines.push(OrderLine {
                    product_id: line.product_id.clone(),
                    seller_id: line.seller_id.clone(),
                    product_name: line.product_name.clone(),
                    variation_id: None,
                    bundle_code: Some(bundle.code.clone()),
                    quantity,
                    unit_price: line.unit_price,
                    total_price: line.unit_price.multiply(quantity),
                });
            }
        }

        Ok(Self {
            id,
            order_number,
            cart_id: cart.id(),
            owner_key: cart.owner_key().clone(),
            customer: details.customer,
            billing_address: details.billing_address,
            shipping_address: details.shipping_address,
            payment_method: details.payment_method,
            lines,
            totals: *cart.totals(),
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            version: 0,
            created_at: now,
            updated_at: now,
        })
    }

    /// Moves the order to a new status if the state machine allows it.
    pub fn transition(&mut self, next: OrderStatus, now: DateTime<Utc>) -> Result<(), OrderError> {
        self.status = self.status.transition(next)?;
        self.updated_at = now;
        Ok(())
    }

    /// Mirrors the payment record's status onto the order.
    ///
    /// Returns `false` when the status would not move forward.
    pub fn record_payment_status(&mut self, status: PaymentStatus, now: DateTime<Utc>) -> bool {
        if !self.payment_status.can_transition_to(status) {
            return false;
        }
        self.payment_status = status;
        self.updated_at = now;
        true
    }

    /// Bumps the version after a successful save.
    pub fn set_version(&mut self, version: u64) {
        self.version = version;
    }
}
