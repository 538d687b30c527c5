//! Cart and order totals.

use common::Money;
use serde::{Deserialize, Serialize};

/// Marketplace-wide pricing rules applied whenever totals are recomputed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PricingPolicy {
    /// Subtotals at or above this amount ship for free.
    pub free_shipping_threshold: Money,
    /// Shipping fee charged below the threshold.
    pub flat_shipping_fee: Money,
    /// Tax rate in basis points applied to `subtotal - discount`.
    pub tax_rate_bps: u32,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            free_shipping_threshold: Money::from_cents(30_000),
            flat_shipping_fee: Money::from_cents(2_990),
            tax_rate_bps: 0,
        }
    }
}

/// Computed totals of a cart, copied verbatim into the order at checkout.
///
/// There is no public constructor taking the individual amounts: totals only
/// come out of [`Totals::compute`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    subtotal: Money,
    discount: Money,
    tax: Money,
    shipping: Money,
    grand_total: Money,
}

impl Totals {
    /// Computes totals from the list subtotal and the discount.
    ///
    /// `has_lines` is false for an empty basket, which never pays shipping.
    pub fn compute(
        subtotal: Money,
        discount: Money,
        has_lines: bool,
        policy: &PricingPolicy,
    ) -> Self {
        let shipping = if !has_lines || subtotal >= policy.free_shipping_threshold {
            Money::zero()
        } else {
            policy.flat_shipping_fee
        };
        let tax = (subtotal - discount)
            .non_negative()
            .apply_bps(policy.tax_rate_bps);
        let grand_total = subtotal + shipping + tax - discount;

        Self {
            subtotal,
            discount,
            tax,
            shipping,
            grand_total,
        }
    }

    pub fn subtotal(&self) -> Money {
        self.subtotal
    }

    pub fn discount(&self) -> Money {
        self.discount
    }

    pub fn tax(&self) -> Money {
        self.tax
    }

    pub fn shipping(&self) -> Money {
        self.shipping
    }

    pub fn grand_total(&self) -> Money {
        self.grand_total
    }
}
