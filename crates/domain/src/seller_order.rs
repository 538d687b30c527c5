//! Per-seller projections of an order.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{Money, OrderId, SellerId};
use serde::{Deserialize, Serialize};

use crate::error::TransitionError;
use crate::order::{Address, Order, OrderLine, OrderStatus};

/// Fulfillment status of one seller's share of an order.
///
/// ```text
/// Preparing ──► Shipped ──► Delivered
///     │            │
///     └────────────┴──► Cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SellerOrderStatus {
    #[default]
    Preparing,
    Shipped,
    Delivered,
    Cancelled,
}

impl SellerOrderStatus {
    pub fn can_transition_to(&self, next: SellerOrderStatus) -> bool {
        use SellerOrderStatus::*;
        matches!(
            (self, next),
            (Preparing, Shipped) | (Shipped, Delivered) | (Preparing, Cancelled) | (Shipped, Cancelled)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SellerOrderStatus::Preparing => "preparing",
            SellerOrderStatus::Shipped => "shipped",
            SellerOrderStatus::Delivered => "delivered",
            SellerOrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "preparing" => Some(SellerOrderStatus::Preparing),
            "shipped" => Some(SellerOrderStatus::Shipped),
            "delivered" => Some(SellerOrderStatus::Delivered),
            "cancelled" => Some(SellerOrderStatus::Cancelled),
            _ => None,
        }
    }
}

impl std::fmt::Display for SellerOrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One seller's view of an order: only that seller's lines.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SellerOrderView {
    pub order_id: OrderId,
    pub seller_id: SellerId,
    pub order_number: String,
    pub customer_name: String,
    pub shipping_address: Address,
    pub lines: Vec<OrderLine>,
    /// Sum of this seller's line totals.
    pub amount: Money,
    status: SellerOrderStatus,
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl SellerOrderView {
    /// Groups an order's lines by seller, one view per seller.
    ///
    /// Output is sorted by seller id.
    pub fn project(order: &Order, now: DateTime<Utc>) -> Vec<SellerOrderView> {
        let mut grouped: BTreeMap<SellerId, Vec<OrderLine>> = BTreeMap::new();
        for line in order.lines() {
            grouped
                .entry(line.seller_id.clone())
                .or_default()
                .push(line.clone());
        }

        grouped
            .into_iter()
            .map(|(seller_id, lines)| SellerOrderView {
                order_id: order.id(),
                seller_id,
                order_number: order.order_number().to_string(),
                customer_name: order.customer().full_name(),
                shipping_address: order.shipping_address().clone(),
                amount: lines.iter().map(|l| l.total_price).sum(),
                lines,
                status: SellerOrderStatus::Preparing,
                version: 0,
                created_at: now,
                updated_at: now,
            })
            .collect()
    }

    pub fn status(&self) -> SellerOrderStatus {
        self.status
    }

    /// Seller-driven status change.
    pub fn transition(
        &mut self,
        next: SellerOrderStatus,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::new("seller order", self.status, next));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }
}

/// Derives the order status implied by its seller views, if any.
///
/// Every view delivered → `Delivered`; every view at least shipped →
/// `Shipped`; any active view beyond preparing → `Processing`. Cancelled
/// views are ignored unless all views are cancelled.
pub fn derived_order_status(views: &[SellerOrderView]) -> Option<OrderStatus> {
    if views.is_empty() {
        return None;
    }
    let active: Vec<SellerOrderStatus> = views
        .iter()
        .map(SellerOrderView::status)
        .filter(|s| *s != SellerOrderStatus::Cancelled)
        .collect();

    if active.is_empty() {
        return Some(OrderStatus::Cancelled);
    }
    if active.iter().all(|s| *s == SellerOrderStatus::Delivered) {
        return Some(OrderStatus::Delivered);
    }
    if active
        .iter()
        .all(|s| matches!(s, SellerOrderStatus::Shipped | SellerOrderStatus::Delivered))
    {
        return Some(OrderStatus::Shipped);
    }
    if active.iter().any(|s| *s != SellerOrderStatus::Preparing) {
        return Some(OrderStatus::Processing);
    }
    None
}
