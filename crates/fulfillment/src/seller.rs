//! Seller-driven status changes and their propagation to the order.

use std::sync::Arc;

use chrono::Utc;
use common::{OrderId, SellerId};
use domain::{Order, OrderStatus, SellerOrderStatus, SellerOrderView, derived_order_status};
use store::SellerOrderRepository;

use crate::error::{FulfillmentError, Result};
use crate::order::{MAX_UPDATE_ATTEMPTS, OrderManager};

/// Forward path an order takes once sellers start moving.
const FULFILLMENT_PATH: [OrderStatus; 3] = [
    OrderStatus::Processing,
    OrderStatus::Shipped,
    OrderStatus::Delivered,
];

pub struct SellerOrderService {
    views: Arc<dyn SellerOrderRepository>,
    orders: Arc<OrderManager>,
}

impl SellerOrderService {
    pub fn new(views: Arc<dyn SellerOrderRepository>, orders: Arc<OrderManager>) -> Self {
        Self { views, orders }
    }

    pub async fn list_for_seller(&self, seller_id: &SellerId) -> Result<Vec<SellerOrderView>> {
        Ok(self.views.list_views_for_seller(seller_id).await?)
    }

    pub async fn list_for_order(&self, order_id: OrderId) -> Result<Vec<SellerOrderView>> {
        Ok(self.views.list_views_for_order(order_id).await?)
    }

    pub async fn get(&self, order_id: OrderId, seller_id: &SellerId) -> Result<SellerOrderView> {
        self.views
            .get_view(order_id, seller_id)
            .await?
            .ok_or_else(|| FulfillmentError::SellerOrderNotFound {
                order_id,
                seller_id: seller_id.clone(),
            })
    }

    /// Changes one seller's status. The order itself is untouched until
    /// [`propagate`](Self::propagate) is called.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        seller_id: &SellerId,
        status: SellerOrderStatus,
    ) -> Result<SellerOrderView> {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let mut view = self.get(order_id, seller_id).await?;
            if view.status() == status {
                return Ok(view);
            }
            view.transition(status, Utc::now())?;

            match self.views.save_view(&view, view.version).await {
                Ok(version) => {
                    view.version = version;
                    tracing::info!(%status, "seller order status changed");
                    return Ok(view);
                }
                Err(e) if e.is_conflict() => {
                    tracing::debug!(attempt, "seller order version conflict, reloading");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(FulfillmentError::Contention(format!(
            "seller order {order_id}/{seller_id}"
        )))
    }

    /// Writes the status implied by the seller views onto the order.
    ///
    /// Intermediate steps are applied in order, so a confirmed order whose
    /// sellers all shipped goes through `processing` to `shipped`. An order
    /// that has not been confirmed yet is refused by the state machine.
    #[tracing::instrument(skip(self))]
    pub async fn propagate(&self, order_id: OrderId) -> Result<Order> {
        let views = self.views.list_views_for_order(order_id).await?;
        let Some(target) = derived_order_status(&views) else {
            return self.orders.get(order_id).await;
        };

        let order = self
            .orders
            .update(order_id, |order| advance_towards(order, target))
            .await?;
        tracing::info!(derived = %target, status = %order.status(), "seller status propagated");
        Ok(order)
    }
}

fn advance_towards(order: &mut Order, target: OrderStatus) -> Result<bool> {
    let now = Utc::now();

    if target == OrderStatus::Cancelled {
        if order.status() == OrderStatus::Cancelled {
            return Ok(false);
        }
        order.transition(OrderStatus::Cancelled, now)?;
        return Ok(true);
    }

    let Some(target_idx) = FULFILLMENT_PATH.iter().position(|s| *s == target) else {
        return Ok(false);
    };
    let current_idx = FULFILLMENT_PATH.iter().position(|s| *s == order.status());
    if current_idx.is_some_and(|i| i >= target_idx) {
        return Ok(false);
    }

    let start = current_idx.map_or(0, |i| i + 1);
    for step in &FULFILLMENT_PATH[start..=target_idx] {
        order.transition(*step, now)?;
    }
    Ok(true)
}
