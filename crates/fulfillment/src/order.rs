//! Order manager: checkout and order status changes.

use std::sync::Arc;

use chrono::{FixedOffset, Utc};
use common::{CartId, OrderId};
use domain::{
    CheckoutDetails, FulfillmentJob, Order, OrderStatus, PaymentStatus, format_order_number,
};
use store::{CartRepository, OrderRepository, StoreError};

use crate::error::{FulfillmentError, Result};
use crate::runner::{FulfillmentReport, FulfillmentRunner};

/// Attempts made by optimistic read-modify-write loops before giving up.
pub const MAX_UPDATE_ATTEMPTS: usize = 3;

/// Converts carts into orders and owns every later order status change.
pub struct OrderManager {
    carts: Arc<dyn CartRepository>,
    orders: Arc<dyn OrderRepository>,
    runner: Arc<FulfillmentRunner>,
    day_offset: FixedOffset,
}

impl OrderManager {
    /// `day_offset` selects the local day used for order numbers.
    pub fn new(
        carts: Arc<dyn CartRepository>,
        orders: Arc<dyn OrderRepository>,
        runner: Arc<FulfillmentRunner>,
        day_offset: FixedOffset,
    ) -> Self {
        Self {
            carts,
            orders,
            runner,
            day_offset,
        }
    }

    pub fn runner(&self) -> &Arc<FulfillmentRunner> {
        &self.runner
    }

    /// Checks out a cart.
    ///
    /// Once the order and its job are stored the order exists for good:
    /// cart conversion, stock decrements and seller fan-out run afterwards
    /// and their failures are reported, not returned.
    #[tracing::instrument(skip(self, details))]
    pub async fn create_order(
        &self,
        cart_id: CartId,
        details: CheckoutDetails,
    ) -> Result<(Order, FulfillmentReport)> {
        let started = std::time::Instant::now();

        let cart = self
            .carts
            .get_cart(cart_id)
            .await?
            .ok_or(FulfillmentError::CartNotFound(cart_id))?;
        Order::check_checkout(&cart, &details)?;

        let now = Utc::now();
        let day = now.with_timezone(&self.day_offset).date_naive();
        let seq = self.orders.next_order_sequence(day).await?;

        let mut order = Order::place(
            OrderId::new(),
            format_order_number(day, seq),
            &cart,
            details,
            now,
        )?;
        if !order.payment_method().uses_gateway() {
            order.transition(OrderStatus::Confirmed, now)?;
        }

        let job = FulfillmentJob::new(order.id(), now);
        self.orders
            .insert_order(&order, &job)
            .await
            .map_err(|e| match e {
                StoreError::AlreadyExists { .. } => {
                    FulfillmentError::Order(domain::OrderError::CartNotActive {
                        cart_id,
                        status: domain::CartStatus::Converted,
                    })
                }
                other => other.into(),
            })?;

        metrics::counter!("orders_created_total").increment(1);
        tracing::info!(
            order_id = %order.id(),
            order_number = order.order_number(),
            grand_total = %order.totals().grand_total(),
            sellers = order.seller_ids().len(),
            "order created"
        );

        let report = self.runner.apply(&order).await;

        metrics::histogram!("checkout_duration_seconds").record(started.elapsed().as_secs_f64());
        Ok((order, report))
    }

    pub async fn get(&self, order_id: OrderId) -> Result<Order> {
        self.orders
            .get_order(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))
    }

    /// Moves an order to `to` if the state machine allows it. A refund also
    /// marks a completed payment as refunded on the order.
    #[tracing::instrument(skip(self))]
    pub async fn transition(&self, order_id: OrderId, to: OrderStatus) -> Result<Order> {
        let order = self
            .update(order_id, |order| {
                let now = Utc::now();
                let mut changed = false;
                if order.status() != to {
                    order.transition(to, now)?;
                    changed = true;
                }
                if to == OrderStatus::Refunded
                    && order.payment_status() == PaymentStatus::Completed
                {
                    changed |= order.record_payment_status(PaymentStatus::Refunded, now);
                }
                Ok(changed)
            })
            .await?;
        tracing::info!(status = %order.status(), "order status changed");
        Ok(order)
    }

    /// Optimistic read-modify-write on an order.
    ///
    /// `mutate` returns whether it changed anything; unchanged orders are not
    /// written. On a version conflict the order is reloaded and `mutate`
    /// re-applied, up to [`MAX_UPDATE_ATTEMPTS`] times.
    pub async fn update<F>(&self, order_id: OrderId, mut mutate: F) -> Result<Order>
    where
        F: FnMut(&mut Order) -> Result<bool> + Send,
    {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let mut order = self.get(order_id).await?;
            if !mutate(&mut order)? {
                return Ok(order);
            }

            match self.orders.save_order(&order, order.version()).await {
                Ok(version) => {
                    order.set_version(version);
                    return Ok(order);
                }
                Err(e) if e.is_conflict() => {
                    tracing::debug!(%order_id, attempt, "order version conflict, reloading");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(FulfillmentError::Contention(format!("order {order_id}")))
    }
}
