//! Stock ledger: the only writer of product stock.

use std::sync::Arc;

use common::{OrderId, ProductId};
use domain::StockChange;
use store::{ProductRepository, StoreError};

use crate::error::{FulfillmentError, Result};

/// Atomic per-product stock decrements.
///
/// Insufficient stock is not an error: the counter is clamped at zero and the
/// product deactivated, and the oversell is logged and counted.
#[derive(Clone)]
pub struct StockLedger {
    products: Arc<dyn ProductRepository>,
}

impl StockLedger {
    pub fn new(products: Arc<dyn ProductRepository>) -> Self {
        Self { products }
    }

    /// Decrements stock outside of any order, e.g. for manual corrections.
    #[tracing::instrument(skip(self))]
    pub async fn decrement(&self, product_id: &ProductId, quantity: u32) -> Result<StockChange> {
        let change = self
            .products
            .decrement_stock(product_id, quantity, None)
            .await
            .map_err(|e| not_found_as_product(e, product_id))?
            .ok_or_else(|| FulfillmentError::ProductNotFound(product_id.clone()))?;
        record(&change, None);
        Ok(change)
    }

    /// Decrements stock on behalf of an order.
    ///
    /// Returns `None` when this (order, product) pair was already applied.
    #[tracing::instrument(skip(self))]
    pub async fn decrement_for_order(
        &self,
        order_id: OrderId,
        product_id: &ProductId,
        quantity: u32,
    ) -> Result<Option<StockChange>> {
        let change = self
            .products
            .decrement_stock(product_id, quantity, Some(order_id))
            .await
            .map_err(|e| not_found_as_product(e, product_id))?;

        match &change {
            Some(change) => record(change, Some(order_id)),
            None => tracing::debug!(%order_id, %product_id, "stock already applied"),
        }
        Ok(change)
    }
}

fn not_found_as_product(err: StoreError, product_id: &ProductId) -> FulfillmentError {
    match err {
        StoreError::NotFound { .. } => FulfillmentError::ProductNotFound(product_id.clone()),
        other => other.into(),
    }
}

fn record(change: &StockChange, order_id: Option<OrderId>) {
    if change.oversold {
        metrics::counter!("stock_oversold_total").increment(1);
        tracing::warn!(
            order_id = ?order_id,
            product_id = %change.product_id,
            previous = change.previous,
            requested = change.requested,
            "stock oversold, product deactivated"
        );
    } else {
        tracing::debug!(
            order_id = ?order_id,
            product_id = %change.product_id,
            new_stock = change.new_stock,
            "stock decremented"
        );
    }
}
