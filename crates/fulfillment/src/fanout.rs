//! Seller fan-out projector.

use std::sync::Arc;

use chrono::Utc;
use domain::{Order, SellerOrderView};
use store::SellerOrderRepository;

use crate::error::Result;

/// Replicates an order into one view per seller.
#[derive(Clone)]
pub struct SellerFanout {
    views: Arc<dyn SellerOrderRepository>,
}

impl SellerFanout {
    pub fn new(views: Arc<dyn SellerOrderRepository>) -> Self {
        Self { views }
    }

    /// Writes the order's seller views in a single batch.
    ///
    /// Views that already exist are left alone, so projecting the same order
    /// twice is harmless. Returns the number of views written.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id()))]
    pub async fn project(&self, order: &Order) -> Result<usize> {
        let views = SellerOrderView::project(order, Utc::now());
        let sellers = views.len();
        let written = self.views.insert_missing_views(&views).await?;

        tracing::info!(sellers, written, "seller views projected");
        Ok(written)
    }
}
