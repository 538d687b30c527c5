//! Repository traits, one per aggregate.
//!
//! All implementations must be thread-safe (Send + Sync). Writes that the
//! domain treats as status transitions take an `expected_version` and fail
//! with [`StoreError::ConcurrencyConflict`](crate::StoreError) when another
//! writer got there first.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{CartId, Money, OrderId, PaymentId, ProductId, SellerId};
use domain::{
    Cart, FulfillmentJob, Order, OwnerKey, PaymentRecord, Product, SellerOrderView, StockChange,
};

use crate::Result;

#[async_trait]
pub trait CartRepository: Send + Sync {
    async fn get_cart(&self, cart_id: CartId) -> Result<Option<Cart>>;

    /// Returns the owner's active cart, if any.
    async fn find_active_cart(&self, owner_key: &OwnerKey) -> Result<Option<Cart>>;

    /// Inserts a cart, or replaces the stored copy while it is still
    /// active. Last write wins among active carts; a stored cart that has
    /// been converted, merged or abandoned is final.
    ///
    /// Returns `false` when the write was refused for that reason.
    async fn save_cart(&self, cart: &Cart) -> Result<bool>;

    /// Active carts not touched since `before`.
    async fn list_idle_carts(&self, before: DateTime<Utc>) -> Result<Vec<Cart>>;
}

#[async_trait]
pub trait ProductRepository: Send + Sync {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>>;

    /// Inserts or replaces a catalogue entry.
    async fn upsert_product(&self, product: &Product) -> Result<()>;

    /// Changes the list price; existing orders keep their captured price.
    async fn set_price(&self, product_id: &ProductId, price: Money) -> Result<()>;

    /// Atomically decrements stock in a transaction scoped to one product.
    ///
    /// `new = max(0, stock - quantity)`; an oversell deactivates the product.
    /// When `order_id` is given, the movement is recorded in the same
    /// transaction and a repeat for the same (order, product) returns
    /// `Ok(None)` without touching stock.
    async fn decrement_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
        order_id: Option<OrderId>,
    ) -> Result<Option<StockChange>>;
}

#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persists a new order together with its fulfillment job, atomically.
    async fn insert_order(&self, order: &Order, job: &FulfillmentJob) -> Result<()>;

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>>;

    /// Saves a status change; returns the new version.
    async fn save_order(&self, order: &Order, expected_version: u64) -> Result<u64>;

    /// Atomically increments and returns the order counter for `day`.
    async fn next_order_sequence(&self, day: NaiveDate) -> Result<u64>;
}

#[async_trait]
pub trait SellerOrderRepository: Send + Sync {
    /// Writes all views in one batch, skipping (order, seller) pairs that
    /// already exist so a replay never resets a seller's progress.
    /// Returns the number of views inserted.
    async fn insert_missing_views(&self, views: &[SellerOrderView]) -> Result<usize>;

    async fn get_view(
        &self,
        order_id: OrderId,
        seller_id: &SellerId,
    ) -> Result<Option<SellerOrderView>>;

    async fn list_views_for_order(&self, order_id: OrderId) -> Result<Vec<SellerOrderView>>;

    async fn list_views_for_seller(&self, seller_id: &SellerId) -> Result<Vec<SellerOrderView>>;

    /// Saves a seller status change; returns the new version.
    async fn save_view(&self, view: &SellerOrderView, expected_version: u64) -> Result<u64>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    /// Inserts a new record; fails with `AlreadyExists` if the order has one.
    async fn insert_payment(&self, record: &PaymentRecord) -> Result<()>;

    async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<PaymentRecord>>;

    async fn find_payment_by_order(&self, order_id: OrderId) -> Result<Option<PaymentRecord>>;

    /// Saves a status change; returns the new version.
    async fn save_payment(&self, record: &PaymentRecord, expected_version: u64) -> Result<u64>;
}

#[async_trait]
pub trait FulfillmentJobRepository: Send + Sync {
    async fn get_job(&self, order_id: OrderId) -> Result<Option<FulfillmentJob>>;

    /// Inserts or replaces a job.
    async fn save_job(&self, job: &FulfillmentJob) -> Result<()>;

    /// Pending jobs, oldest first.
    async fn list_pending_jobs(&self, limit: usize) -> Result<Vec<FulfillmentJob>>;
}
