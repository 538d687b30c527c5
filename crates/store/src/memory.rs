use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use common::{CartId, Money, OrderId, PaymentId, ProductId, SellerId};
use domain::{
    Cart, CartStatus, FulfillmentJob, JobStatus, Order, OwnerKey, PaymentRecord, Product,
    SellerOrderView, StockChange,
};
use tokio::sync::RwLock;

use crate::{
    CartRepository, FulfillmentJobRepository, OrderRepository, PaymentRepository,
    ProductRepository, Result, SellerOrderRepository, StoreError,
};

#[derive(Default)]
struct State {
    carts: HashMap<CartId, Cart>,
    products: HashMap<ProductId, Product>,
    stock_movements: HashSet<(OrderId, ProductId)>,
    orders: HashMap<OrderId, Order>,
    order_sequences: HashMap<NaiveDate, u64>,
    seller_orders: HashMap<(OrderId, SellerId), SellerOrderView>,
    payments: HashMap<PaymentId, PaymentRecord>,
    jobs: HashMap<OrderId, FulfillmentJob>,
}

/// In-memory store implementing every repository trait.
///
/// A single lock guards all tables, so multi-table writes such as
/// order + job are atomic just like their PostgreSQL counterparts.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Clears all tables.
    pub async fn clear(&self) {
        *self.state.write().await = State::default();
    }

    /// Number of orders stored.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }
}

fn check_version(
    entity: &'static str,
    id: impl ToString,
    expected: u64,
    actual: u64,
) -> Result<()> {
    if expected != actual {
        return Err(StoreError::ConcurrencyConflict {
            entity,
            id: id.to_string(),
            expected,
            actual,
        });
    }
    Ok(())
}

#[async_trait]
impl CartRepository for InMemoryStore {
    async fn get_cart(&self, cart_id: CartId) -> Result<Option<Cart>> {
        Ok(self.state.read().await.carts.get(&cart_id).cloned())
    }

    async fn find_active_cart(&self, owner_key: &OwnerKey) -> Result<Option<Cart>> {
        let state = self.state.read().await;
        Ok(state
            .carts
            .values()
            .filter(|c| c.owner_key() == owner_key && c.status() == CartStatus::Active)
            .max_by_key(|c| c.updated_at())
            .cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<bool> {
        let mut state = self.state.write().await;
        if let Some(stored) = state.carts.get(&cart.id())
            && stored.status() != CartStatus::Active
        {
            return Ok(false);
        }
        state.carts.insert(cart.id(), cart.clone());
        Ok(true)
    }

    async fn list_idle_carts(&self, before: DateTime<Utc>) -> Result<Vec<Cart>> {
        let state = self.state.read().await;
        Ok(state
            .carts
            .values()
            .filter(|c| c.status() == CartStatus::Active && c.updated_at() < before)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl ProductRepository for InMemoryStore {
    async fn get_product(&self, product_id: &ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(product_id).cloned())
    }

    async fn upsert_product(&self, product: &Product) -> Result<()> {
        self.state
            .write()
            .await
            .products
            .insert(product.id.clone(), product.clone());
        Ok(())
    }

    async fn set_price(&self, product_id: &ProductId, price: Money) -> Result<()> {
        let mut state = self.state.write().await;
        let product = state
            .products
            .get_mut(product_id)
            .ok_or_else(|| StoreError::not_found("product", product_id))?;
        product.price = price;
        product.updated_at = Utc::now();
        Ok(())
    }

    async fn decrement_stock(
        &self,
        product_id: &ProductId,
        quantity: u32,
        order_id: Option<OrderId>,
    ) -> Result<Option<StockChange>> {
        let mut state = self.state.write().await;

        if let Some(order_id) = order_id
            && state
                .stock_movements
                .contains(&(order_id, product_id.clone()))
        {
            return Ok(None);
        }

        let product = state
            .products
            .get_mut(product_id)
            .ok_or_else(|| StoreError::not_found("product", product_id))?;
        let change = product.decrement(quantity, Utc::now());

        if let Some(order_id) = order_id {
            state.stock_movements.insert((order_id, product_id.clone()));
        }
        Ok(Some(change))
    }
}

#[async_trait]
impl OrderRepository for InMemoryStore {
    async fn insert_order(&self, order: &Order, job: &FulfillmentJob) -> Result<()> {
        let mut state = self.state.write().await;
        if state.orders.contains_key(&order.id())
            || state.orders.values().any(|o| o.cart_id() == order.cart_id())
        {
            return Err(StoreError::AlreadyExists {
                entity: "order",
                id: order.id().to_string(),
            });
        }
        state.orders.insert(order.id(), order.clone());
        state.jobs.insert(job.order_id, job.clone());
        Ok(())
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&order_id).cloned())
    }

    async fn save_order(&self, order: &Order, expected_version: u64) -> Result<u64> {
        let mut state = self.state.write().await;
        let stored = state
            .orders
            .get_mut(&order.id())
            .ok_or_else(|| StoreError::not_found("order", order.id()))?;
        check_version("order", order.id(), expected_version, stored.version())?;

        let version = expected_version + 1;
        let mut updated = order.clone();
        updated.set_version(version);
        *stored = updated;
        Ok(version)
    }

    async fn next_order_sequence(&self, day: NaiveDate) -> Result<u64> {
        let mut state = self.state.write().await;
        let seq = state.order_sequences.entry(day).or_insert(0);
        *seq += 1;
        Ok(*seq)
    }
}

#[async_trait]
impl SellerOrderRepository for InMemoryStore {
    async fn insert_missing_views(&self, views: &[SellerOrderView]) -> Result<usize> {
        let mut state = self.state.write().await;
        let mut inserted = 0;
        for view in views {
            let key = (view.order_id, view.seller_id.clone());
            if !state.seller_orders.contains_key(&key) {
                state.seller_orders.insert(key, view.clone());
                inserted += 1;
            }
        }
        Ok(inserted)
    }

    async fn get_view(
        &self,
        order_id: OrderId,
        seller_id: &SellerId,
    ) -> Result<Option<SellerOrderView>> {
        let state = self.state.read().await;
        Ok(state
            .seller_orders
            .get(&(order_id, seller_id.clone()))
            .cloned())
    }

    async fn list_views_for_order(&self, order_id: OrderId) -> Result<Vec<SellerOrderView>> {
        let state = self.state.read().await;
        let mut views: Vec<SellerOrderView> = state
            .seller_orders
            .values()
            .filter(|v| v.order_id == order_id)
            .cloned()
            .collect();
        views.sort_by(|a, b| a.seller_id.cmp(&b.seller_id));
        Ok(views)
    }

    async fn list_views_for_seller(&self, seller_id: &SellerId) -> Result<Vec<SellerOrderView>> {
        let state = self.state.read().await;
        let mut views: Vec<SellerOrderView> = state
            .seller_orders
            .values()
            .filter(|v| &v.seller_id == seller_id)
            .cloned()
            .collect();
        views.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(views)
    }

    async fn save_view(&self, view: &SellerOrderView, expected_version: u64) -> Result<u64> {
        let mut state = self.state.write().await;
        let key = (view.order_id, view.seller_id.clone());
        let stored = state
            .seller_orders
            .get_mut(&key)
            .ok_or_else(|| StoreError::not_found("seller order", view.order_id))?;
        check_version("seller order", view.order_id, expected_version, stored.version)?;

        let version = expected_version + 1;
        let mut updated = view.clone();
        updated.version = version;
        *stored = updated;
        Ok(version)
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn insert_payment(&self, record: &PaymentRecord) -> Result<()> {
        let mut state = self.state.write().await;
        if state.payments.values().any(|p| p.order_id == record.order_id) {
            return Err(StoreError::AlreadyExists {
                entity: "payment for order",
                id: record.order_id.to_string(),
            });
        }
        state.payments.insert(record.id, record.clone());
        Ok(())
    }

    async fn get_payment(&self, payment_id: PaymentId) -> Result<Option<PaymentRecord>> {
        Ok(self.state.read().await.payments.get(&payment_id).cloned())
    }

    async fn find_payment_by_order(&self, order_id: OrderId) -> Result<Option<PaymentRecord>> {
        let state = self.state.read().await;
        Ok(state
            .payments
            .values()
            .find(|p| p.order_id == order_id)
            .cloned())
    }

    async fn save_payment(&self, record: &PaymentRecord, expected_version: u64) -> Result<u64> {
        let mut state = self.state.write().await;
        let stored = state
            .payments
            .get_mut(&record.id)
            .ok_or_else(|| StoreError::not_found("payment", record.id))?;
        check_version("payment", record.id, expected_version, stored.version)?;

        let version = expected_version + 1;
        let mut updated = record.clone();
        updated.version = version;
        *stored = updated;
        Ok(version)
    }
}

#[async_trait]
impl FulfillmentJobRepository for InMemoryStore {
    async fn get_job(&self, order_id: OrderId) -> Result<Option<FulfillmentJob>> {
        Ok(self.state.read().await.jobs.get(&order_id).cloned())
    }

    async fn save_job(&self, job: &FulfillmentJob) -> Result<()> {
        self.state
            .write()
            .await
            .jobs
            .insert(job.order_id, job.clone());
        Ok(())
    }

    async fn list_pending_jobs(&self, limit: usize) -> Result<Vec<FulfillmentJob>> {
        let state = self.state.read().await;
        let mut jobs: Vec<FulfillmentJob> = state
            .jobs
            .values()
            .filter(|j| j.status == JobStatus::Pending)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        jobs.truncate(limit);
        Ok(jobs)
    }
}
