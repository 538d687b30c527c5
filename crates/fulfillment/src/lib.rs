//! Order fulfillment services.
//!
//! - [`CartService`] owns carts and their totals
//! - [`StockLedger`] applies atomic, clamping stock decrements
//! - [`OrderManager`] turns a cart into an order and changes its status
//! - [`SellerFanout`] projects an order into per-seller views
//! - [`FulfillmentRunner`] and [`FulfillmentWorker`] drive each order's
//!   side effects to completion through its fulfillment job

pub mod cart;
pub mod error;
pub mod fanout;
pub mod order;
pub mod runner;
pub mod seller;
pub mod stock;
pub mod worker;

use std::sync::Arc;

use chrono::{FixedOffset, Offset, Utc};
use domain::PricingPolicy;
use store::{
    CartRepository, FulfillmentJobRepository, OrderRepository, ProductRepository,
    SellerOrderRepository,
};

pub use cart::{BundleRequest, CartService, CartSummary};
pub use error::{FulfillmentError, Result};
pub use fanout::SellerFanout;
pub use order::OrderManager;
pub use runner::{FulfillmentReport, FulfillmentRunner};
pub use seller::SellerOrderService;
pub use stock::StockLedger;
pub use worker::FulfillmentWorker;

/// Settings shared by the fulfillment services.
#[derive(Debug, Clone, Copy)]
pub struct FulfillmentSettings {
    pub pricing: PricingPolicy,
    /// Offset of the local day order numbers are counted in.
    pub order_day_offset: FixedOffset,
    pub max_attempts: u32,
}

impl Default for FulfillmentSettings {
    fn default() -> Self {
        Self {
            pricing: PricingPolicy::default(),
            order_day_offset: Utc.fix(),
            max_attempts: 5,
        }
    }
}

/// The fulfillment services wired against one store.
#[derive(Clone)]
pub struct FulfillmentServices {
    pub carts: Arc<CartService>,
    pub orders: Arc<OrderManager>,
    pub sellers: Arc<SellerOrderService>,
    pub ledger: StockLedger,
    pub runner: Arc<FulfillmentRunner>,
}

impl FulfillmentServices {
    pub fn new<S>(store: S, settings: FulfillmentSettings) -> Self
    where
        S: CartRepository
            + ProductRepository
            + OrderRepository
            + SellerOrderRepository
            + FulfillmentJobRepository
            + Clone
            + 'static,
    {
        let carts: Arc<dyn CartRepository> = Arc::new(store.clone());
        let products: Arc<dyn ProductRepository> = Arc::new(store.clone());
        let orders: Arc<dyn OrderRepository> = Arc::new(store.clone());
        let views: Arc<dyn SellerOrderRepository> = Arc::new(store.clone());
        let jobs: Arc<dyn FulfillmentJobRepository> = Arc::new(store);

        let ledger = StockLedger::new(Arc::clone(&products));
        let fanout = SellerFanout::new(Arc::clone(&views));
        let runner = Arc::new(FulfillmentRunner::new(
            Arc::clone(&orders),
            Arc::clone(&carts),
            jobs,
            ledger.clone(),
            fanout,
            settings.max_attempts,
        ));
        let order_manager = Arc::new(OrderManager::new(
            Arc::clone(&carts),
            orders,
            Arc::clone(&runner),
            settings.order_day_offset,
        ));

        Self {
            carts: Arc::new(CartService::new(carts, products, settings.pricing)),
            sellers: Arc::new(SellerOrderService::new(views, Arc::clone(&order_manager))),
            orders: order_manager,
            ledger,
            runner,
        }
    }
}
