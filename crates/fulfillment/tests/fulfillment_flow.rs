//! End-to-end checkout tests against the in-memory store.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::{CartId, Money, OrderId, ProductId, SellerId};
use domain::{
    Address, CartStatus, CheckoutDetails, Customer, JobStatus, OrderError, OrderStatus, OwnerKey,
    PaymentMethod, Product, SellerOrderStatus, SellerOrderView,
};
use fulfillment::{
    FulfillmentError, FulfillmentRunner, FulfillmentServices, FulfillmentSettings,
    FulfillmentWorker, OrderManager, SellerFanout, StockLedger,
};
use store::{
    InMemoryStore, ProductRepository, SellerOrderRepository, StoreError,
};

fn details(payment_method: PaymentMethod) -> CheckoutDetails {
    let address = Address {
        full_name: "Ada Lovelace".to_string(),
        line1: "12 Analytical St".to_string(),
        line2: None,
        city: "Istanbul".to_string(),
        district: None,
        postal_code: "34710".to_string(),
        country: "TR".to_string(),
    };
    CheckoutDetails {
        customer: Customer {
            first_name: "Ada".to_string(),
            last_name: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            phone: "+905551112233".to_string(),
        },
        billing_address: address.clone(),
        shipping_address: address,
        payment_method,
    }
}

async fn seeded_store() -> InMemoryStore {
    let store = InMemoryStore::new();
    for product in [
        Product::new("SKU-A1", "seller-a", "Teapot", Money::from_cents(8_000), 10),
        Product::new("SKU-A2", "seller-a", "Cups", Money::from_cents(3_000), 10),
        Product::new("SKU-B1", "seller-b", "Tea", Money::from_cents(1_500), 5),
    ] {
        store.upsert_product(&product).await.unwrap();
    }
    store
}

async fn cart_with(services: &FulfillmentServices, owner: &str, lines: &[(&str, i64)]) -> CartId {
    let cart = services
        .carts
        .get_or_create(&OwnerKey::new(owner))
        .await
        .unwrap();
    for (sku, qty) in lines {
        services
            .carts
            .add_item(cart.id(), &ProductId::new(*sku), *qty, None)
            .await
            .unwrap();
    }
    cart.id()
}

#[tokio::test]
async fn test_checkout_applies_every_side_effect() {
    let store = seeded_store().await;
    let services = FulfillmentServices::new(store.clone(), FulfillmentSettings::default());
    let cart_id = cart_with(&services, "user-1", &[("SKU-A1", 2), ("SKU-A2", 1), ("SKU-B1", 4)]).await;

    let (order, report) = services
        .orders
        .create_order(cart_id, details(PaymentMethod::Card))
        .await
        .unwrap();

    assert!(report.is_clean(), "{:?}", report.errors);
    assert!(report.cart_converted);
    assert_eq!(report.job_status, JobStatus::Done);
    assert_eq!(report.seller_views_written, 2);
    assert_eq!(order.status(), OrderStatus::Pending);

    let today = Utc::now().format("%y%m%d").to_string();
    assert_eq!(order.order_number(), format!("{today}-0001"));

    let cart = services.carts.get(cart_id).await.unwrap();
    assert_eq!(cart.status(), CartStatus::Converted);

    let stock = |sku: &'static str| {
        let store = store.clone();
        async move { store.get_product(&ProductId::new(sku)).await.unwrap().unwrap().stock }
    };
    assert_eq!(stock("SKU-A1").await, 8);
    assert_eq!(stock("SKU-A2").await, 9);
    assert_eq!(stock("SKU-B1").await, 1);

    let views = services.sellers.list_for_order(order.id()).await.unwrap();
    assert_eq!(views.len(), 2);
    for view in &views {
        assert!(view.lines.iter().all(|l| l.seller_id == view.seller_id));
        let sum: Money = view.lines.iter().map(|l| l.total_price).sum();
        assert_eq!(view.amount, sum);
    }
    assert_eq!(views[0].amount, Money::from_cents(19_000));
    assert_eq!(views[1].amount, Money::from_cents(6_000));
}

#[tokio::test]
async fn test_order_numbers_are_sequential() {
    let store = seeded_store().await;
    let services = FulfillmentServices::new(store, FulfillmentSettings::default());

    let first = cart_with(&services, "u1", &[("SKU-A1", 1)]).await;
    let second = cart_with(&services, "u2", &[("SKU-A1", 1)]).await;
    let (a, _) = services
        .orders
        .create_order(first, details(PaymentMethod::Card))
        .await
        .unwrap();
    let (b, _) = services
        .orders
        .create_order(second, details(PaymentMethod::Card))
        .await
        .unwrap();

    assert!(a.order_number().ends_with("-0001"));
    assert!(b.order_number().ends_with("-0002"));
}

#[tokio::test]
async fn test_order_totals_survive_price_changes() {
    let store = seeded_store().await;
    let services = FulfillmentServices::new(store.clone(), FulfillmentSettings::default());
    let cart_id = cart_with(&services, "u", &[("SKU-A1", 2)]).await;

    let (order, _) = services
        .orders
        .create_order(cart_id, details(PaymentMethod::Card))
        .await
        .unwrap();
    store
        .set_price(&ProductId::new("SKU-A1"), Money::from_cents(99_000))
        .await
        .unwrap();

    let loaded = services.orders.get(order.id()).await.unwrap();
    assert_eq!(loaded.totals(), order.totals());
    assert_eq!(loaded.totals().grand_total(), Money::from_cents(18_990));
    assert_eq!(loaded.lines()[0].unit_price, Money::from_cents(8_000));
}

#[tokio::test]
async fn test_checkout_preconditions() {
    let store = seeded_store().await;
    let services = FulfillmentServices::new(store.clone(), FulfillmentSettings::default());

    let missing = services
        .orders
        .create_order(CartId::new(), details(PaymentMethod::Card))
        .await;
    assert!(matches!(missing, Err(FulfillmentError::CartNotFound(_))));

    let empty = cart_with(&services, "empty", &[]).await;
    let result = services
        .orders
        .create_order(empty, details(PaymentMethod::Card))
        .await;
    assert!(matches!(
        result,
        Err(FulfillmentError::Order(OrderError::EmptyCart { .. }))
    ));

    let cart_id = cart_with(&services, "u", &[("SKU-B1", 1)]).await;
    let mut bad = details(PaymentMethod::Card);
    bad.shipping_address.postal_code.clear();
    let result = services.orders.create_order(cart_id, bad).await;
    assert!(matches!(
        result,
        Err(FulfillmentError::Order(OrderError::Validation(_)))
    ));
    assert_eq!(store.order_count().await, 0);

    services
        .orders
        .create_order(cart_id, details(PaymentMethod::Card))
        .await
        .unwrap();
    let again = services
        .orders
        .create_order(cart_id, details(PaymentMethod::Card))
        .await;
    assert!(matches!(
        again,
        Err(FulfillmentError::Order(OrderError::CartNotActive { .. }))
    ));
    assert_eq!(store.order_count().await, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_orders_never_drive_stock_negative() {
    let store = seeded_store().await;
    let services = FulfillmentServices::new(store.clone(), FulfillmentSettings::default());

    let mut carts = Vec::new();
    for i in 0..4 {
        carts.push(cart_with(&services, &format!("buyer-{i}"), &[("SKU-B1", 2)]).await);
    }

    let tasks = carts.into_iter().map(|cart_id| {
        let orders = Arc::clone(&services.orders);
        tokio::spawn(async move {
            orders
                .create_order(cart_id, details(PaymentMethod::CashOnDelivery))
                .await
        })
    });
    let results = futures_util::future::join_all(tasks).await;
    let oversold: usize = results
        .into_iter()
        .map(|r| r.unwrap().unwrap().1.oversold().len())
        .sum();

    let product = store
        .get_product(&ProductId::new("SKU-B1"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(product.stock, 0);
    assert!(!product.active);
    assert!(oversold >= 1);
}

#[tokio::test]
async fn test_non_gateway_orders_are_confirmed() {
    let store = seeded_store().await;
    let services = FulfillmentServices::new(store, FulfillmentSettings::default());
    let cart_id = cart_with(&services, "u", &[("SKU-A1", 1)]).await;

    let (order, _) = services
        .orders
        .create_order(cart_id, details(PaymentMethod::CashOnDelivery))
        .await
        .unwrap();

    assert_eq!(order.status(), OrderStatus::Confirmed);
}

#[tokio::test]
async fn test_seller_progress_propagates_to_order() {
    let store = seeded_store().await;
    let services = FulfillmentServices::new(store, FulfillmentSettings::default());
    let cart_id = cart_with(&services, "u", &[("SKU-A1", 1), ("SKU-B1", 1)]).await;
    let (order, _) = services
        .orders
        .create_order(cart_id, details(PaymentMethod::BankTransfer))
        .await
        .unwrap();
    let seller_a = SellerId::new("seller-a");
    let seller_b = SellerId::new("seller-b");

    services
        .sellers
        .update_status(order.id(), &seller_a, SellerOrderStatus::Shipped)
        .await
        .unwrap();
    assert_eq!(
        services.orders.get(order.id()).await.unwrap().status(),
        OrderStatus::Confirmed
    );

    let propagated = services.sellers.propagate(order.id()).await.unwrap();
    assert_eq!(propagated.status(), OrderStatus::Processing);

    services
        .sellers
        .update_status(order.id(), &seller_b, SellerOrderStatus::Shipped)
        .await
        .unwrap();
    let propagated = services.sellers.propagate(order.id()).await.unwrap();
    assert_eq!(propagated.status(), OrderStatus::Shipped);

    for seller in [&seller_a, &seller_b] {
        services
            .sellers
            .update_status(order.id(), seller, SellerOrderStatus::Delivered)
            .await
            .unwrap();
    }
    let propagated = services.sellers.propagate(order.id()).await.unwrap();
    assert_eq!(propagated.status(), OrderStatus::Delivered);

    let illegal = services
        .sellers
        .update_status(order.id(), &seller_a, SellerOrderStatus::Preparing)
        .await;
    assert!(matches!(illegal, Err(FulfillmentError::Transition(_))));
}

#[tokio::test]
async fn test_propagation_refused_before_confirmation() {
    let store = seeded_store().await;
    let services = FulfillmentServices::new(store, FulfillmentSettings::default());
    let cart_id = cart_with(&services, "u", &[("SKU-A1", 1)]).await;
    let (order, _) = services
        .orders
        .create_order(cart_id, details(PaymentMethod::Card))
        .await
        .unwrap();

    services
        .sellers
        .update_status(order.id(), &SellerId::new("seller-a"), SellerOrderStatus::Shipped)
        .await
        .unwrap();
    let result = services.sellers.propagate(order.id()).await;

    assert!(matches!(
        result,
        Err(FulfillmentError::Order(OrderError::InvalidTransition(_)))
    ));
    assert_eq!(
        services.orders.get(order.id()).await.unwrap().status(),
        OrderStatus::Pending
    );
}

#[tokio::test]
async fn test_admin_transition_checks_state_machine() {
    let store = seeded_store().await;
    let services = FulfillmentServices::new(store, FulfillmentSettings::default());
    let cart_id = cart_with(&services, "u", &[("SKU-A1", 1)]).await;
    let (order, _) = services
        .orders
        .create_order(cart_id, details(PaymentMethod::Card))
        .await
        .unwrap();

    let shipped = services
        .orders
        .transition(order.id(), OrderStatus::Shipped)
        .await;
    assert!(shipped.is_err());

    let cancelled = services
        .orders
        .transition(order.id(), OrderStatus::Cancelled)
        .await
        .unwrap();
    assert_eq!(cancelled.status(), OrderStatus::Cancelled);
    assert_eq!(cancelled.version(), 1);

    let refunded = services
        .orders
        .transition(order.id(), OrderStatus::Refunded)
        .await
        .unwrap();
    assert_eq!(refunded.version(), 2);
}

/// Seller view repository that fails writes while `failing` is set.
#[derive(Clone)]
struct FlakyViews {
    inner: InMemoryStore,
    failing: Arc<AtomicBool>,
}

#[async_trait]
impl SellerOrderRepository for FlakyViews {
    async fn insert_missing_views(&self, views: &[SellerOrderView]) -> store::Result<usize> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(StoreError::NotFound {
                entity: "seller_orders table",
                id: "unavailable".to_string(),
            });
        }
        self.inner.insert_missing_views(views).await
    }

    async fn get_view(
        &self,
        order_id: OrderId,
        seller_id: &SellerId,
    ) -> store::Result<Option<SellerOrderView>> {
        self.inner.get_view(order_id, seller_id).await
    }

    async fn list_views_for_order(&self, order_id: OrderId) -> store::Result<Vec<SellerOrderView>> {
        self.inner.list_views_for_order(order_id).await
    }

    async fn list_views_for_seller(
        &self,
        seller_id: &SellerId,
    ) -> store::Result<Vec<SellerOrderView>> {
        self.inner.list_views_for_seller(seller_id).await
    }

    async fn save_view(&self, view: &SellerOrderView, expected_version: u64) -> store::Result<u64> {
        self.inner.save_view(view, expected_version).await
    }
}

fn flaky_setup(store: &InMemoryStore, max_attempts: u32) -> (Arc<OrderManager>, Arc<FulfillmentRunner>, Arc<AtomicBool>) {
    let failing = Arc::new(AtomicBool::new(true));
    let views = FlakyViews {
        inner: store.clone(),
        failing: Arc::clone(&failing),
    };
    let runner = Arc::new(FulfillmentRunner::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        StockLedger::new(Arc::new(store.clone())),
        SellerFanout::new(Arc::new(views)),
        max_attempts,
    ));
    let orders = Arc::new(OrderManager::new(
        Arc::new(store.clone()),
        Arc::new(store.clone()),
        Arc::clone(&runner),
        FulfillmentSettings::default().order_day_offset,
    ));
    (orders, runner, failing)
}

#[tokio::test]
async fn test_fanout_failure_is_reported_and_retried_without_double_decrement() {
    let store = seeded_store().await;
    let services = FulfillmentServices::new(store.clone(), FulfillmentSettings::default());
    let (orders, runner, failing) = flaky_setup(&store, 5);
    let cart_id = cart_with(&services, "u", &[("SKU-A1", 3)]).await;

    let (order, report) = orders
        .create_order(cart_id, details(PaymentMethod::Card))
        .await
        .unwrap();

    assert!(!report.is_clean());
    assert_eq!(report.job_status, JobStatus::Pending);
    assert!(services.sellers.list_for_order(order.id()).await.unwrap().is_empty());
    let job = runner.job(order.id()).await.unwrap().unwrap();
    assert!(job.stock_applied);
    assert!(!job.fanout_applied);
    assert_eq!(job.attempts, 1);

    failing.store(false, Ordering::SeqCst);
    let worker = FulfillmentWorker::new(Arc::clone(&runner), Duration::from_millis(10));
    assert_eq!(worker.tick().await, 1);

    let job = runner.job(order.id()).await.unwrap().unwrap();
    assert_eq!(job.status, JobStatus::Done);
    assert_eq!(services.sellers.list_for_order(order.id()).await.unwrap().len(), 1);
    assert_eq!(
        store
            .get_product(&ProductId::new("SKU-A1"))
            .await
            .unwrap()
            .unwrap()
            .stock,
        7
    );
    assert_eq!(worker.tick().await, 0);
}

#[tokio::test]
async fn test_job_gives_up_after_max_attempts_and_can_be_requeued() {
    let store = seeded_store().await;
    let services = FulfillmentServices::new(store.clone(), FulfillmentSettings::default());
    let (orders, runner, failing) = flaky_setup(&store, 2);
    let cart_id = cart_with(&services, "u", &[("SKU-A2", 1)]).await;

    let (order, _) = orders
        .create_order(cart_id, details(PaymentMethod::Card))
        .await
        .unwrap();
    let report = runner.run_job(order.id()).await.unwrap();
    assert_eq!(report.job_status, JobStatus::Failed);
    assert_eq!(runner.run_pending(10).await.unwrap(), 0);

    failing.store(false, Ordering::SeqCst);
    let job = runner.requeue(order.id()).await.unwrap();
    assert_eq!(job.status, JobStatus::Pending);
    assert_eq!(runner.run_pending(10).await.unwrap(), 1);
    assert_eq!(
        runner.job(order.id()).await.unwrap().unwrap().status,
        JobStatus::Done
    );

    let missing = runner.requeue(OrderId::new()).await;
    assert!(matches!(missing, Err(FulfillmentError::OrderNotFound(_))));
}

#[tokio::test]
async fn test_worker_stops_on_shutdown() {
    let store = seeded_store().await;
    let services = FulfillmentServices::new(store, FulfillmentSettings::default());
    let worker = FulfillmentWorker::new(Arc::clone(&services.runner), Duration::from_millis(5));
    let (tx, rx) = tokio::sync::watch::channel(false);

    let handle = tokio::spawn(worker.run(rx));
    tokio::time::sleep(Duration::from_millis(20)).await;
    tx.send(true).unwrap();

    tokio::time::timeout(Duration::from_secs(1), handle)
        .await
        .unwrap()
        .unwrap();
}
