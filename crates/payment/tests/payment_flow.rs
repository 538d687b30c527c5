//! Payment adapter tests against the in-memory store.

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{Money, OrderId, ProductId};
use domain::{
    Address, CheckoutDetails, Customer, Order, OrderStatus, OwnerKey, PaymentMethod,
    PaymentStatus, Product,
};
use fulfillment::{FulfillmentServices, FulfillmentSettings};
use payment::{GatewayConfig, PaymentError, PaymentGateway, ReturnParams, WebhookOutcome, signing};
use store::{InMemoryStore, PaymentRepository, ProductRepository};

const SECRET: &str = "test-secret";

fn config() -> GatewayConfig {
    GatewayConfig {
        gateway_url: Some("https://gateway.test/pay".to_string()),
        merchant_id: Some("MERCHANT-1".to_string()),
        secret_key: Some(SECRET.to_string()),
        currency: "TRY".to_string(),
        success_url: Some("https://shop.test/success".to_string()),
        failure_url: Some("https://shop.test/failure".to_string()),
        callback_url: Some("https://api.shop.test/payments/webhook".to_string()),
    }
}

fn details() -> CheckoutDetails {
    let address = Address {
        full_name: "Grace Hopper".to_string(),
        line1: "1 Compiler Ave".to_string(),
        line2: None,
        city: "Ankara".to_string(),
        district: Some("Cankaya".to_string()),
        postal_code: "06690".to_string(),
        country: "TR".to_string(),
    };
    CheckoutDetails {
        customer: Customer {
            first_name: "Grace".to_string(),
            last_name: "Hopper".to_string(),
            email: "grace@example.com".to_string(),
            phone: "+905550000000".to_string(),
        },
        billing_address: address.clone(),
        shipping_address: address,
        payment_method: PaymentMethod::Card,
    }
}

struct Fixture {
    store: InMemoryStore,
    services: FulfillmentServices,
    gateway: PaymentGateway,
}

async fn fixture(config: GatewayConfig) -> Fixture {
    let store = InMemoryStore::new();
    store
        .upsert_product(&Product::new(
            "SKU-1",
            "seller-a",
            "Kettle",
            Money::from_cents(25_000),
            10,
        ))
        .await
        .unwrap();
    let services = FulfillmentServices::new(store.clone(), FulfillmentSettings::default());
    let gateway = PaymentGateway::new(
        config,
        Arc::new(store.clone()),
        Arc::clone(&services.orders),
    );
    Fixture {
        store,
        services,
        gateway,
    }
}

async fn place_order(f: &Fixture) -> Order {
    let cart = f
        .services
        .carts
        .get_or_create(&OwnerKey::new("user-1"))
        .await
        .unwrap();
    f.services
        .carts
        .add_item(cart.id(), &ProductId::new("SKU-1"), 1, None)
        .await
        .unwrap();
    let (order, _) = f
        .services
        .orders
        .create_order(cart.id(), details())
        .await
        .unwrap();
    order
}

fn callback(order_id: OrderId, amount: &str, status: &str, secret: &str) -> BTreeMap<String, String> {
    signed_callback(order_id, &signing::generate_nonce(), amount, status, secret)
}

fn signed_callback(
    order_id: OrderId,
    nonce: &str,
    amount: &str,
    status: &str,
    secret: &str,
) -> BTreeMap<String, String> {
    let nonce = nonce.to_string();
    let order_ref = order_id.to_string();
    let signature = signing::sign_callback(
        secret,
        &signing::CallbackFields {
            nonce: &nonce,
            order_id: &order_ref,
            status,
            payment_id: "GW-123",
            amount,
            currency: "TRY",
        },
    );
    BTreeMap::from([
        ("platform_order_id".to_string(), order_ref),
        ("status".to_string(), status.to_string()),
        ("payment_id".to_string(), "GW-123".to_string()),
        ("nonce".to_string(), nonce),
        ("amount".to_string(), amount.to_string()),
        ("currency".to_string(), "TRY".to_string()),
        ("signature".to_string(), signature),
    ])
}

#[tokio::test]
async fn test_create_payment_signs_request_and_marks_order() {
    let f = fixture(config()).await;
    let order = place_order(&f).await;

    let request = f.gateway.create_payment(order.id()).await.unwrap();

    assert_eq!(request.redirect_url, "https://gateway.test/pay");
    assert_eq!(request.status, PaymentStatus::Pending);
    // 250.00 is below the free shipping threshold: 250.00 + 29.90
    assert_eq!(request.form["amount"], "279.90");
    assert_eq!(request.form["currency"], "TRY");
    assert_eq!(request.form["merchant_id"], "MERCHANT-1");
    assert_eq!(request.form["customer_name"], "Grace Hopper");
    assert!(request.form["items"].contains("Kettle"));
    assert_eq!(
        request.form["signature"],
        signing::sign(
            SECRET,
            &request.form["nonce"],
            &order.id().to_string(),
            "279.90",
            "TRY",
        )
    );

    let order = f.services.orders.get(order.id()).await.unwrap();
    assert_eq!(order.status(), OrderStatus::PaymentPending);
}

#[tokio::test]
async fn test_webhook_is_idempotent() {
    let f = fixture(config()).await;
    let order = place_order(&f).await;
    f.gateway.create_payment(order.id()).await.unwrap();

    let payload = callback(order.id(), "279.90", "success", SECRET);
    let first = f.gateway.verify_payment(&payload).await.unwrap();
    let second = f.gateway.verify_payment(&payload).await.unwrap();

    assert_eq!(first, WebhookOutcome::Applied(PaymentStatus::Completed));
    assert_eq!(second, WebhookOutcome::Duplicate(PaymentStatus::Completed));

    let record = f.store.find_payment_by_order(order.id()).await.unwrap().unwrap();
    assert_eq!(record.status(), PaymentStatus::Completed);
    assert_eq!(record.version, 1);
    assert_eq!(record.provider_payment_id.as_deref(), Some("GW-123"));

    let order = f.services.orders.get(order.id()).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Confirmed);
    assert_eq!(order.payment_status(), PaymentStatus::Completed);
}

#[tokio::test]
async fn test_late_failure_after_completion_is_ignored() {
    let f = fixture(config()).await;
    let order = place_order(&f).await;
    f.gateway.create_payment(order.id()).await.unwrap();

    f.gateway
        .verify_payment(&callback(order.id(), "279.90", "success", SECRET))
        .await
        .unwrap();
    let late = f
        .gateway
        .verify_payment(&callback(order.id(), "279.90", "failed", SECRET))
        .await
        .unwrap();

    assert_eq!(late, WebhookOutcome::Duplicate(PaymentStatus::Completed));
    let order = f.services.orders.get(order.id()).await.unwrap();
    assert_eq!(order.status(), OrderStatus::Confirmed);
}

#[tokio::test]
async fn test_failed_payment_fails_order() {
    let f = fixture(config()).await;
    let order = place_order(&f).await;
    f.gateway.create_payment(order.id()).await.unwrap();

    let outcome = f
        .gateway
        .verify_payment(&callback(order.id(), "279.90", "declined", SECRET))
        .await
        .unwrap();

    assert_eq!(outcome, WebhookOutcome::Applied(PaymentStatus::Failed));
    let order = f.services.orders.get(order.id()).await.unwrap();
    assert_eq!(order.status(), OrderStatus::PaymentFailed);
    assert_eq!(order.payment_status(), PaymentStatus::Failed);
}

#[tokio::test]
async fn test_create_payment_twice_on_completed_order_returns_same_record() {
    let f = fixture(config()).await;
    let order = place_order(&f).await;
    let first = f.gateway.create_payment(order.id()).await.unwrap();
    f.gateway
        .verify_payment(&callback(order.id(), "279.90", "success", SECRET))
        .await
        .unwrap();

    let second = f.gateway.create_payment(order.id()).await.unwrap();

    assert_eq!(second.payment_id, first.payment_id);
    assert_eq!(second.status, PaymentStatus::Completed);
    let record = f.store.get_payment(first.payment_id).await.unwrap().unwrap();
    assert_eq!(record.order_id, order.id());
}

#[tokio::test]
async fn test_bad_signature_is_rejected_without_mutation() {
    let f = fixture(config()).await;
    let order = place_order(&f).await;
    f.gateway.create_payment(order.id()).await.unwrap();

    let err = f
        .gateway
        .verify_payment(&callback(order.id(), "279.90", "success", "wrong-secret"))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::SignatureMismatch));

    let mut tampered = callback(order.id(), "279.90", "success", SECRET);
    tampered.insert("amount".to_string(), "1.00".to_string());
    let err = f.gateway.verify_payment(&tampered).await.unwrap_err();
    assert!(matches!(err, PaymentError::SignatureMismatch));

    let record = f.store.find_payment_by_order(order.id()).await.unwrap().unwrap();
    assert_eq!(record.status(), PaymentStatus::Pending);
    assert_eq!(record.version, 0);
    let order = f.services.orders.get(order.id()).await.unwrap();
    assert_eq!(order.status(), OrderStatus::PaymentPending);
}

#[tokio::test]
async fn test_payment_form_cannot_be_replayed_as_callback() {
    let f = fixture(config()).await;
    let order = place_order(&f).await;
    let request = f.gateway.create_payment(order.id()).await.unwrap();

    let mut forged = request.form.clone();
    forged.insert("status".to_string(), "success".to_string());
    let err = f.gateway.verify_payment(&forged).await.unwrap_err();
    assert!(matches!(err, PaymentError::SignatureMismatch));

    let record = f.store.find_payment_by_order(order.id()).await.unwrap().unwrap();
    assert_eq!(record.status(), PaymentStatus::Pending);
    let order = f.services.orders.get(order.id()).await.unwrap();
    assert_eq!(order.status(), OrderStatus::PaymentPending);
    assert_eq!(order.payment_status(), PaymentStatus::Pending);
}

#[tokio::test]
async fn test_callback_reusing_request_nonce_is_rejected() {
    let f = fixture(config()).await;
    let order = place_order(&f).await;
    let request = f.gateway.create_payment(order.id()).await.unwrap();

    let payload = signed_callback(order.id(), &request.form["nonce"], "279.90", "success", SECRET);
    let err = f.gateway.verify_payment(&payload).await.unwrap_err();
    assert!(matches!(err, PaymentError::NonceReused));

    let record = f.store.find_payment_by_order(order.id()).await.unwrap().unwrap();
    assert_eq!(record.status(), PaymentStatus::Pending);
}

#[tokio::test]
async fn test_signed_status_cannot_be_swapped() {
    let f = fixture(config()).await;
    let order = place_order(&f).await;
    f.gateway.create_payment(order.id()).await.unwrap();

    let mut payload = callback(order.id(), "279.90", "declined", SECRET);
    payload.insert("status".to_string(), "success".to_string());
    let err = f.gateway.verify_payment(&payload).await.unwrap_err();
    assert!(matches!(err, PaymentError::SignatureMismatch));
}

#[tokio::test]
async fn test_only_open_card_orders_are_payable() {
    let f = fixture(config()).await;

    let cancelled = place_order(&f).await;
    f.services
        .orders
        .transition(cancelled.id(), OrderStatus::Cancelled)
        .await
        .unwrap();
    let err = f.gateway.create_payment(cancelled.id()).await.unwrap_err();
    assert!(matches!(err, PaymentError::NotPayable { .. }));
    assert!(f.store.find_payment_by_order(cancelled.id()).await.unwrap().is_none());

    f.store
        .upsert_product(&Product::new(
            "SKU-2",
            "seller-a",
            "Teapot",
            Money::from_cents(9_000),
            10,
        ))
        .await
        .unwrap();
    let cart = f
        .services
        .carts
        .get_or_create(&OwnerKey::new("user-2"))
        .await
        .unwrap();
    f.services
        .carts
        .add_item(cart.id(), &ProductId::new("SKU-2"), 1, None)
        .await
        .unwrap();
    let mut cod = details();
    cod.payment_method = PaymentMethod::CashOnDelivery;
    let (cod_order, _) = f.services.orders.create_order(cart.id(), cod).await.unwrap();

    let err = f.gateway.create_payment(cod_order.id()).await.unwrap_err();
    assert!(matches!(err, PaymentError::NotPayable { .. }));
    assert!(f.store.find_payment_by_order(cod_order.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_refund_moves_completed_payment() {
    let f = fixture(config()).await;
    let order = place_order(&f).await;
    f.gateway.create_payment(order.id()).await.unwrap();
    f.gateway
        .verify_payment(&callback(order.id(), "279.90", "success", SECRET))
        .await
        .unwrap();

    let err = f.gateway.refund(order.id()).await.unwrap_err();
    assert!(matches!(err, PaymentError::Fulfillment(_)));

    f.services
        .orders
        .transition(order.id(), OrderStatus::Cancelled)
        .await
        .unwrap();
    let refunded = f.gateway.refund(order.id()).await.unwrap();
    assert_eq!(refunded.status(), OrderStatus::Refunded);
    assert_eq!(refunded.payment_status(), PaymentStatus::Refunded);

    let record = f.store.find_payment_by_order(order.id()).await.unwrap().unwrap();
    assert_eq!(record.status(), PaymentStatus::Refunded);

    let again = f.gateway.refund(order.id()).await.unwrap();
    assert_eq!(again.status(), OrderStatus::Refunded);
}

#[tokio::test]
async fn test_signed_amount_must_match_request() {
    let f = fixture(config()).await;
    let order = place_order(&f).await;
    f.gateway.create_payment(order.id()).await.unwrap();

    let err = f
        .gateway
        .verify_payment(&callback(order.id(), "1.00", "success", SECRET))
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::AmountMismatch { .. }));
}

#[tokio::test]
async fn test_missing_order_id_is_rejected() {
    let f = fixture(config()).await;
    let mut payload = callback(OrderId::new(), "279.90", "success", SECRET);
    payload.remove("platform_order_id");

    let err = f.gateway.verify_payment(&payload).await.unwrap_err();
    assert!(matches!(err, PaymentError::MissingOrderId));
}

#[tokio::test]
async fn test_unconfigured_gateway() {
    let f = fixture(GatewayConfig {
        currency: "TRY".to_string(),
        ..Default::default()
    })
    .await;
    let order = place_order(&f).await;

    let err = f.gateway.create_payment(order.id()).await.unwrap_err();
    assert!(matches!(err, PaymentError::GatewayNotConfigured));
    assert!(f.store.find_payment_by_order(order.id()).await.unwrap().is_none());
}

#[tokio::test]
async fn test_unknown_order() {
    let f = fixture(config()).await;
    let err = f.gateway.create_payment(OrderId::new()).await.unwrap_err();
    assert!(matches!(err, PaymentError::OrderNotFound(_)));
}

#[tokio::test]
async fn test_return_leg_only_marks_processing() {
    let f = fixture(config()).await;
    let order = place_order(&f).await;
    f.gateway.create_payment(order.id()).await.unwrap();

    let redirect = f
        .gateway
        .handle_return(&ReturnParams {
            order_id: Some(order.id().to_string()),
            status: Some("success".to_string()),
            payment_id: Some("GW-9".to_string()),
        })
        .await;
    assert_eq!(
        redirect,
        format!("https://shop.test/success?orderId={}", order.id())
    );

    let record = f.store.find_payment_by_order(order.id()).await.unwrap().unwrap();
    assert_eq!(record.status(), PaymentStatus::Processing);
    let order = f.services.orders.get(order.id()).await.unwrap();
    assert_eq!(order.status(), OrderStatus::PaymentPending);
    assert_eq!(order.payment_status(), PaymentStatus::Processing);

    let redirect = f
        .gateway
        .handle_return(&ReturnParams {
            order_id: None,
            status: Some("failed".to_string()),
            payment_id: None,
        })
        .await;
    assert_eq!(redirect, "https://shop.test/failure");
}
