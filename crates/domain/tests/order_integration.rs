//! Integration tests for the cart-to-order path of the domain model.
//!
//! These tests exercise pricing, bundle expansion, the order snapshot and
//! the status machines through the public API only.

use chrono::Utc;
use common::{Money, OrderId};
use domain::{
    Address, BundleLine, Cart, CartBundle, CartError, CartStatus, CheckoutDetails, Customer,
    Order, OrderError, OrderStatus, OwnerKey, PaymentMethod, PaymentStatus, PricingPolicy,
    Product, SellerOrderStatus, SellerOrderView, derived_order_status, format_order_number,
};

fn details() -> CheckoutDetails {
    let address = Address {
        full_name: "Ada Lovelace".to_string(),
        line1: "12 Analytical St".to_string(),
        line2: Some("Flat 3".to_string()),
        city: "Istanbul".to_string(),
        district: Some("Kadikoy".to_string()),
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
        payment_method: PaymentMethod::Card,
    }
}

fn products() -> (Product, Product, Product) {
    (
        Product::new("SKU-A1", "seller-a", "Teapot", Money::from_cents(10_000), 10),
        Product::new("SKU-A2", "seller-a", "Cups", Money::from_cents(5_000), 10),
        Product::new("SKU-B1", "seller-b", "Tea", Money::from_cents(10_000), 3),
    )
}

fn place(cart: &Cart) -> Order {
    Order::place(
        OrderId::new(),
        format_order_number(Utc::now().date_naive(), 1),
        cart,
        details(),
        Utc::now(),
    )
    .unwrap()
}

mod pricing {
    use super::*;

    #[test]
    fn shipping_charged_below_threshold() {
        let policy = PricingPolicy::default();
        let (teapot, cups, _) = products();
        let mut cart = Cart::new(OwnerKey::new("u1"), Utc::now());
        cart.add_item(&teapot, 2, None, &policy, Utc::now()).unwrap();
        cart.add_item(&cups, 1, None, &policy, Utc::now()).unwrap();

        let totals = cart.totals();
        assert_eq!(totals.subtotal(), Money::from_cents(25_000));
        assert_eq!(totals.shipping(), Money::from_cents(2_990));
        assert_eq!(totals.grand_total(), Money::from_cents(27_990));
    }

    #[test]
    fn free_shipping_at_threshold() {
        let policy = PricingPolicy::default();
        let (teapot, cups, _) = products();
        let mut cart = Cart::new(OwnerKey::new("u1"), Utc::now());
        cart.add_item(&teapot, 3, None, &policy, Utc::now()).unwrap();
        cart.add_item(&cups, 1, None, &policy, Utc::now()).unwrap();

        assert_eq!(cart.totals().subtotal(), Money::from_cents(35_000));
        assert_eq!(cart.totals().shipping(), Money::zero());
        assert_eq!(cart.totals().grand_total(), Money::from_cents(35_000));
    }

    #[test]
    fn subtotal_matches_lines_after_every_mutation() {
        let policy = PricingPolicy::default();
        let (teapot, cups, tea) = products();
        let mut cart = Cart::new(OwnerKey::new("u1"), Utc::now());

        let check = |cart: &Cart| {
            let items: Money = cart.items().iter().map(|i| i.total_price()).sum();
            let bundles: Money = cart.bundles().iter().map(|b| b.list_total()).sum();
            let t = cart.totals();
            assert_eq!(t.subtotal(), items + bundles);
            assert_eq!(
                t.grand_total(),
                t.subtotal() + t.shipping() - t.discount() + t.tax()
            );
        };

        let teapot_line = cart.add_item(&teapot, 1, None, &policy, Utc::now()).unwrap();
        check(&cart);
        cart.add_item(&tea, 5, None, &policy, Utc::now()).unwrap();
        check(&cart);
        cart.update_quantity(teapot_line, 4, &policy, Utc::now()).unwrap();
        check(&cart);
        let lines = vec![BundleLine::from_product(&cups, 2)];
        cart.add_bundle(
            CartBundle::new("CUPS", "Cup pair", lines, 1, Money::from_cents(8_000)),
            &policy,
            Utc::now(),
        )
        .unwrap();
        check(&cart);
        cart.remove_item(teapot_line, &policy, Utc::now()).unwrap();
        check(&cart);
        cart.clear(&policy, Utc::now()).unwrap();
        check(&cart);
        assert_eq!(cart.totals().grand_total(), Money::zero());
    }

    #[test]
    fn quantity_is_clamped_to_stock() {
        let policy = PricingPolicy::default();
        let (_, _, tea) = products();
        let mut cart = Cart::new(OwnerKey::new("u1"), Utc::now());
        cart.add_item(&tea, 9, None, &policy, Utc::now()).unwrap();
        assert_eq!(cart.items()[0].quantity(), 3);
    }
}

mod checkout {
    use super::*;

    #[test]
    fn order_is_a_snapshot_of_the_cart() {
        let policy = PricingPolicy::default();
        let (teapot, cups, tea) = products();
        let mut cart = Cart::new(OwnerKey::new("u1"), Utc::now());
        cart.add_item(&teapot, 1, None, &policy, Utc::now()).unwrap();
        cart.add_item(&tea, 1, None, &policy, Utc::now()).unwrap();
        let lines = vec![BundleLine::from_product(&cups, 2)];
        cart.add_bundle(
            CartBundle::new("CUPS", "Cup pair", lines, 2, Money::from_cents(8_000)),
            &policy,
            Utc::now(),
        )
        .unwrap();

        let order = place(&cart);

        assert_eq!(order.totals(), cart.totals());
        assert_eq!(order.status(), OrderStatus::Pending);
        assert_eq!(order.payment_status(), PaymentStatus::Pending);
        assert_eq!(order.lines().len(), 3);
        assert_eq!(order.lines()[0].unit_price, Money::from_cents(10_000));

        let bundle_line = &order.lines()[2];
        assert_eq!(bundle_line.bundle_code.as_deref(), Some("CUPS"));
        assert_eq!(bundle_line.quantity, 4);
        // Bundle discount stays at order level: 2 x (100.00 - 80.00)
        assert_eq!(order.totals().discount(), Money::from_cents(4_000));
    }

    #[test]
    fn only_active_non_empty_carts_check_out() {
        let policy = PricingPolicy::default();
        let (teapot, _, _) = products();
        let mut cart = Cart::new(OwnerKey::new("u1"), Utc::now());

        let err = Order::check_checkout(&cart, &details()).unwrap_err();
        assert!(matches!(err, OrderError::EmptyCart { .. }));

        cart.add_item(&teapot, 1, None, &policy, Utc::now()).unwrap();
        let mut bad = details();
        bad.shipping_address.postal_code = " ".to_string();
        let err = Order::check_checkout(&cart, &bad).unwrap_err();
        assert!(err.to_string().contains("shippingAddress.postalCode"));

        cart.mark_converted(Utc::now()).unwrap();
        assert_eq!(cart.status(), CartStatus::Converted);
        let err = Order::check_checkout(&cart, &details()).unwrap_err();
        assert!(matches!(err, OrderError::CartNotActive { .. }));

        let err = cart
            .add_item(&teapot, 1, None, &policy, Utc::now())
            .unwrap_err();
        assert!(matches!(err, CartError::NotActive { .. }));
    }
}

mod status {
    use super::*;

    fn two_seller_order() -> Order {
        let policy = PricingPolicy::default();
        let (teapot, _, tea) = products();
        let mut cart = Cart::new(OwnerKey::new("u1"), Utc::now());
        cart.add_item(&teapot, 1, None, &policy, Utc::now()).unwrap();
        cart.add_item(&tea, 2, None, &policy, Utc::now()).unwrap();
        place(&cart)
    }

    #[test]
    fn order_follows_seller_views() {
        let mut order = two_seller_order();
        order.transition(OrderStatus::Confirmed, Utc::now()).unwrap();

        let mut views = SellerOrderView::project(&order, Utc::now());
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].amount, Money::from_cents(10_000));
        assert_eq!(views[1].amount, Money::from_cents(20_000));
        assert_eq!(derived_order_status(&views), None);

        views[0].transition(SellerOrderStatus::Shipped, Utc::now()).unwrap();
        assert_eq!(derived_order_status(&views), Some(OrderStatus::Processing));

        views[1].transition(SellerOrderStatus::Shipped, Utc::now()).unwrap();
        assert_eq!(derived_order_status(&views), Some(OrderStatus::Shipped));

        views[0].transition(SellerOrderStatus::Delivered, Utc::now()).unwrap();
        views[1].transition(SellerOrderStatus::Delivered, Utc::now()).unwrap();
        assert_eq!(derived_order_status(&views), Some(OrderStatus::Delivered));
    }

    #[test]
    fn payment_failure_path() {
        let mut order = two_seller_order();
        order.transition(OrderStatus::PaymentPending, Utc::now()).unwrap();
        order.transition(OrderStatus::PaymentFailed, Utc::now()).unwrap();

        assert!(order.status().is_terminal());
        assert!(order.transition(OrderStatus::Confirmed, Utc::now()).is_err());
        assert!(order.transition(OrderStatus::Cancelled, Utc::now()).is_err());
    }

    #[test]
    fn payment_status_only_moves_forward() {
        let mut order = two_seller_order();
        assert!(order.record_payment_status(PaymentStatus::Completed, Utc::now()));
        assert!(!order.record_payment_status(PaymentStatus::Pending, Utc::now()));
        assert!(!order.record_payment_status(PaymentStatus::Failed, Utc::now()));
        assert_eq!(order.payment_status(), PaymentStatus::Completed);
    }
}
