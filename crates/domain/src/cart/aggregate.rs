//! Cart aggregate implementation.

use chrono::{DateTime, Utc};
use common::{CartId, ItemId, Money};
use serde::{Deserialize, Serialize};

use crate::pricing::{PricingPolicy, Totals};
use crate::product::Product;

use super::{CartBundle, CartError, CartItem, CartStatus, OwnerKey};

/// Cart aggregate root.
///
/// A cart is owned by exactly one user or anonymous session. Every mutation
/// goes through a method on this type and ends with a totals recomputation,
/// so `totals` always reflects `items` and `bundles`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    id: CartId,
    owner_key: OwnerKey,
    items: Vec<CartItem>,
    bundles: Vec<CartBundle>,
    totals: Totals,
    status: CartStatus,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

// Query methods
impl Cart {
    /// Creates an empty, active cart for an owner.
    pub fn new(owner_key: OwnerKey, now: DateTime<Utc>) -> Self {
        Self {
            id: CartId::new(),
            owner_key,
            items: Vec::new(),
            bundles: Vec::new(),
            totals: Totals::default(),
            status: CartStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> CartId {
        self.id
    }

    pub fn owner_key(&self) -> &OwnerKey {
        &self.owner_key
    }

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn bundles(&self) -> &[CartBundle] {
        &self.bundles
    }

    pub fn get_item(&self, item_id: ItemId) -> Option<&CartItem> {
        self.items.iter().find(|item| item.id == item_id)
    }

    pub fn totals(&self) -> &Totals {
        &self.totals
    }

    pub fn status(&self) -> CartStatus {
        self.status
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns true if the cart has no items and no bundles.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty() && self.bundles.is_empty()
    }

    /// Returns the total number of units across items.
    pub fn item_quantity(&self) -> u32 {
        self.items.iter().map(|item| item.quantity).sum()
    }
}

// Mutations
impl Cart {
    /// Adds a product to the cart.
    ///
    /// If a line for the same product and variation exists, its quantity is
    /// incremented instead. The resulting quantity is clamped to the
    /// product's stock at this instant. Returns the id of the affected line.
    pub fn add_item(
        &mut self,
        product: &Product,
        quantity: i64,
        variation_id: Option<String>,
        policy: &PricingPolicy,
        now: DateTime<Utc>,
    ) -> Result<ItemId, CartError> {
        self.ensure_active()?;
        let quantity = positive_quantity(quantity)?;

        if !product.active {
            return Err(CartError::ProductUnavailable {
                product_id: product.id.clone(),
            });
        }
        if product.stock == 0 {
            return Err(CartError::OutOfStock {
                product_id: product.id.clone(),
            });
        }

        let item_id = match self
            .items
            .iter_mut()
            .find(|item| item.matches(&product.id, variation_id.as_deref()))
        {
            Some(existing) => {
                existing.quantity = existing.quantity.saturating_add(quantity).min(product.stock);
                existing.stock_cap = product.stock;
                existing.unit_price = product.price;
                existing.product_name = product.name.clone();
                existing.refresh_total();
                existing.id
            }
            None => {
                let item =
                    CartItem::from_product(product, quantity.min(product.stock), variation_id);
                let id = item.id;
                self.items.push(item);
                id
            }
        };

        self.touch(policy, now);
        Ok(item_id)
    }

    /// Sets the quantity of an existing line, clamped to its stock cap.
    pub fn update_quantity(
        &mut self,
        item_id: ItemId,
        quantity: i64,
        policy: &PricingPolicy,
        now: DateTime<Utc>,
    ) -> Result<(), CartError> {
        self.ensure_active()?;
        let quantity = positive_quantity(quantity)?;

        let item = self
            .items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or(CartError::ItemNotFound { item_id })?;
        item.quantity = quantity.min(item.stock_cap.max(1));
        item.refresh_total();

        self.touch(policy, now);
        Ok(())
    }

    /// Removes a line from the cart.
    pub fn remove_item(
        &mut self,
        item_id: ItemId,
        policy: &PricingPolicy,
        now: DateTime<Utc>,
    ) -> Result<(), CartError> {
        self.ensure_active()?;
        let before = self.items.len();
        self.items.retain(|item| item.id != item_id);
        if self.items.len() == before {
            return Err(CartError::ItemNotFound { item_id });
        }

        self.touch(policy, now);
        Ok(())
    }

    /// Adds a bundle to the cart.
    pub fn add_bundle(
        &mut self,
        bundle: CartBundle,
        policy: &PricingPolicy,
        now: DateTime<Utc>,
    ) -> Result<ItemId, CartError> {
        self.ensure_active()?;
        if bundle.lines.is_empty() {
            return Err(CartError::InvalidBundle {
                reason: "bundle has no lines",
            });
        }
        if bundle.lines.iter().any(|line| line.quantity == 0) {
            return Err(CartError::InvalidBundle {
                reason: "bundle line quantity must be greater than 0",
            });
        }
        if !bundle.bundle_price.is_positive() {
            return Err(CartError::InvalidBundle {
                reason: "bundle price must be greater than 0",
            });
        }
        positive_quantity(i64::from(bundle.quantity))?;

        let id = bundle.id;
        self.bundles.push(bundle);
        self.touch(policy, now);
        Ok(id)
    }

    /// Removes a bundle from the cart.
    pub fn remove_bundle(
        &mut self,
        bundle_id: ItemId,
        policy: &PricingPolicy,
        now: DateTime<Utc>,
    ) -> Result<(), CartError> {
        self.ensure_active()?;
        let before = self.bundles.len();
        self.bundles.retain(|bundle| bundle.id != bundle_id);
        if self.bundles.len() == before {
            return Err(CartError::BundleNotFound { bundle_id });
        }

        self.touch(policy, now);
        Ok(())
    }

    /// Removes every item and bundle.
    pub fn clear(&mut self, policy: &PricingPolicy, now: DateTime<Utc>) -> Result<(), CartError> {
        self.ensure_active()?;
        self.items.clear();
        self.bundles.clear();
        self.touch(policy, now);
        Ok(())
    }

    /// Folds another cart's lines into this one.
    ///
    /// Matching lines are summed and clamped to the larger of the two stock
    /// caps; the source cart is left untouched (the caller marks it merged).
    pub fn absorb(
        &mut self,
        other: &Cart,
        policy: &PricingPolicy,
        now: DateTime<Utc>,
    ) -> Result<(), CartError> {
        self.ensure_active()?;
        for incoming in &other.items {
            match self
                .items
                .iter_mut()
                .find(|item| item.matches(&incoming.product_id, incoming.variation_id.as_deref()))
            {
                Some(existing) => {
                    let cap = existing.stock_cap.max(incoming.stock_cap);
                    existing.quantity = existing.quantity.saturating_add(incoming.quantity).min(cap);
                    existing.stock_cap = cap;
                    existing.refresh_total();
                }
                None => {
                    let mut item = incoming.clone();
                    item.id = ItemId::new();
                    self.items.push(item);
                }
            }
        }
        for bundle in &other.bundles {
            let mut bundle = bundle.clone();
            bundle.id = ItemId::new();
            self.bundles.push(bundle);
        }

        self.touch(policy, now);
        Ok(())
    }

    /// Marks the cart as converted into an order.
    pub fn mark_converted(&mut self, now: DateTime<Utc>) -> Result<(), CartError> {
        self.finish(CartStatus::Converted, now)
    }

    /// Marks the cart as merged into another cart.
    pub fn mark_merged(&mut self, now: DateTime<Utc>) -> Result<(), CartError> {
        self.finish(CartStatus::Merged, now)
    }

    /// Marks an idle cart as abandoned.
    pub fn mark_abandoned(&mut self, now: DateTime<Utc>) -> Result<(), CartError> {
        self.finish(CartStatus::Abandoned, now)
    }

    /// Recomputes totals from the current lines.
    pub fn recompute(&mut self, policy: &PricingPolicy) {
        let subtotal: Money = self.items.iter().map(CartItem::total_price).sum::<Money>()
            + self.bundles.iter().map(CartBundle::list_total).sum::<Money>();
        let discount: Money = self.bundles.iter().map(CartBundle::savings).sum();
        self.totals = Totals::compute(subtotal, discount, !self.is_empty(), policy);
    }

    fn finish(&mut self, status: CartStatus, now: DateTime<Utc>) -> Result<(), CartError> {
        self.ensure_active()?;
        self.status = status;
        self.updated_at = now;
        Ok(())
    }

    fn touch(&mut self, policy: &PricingPolicy, now: DateTime<Utc>) {
        self.recompute(policy);
        self.updated_at = now;
    }

    fn ensure_active(&self) -> Result<(), CartError> {
        if self.status.can_modify() {
            Ok(())
        } else {
            Err(CartError::NotActive {
                status: self.status,
            })
        }
    }
}

fn positive_quantity(quantity: i64) -> Result<u32, CartError> {
    if quantity <= 0 {
        return Err(CartError::InvalidQuantity { quantity });
    }
    Ok(u32::try_from(quantity).unwrap_or(u32::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cart::BundleLine;
    use common::ProductId;

    fn policy() -> PricingPolicy {
        PricingPolicy::default()
    }

    fn product(id: &str, seller: &str, price_cents: i64, stock: u32) -> Product {
        Product::new(id, seller, format!("Product {id}"), Money::from_cents(price_cents), stock)
    }

    fn new_cart() -> Cart {
        Cart::new(OwnerKey::new("user-1"), Utc::now())
    }

    fn assert_totals_consistent(cart: &Cart) {
        let items: Money = cart.items().iter().map(CartItem::total_price).sum();
        let bundles: Money = cart.bundles().iter().map(CartBundle::list_total).sum();
        let t = cart.totals();
        assert_eq!(t.subtotal(), items + bundles);
        assert_eq!(t.grand_total(), t.subtotal() + t.shipping() - t.discount() + t.tax());
    }

    #[test]
    fn add_item_creates_line_and_recomputes() {
        let mut cart = new_cart();
        let p = product("SKU-1", "seller-a", 12_500, 10);

        cart.add_item(&p, 2, None, &policy(), Utc::now()).unwrap();

        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.totals().subtotal(), Money::from_cents(25_000));
        assert_eq!(cart.totals().shipping(), Money::from_cents(2_990));
        assert_eq!(cart.totals().grand_total(), Money::from_cents(27_990));
        assert_totals_consistent(&cart);
    }

    #[test]
    fn adding_same_product_increments_instead_of_duplicating() {
        let mut cart = new_cart();
        let p = product("SKU-1", "seller-a", 8_000, 10);

        let first = cart.add_item(&p, 1, None, &policy(), Utc::now()).unwrap();
        let second = cart.add_item(&p, 3, None, &policy(), Utc::now()).unwrap();

        assert_eq!(first, second);
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.items()[0].quantity, 4);
        assert_eq!(cart.totals().subtotal(), Money::from_cents(32_000));
        assert_eq!(cart.totals().shipping(), Money::zero());
        assert_eq!(cart.totals().grand_total(), Money::from_cents(32_000));
    }

    #[test]
    fn different_variations_are_separate_lines() {
        let mut cart = new_cart();
        let p = product("SKU-1", "seller-a", 1_000, 10);

        cart.add_item(&p, 1, Some("S".into()), &policy(), Utc::now()).unwrap();
        cart.add_item(&p, 1, Some("M".into()), &policy(), Utc::now()).unwrap();

        assert_eq!(cart.items().len(), 2);
    }

    #[test]
    fn quantity_is_clamped_to_stock_at_add_time() {
        let mut cart = new_cart();
        let p = product("SKU-1", "seller-a", 1_000, 3);

        cart.add_item(&p, 5, None, &policy(), Utc::now()).unwrap();
        assert_eq!(cart.items()[0].quantity, 3);
        assert_eq!(cart.items()[0].stock_cap, 3);

        cart.add_item(&p, 2, None, &policy(), Utc::now()).unwrap();
        assert_eq!(cart.items()[0].quantity, 3);
    }

    #[test]
    fn non_positive_quantity_is_rejected_without_side_effects() {
        let mut cart = new_cart();
        let p = product("SKU-1", "seller-a", 1_000, 3);
        let before = cart.clone();

        assert!(matches!(
            cart.add_item(&p, 0, None, &policy(), Utc::now()),
            Err(CartError::InvalidQuantity { quantity: 0 })
        ));
        assert!(matches!(
            cart.add_item(&p, -2, None, &policy(), Utc::now()),
            Err(CartError::InvalidQuantity { quantity: -2 })
        ));
        assert_eq!(cart, before);
    }

    #[test]
    fn inactive_or_empty_products_are_rejected() {
        let mut cart = new_cart();
        let mut inactive = product("SKU-1", "seller-a", 1_000, 3);
        inactive.active = false;
        let empty = product("SKU-2", "seller-a", 1_000, 0);

        assert!(matches!(
            cart.add_item(&inactive, 1, None, &policy(), Utc::now()),
            Err(CartError::ProductUnavailable { .. })
        ));
        assert!(matches!(
            cart.add_item(&empty, 1, None, &policy(), Utc::now()),
            Err(CartError::OutOfStock { .. })
        ));
    }

    #[test]
    fn update_quantity_clamps_to_stock_cap() {
        let mut cart = new_cart();
        let p = product("SKU-1", "seller-a", 1_000, 4);
        let id = cart.add_item(&p, 1, None, &policy(), Utc::now()).unwrap();

        cart.update_quantity(id, 10, &policy(), Utc::now()).unwrap();
        assert_eq!(cart.get_item(id).unwrap().quantity, 4);
        assert_eq!(cart.totals().subtotal(), Money::from_cents(4_000));

        cart.update_quantity(id, 2, &policy(), Utc::now()).unwrap();
        assert_eq!(cart.get_item(id).unwrap().quantity, 2);
        assert_totals_consistent(&cart);

        assert!(matches!(
            cart.update_quantity(ItemId::new(), 1, &policy(), Utc::now()),
            Err(CartError::ItemNotFound { .. })
        ));
    }

    #[test]
    fn remove_and_clear() {
        let mut cart = new_cart();
        let a = product("SKU-1", "seller-a", 1_000, 4);
        let b = product("SKU-2", "seller-b", 2_000, 4);
        let id_a = cart.add_item(&a, 1, None, &policy(), Utc::now()).unwrap();
        cart.add_item(&b, 1, None, &policy(), Utc::now()).unwrap();

        cart.remove_item(id_a, &policy(), Utc::now()).unwrap();
        assert_eq!(cart.items().len(), 1);
        assert_eq!(cart.totals().subtotal(), Money::from_cents(2_000));

        cart.clear(&policy(), Utc::now()).unwrap();
        assert!(cart.is_empty());
        assert_eq!(*cart.totals(), Totals::default());
    }

    #[test]
    fn bundles_count_towards_subtotal_and_discount() {
        let mut cart = new_cart();
        let a = product("SKU-A", "seller-a", 10_000, 10);
        let b = product("SKU-B", "seller-b", 5_000, 10);
        let bundle = CartBundle::new(
            "SET",
            "Set",
            vec![BundleLine::from_product(&a, 1), BundleLine::from_product(&b, 1)],
            1,
            Money::from_cents(12_000),
        );

        let bundle_id = cart.add_bundle(bundle, &policy(), Utc::now()).unwrap();

        assert_eq!(cart.totals().subtotal(), Money::from_cents(15_000));
        assert_eq!(cart.totals().discount(), Money::from_cents(3_000));
        assert_eq!(cart.totals().grand_total(), Money::from_cents(14_990));
        assert_totals_consistent(&cart);

        cart.remove_bundle(bundle_id, &policy(), Utc::now()).unwrap();
        assert!(cart.is_empty());
    }

    #[test]
    fn invalid_bundles_are_rejected() {
        let mut cart = new_cart();
        let empty = CartBundle::new("X", "X", vec![], 1, Money::from_cents(100));
        assert!(matches!(
            cart.add_bundle(empty, &policy(), Utc::now()),
            Err(CartError::InvalidBundle { .. })
        ));
    }

    #[test]
    fn converted_cart_rejects_mutations() {
        let mut cart = new_cart();
        let p = product("SKU-1", "seller-a", 1_000, 4);
        cart.add_item(&p, 1, None, &policy(), Utc::now()).unwrap();
        cart.mark_converted(Utc::now()).unwrap();

        assert_eq!(cart.status(), CartStatus::Converted);
        assert!(matches!(
            cart.add_item(&p, 1, None, &policy(), Utc::now()),
            Err(CartError::NotActive {
                status: CartStatus::Converted
            })
        ));
        assert!(cart.mark_converted(Utc::now()).is_err());
    }

    #[test]
    fn absorb_merges_matching_lines() {
        let p = product("SKU-1", "seller-a", 1_000, 5);
        let q = product("SKU-2", "seller-a", 2_000, 5);

        let mut user_cart = new_cart();
        user_cart.add_item(&p, 2, None, &policy(), Utc::now()).unwrap();

        let mut guest_cart = Cart::new(OwnerKey::new("session-9"), Utc::now());
        guest_cart.add_item(&p, 4, None, &policy(), Utc::now()).unwrap();
        guest_cart.add_item(&q, 1, None, &policy(), Utc::now()).unwrap();

        user_cart.absorb(&guest_cart, &policy(), Utc::now()).unwrap();

        assert_eq!(user_cart.items().len(), 2);
        let merged = user_cart
            .items()
            .iter()
            .find(|i| i.product_id == ProductId::new("SKU-1"))
            .unwrap();
        assert_eq!(merged.quantity, 5);
        assert_totals_consistent(&user_cart);
    }
}
