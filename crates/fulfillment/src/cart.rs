//! Cart aggregate manager.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{CartId, ItemId, Money, ProductId};
use domain::{BundleLine, Cart, CartBundle, CartStatus, OwnerKey, PricingPolicy, Totals};
use serde::Serialize;
use store::{CartRepository, ProductRepository};

use crate::error::{FulfillmentError, Result};

/// A bundle as requested by the client: products are resolved at add time.
#[derive(Debug, Clone)]
pub struct BundleRequest {
    pub code: String,
    pub name: String,
    pub lines: Vec<(ProductId, u32)>,
    pub quantity: u32,
    pub bundle_price: Money,
}

/// Read-only view of a cart's totals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartSummary {
    pub cart_id: CartId,
    pub status: CartStatus,
    pub item_count: u32,
    pub line_count: usize,
    pub totals: Totals,
}

/// Owns the mutable pre-order basket.
///
/// Every mutation loads the cart, applies the change through the aggregate
/// (which recomputes totals) and saves it back. No locking: concurrent
/// writers to an active cart resolve as last write wins, but a cart that
/// has been converted, merged or abandoned in the meantime is never
/// overwritten.
pub struct CartService {
    carts: Arc<dyn CartRepository>,
    products: Arc<dyn ProductRepository>,
    policy: PricingPolicy,
}

impl CartService {
    pub fn new(
        carts: Arc<dyn CartRepository>,
        products: Arc<dyn ProductRepository>,
        policy: PricingPolicy,
    ) -> Self {
        Self {
            carts,
            products,
            policy,
        }
    }

    pub fn policy(&self) -> &PricingPolicy {
        &self.policy
    }

    /// Returns the owner's active cart, creating one on first interaction.
    #[tracing::instrument(skip(self), fields(owner_key = %owner_key))]
    pub async fn get_or_create(&self, owner_key: &OwnerKey) -> Result<Cart> {
        if let Some(cart) = self.carts.find_active_cart(owner_key).await? {
            return Ok(cart);
        }

        let cart = Cart::new(owner_key.clone(), Utc::now());
        self.write(&cart).await?;
        tracing::info!(cart_id = %cart.id(), "cart created");
        Ok(cart)
    }

    pub async fn get(&self, cart_id: CartId) -> Result<Cart> {
        self.carts
            .get_cart(cart_id)
            .await?
            .ok_or(FulfillmentError::CartNotFound(cart_id))
    }

    pub async fn summarize(&self, cart_id: CartId) -> Result<CartSummary> {
        let cart = self.get(cart_id).await?;
        Ok(CartSummary {
            cart_id: cart.id(),
            status: cart.status(),
            item_count: cart.item_quantity(),
            line_count: cart.items().len() + cart.bundles().len(),
            totals: *cart.totals(),
        })
    }

    /// Adds a product, or increments the matching line.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        cart_id: CartId,
        product_id: &ProductId,
        quantity: i64,
        variation_id: Option<String>,
    ) -> Result<Cart> {
        let mut cart = self.get(cart_id).await?;
        let product = self
            .products
            .get_product(product_id)
            .await?
            .ok_or_else(|| FulfillmentError::ProductNotFound(product_id.clone()))?;

        cart.add_item(&product, quantity, variation_id, &self.policy, Utc::now())?;
        self.save(&cart, "add_item").await?;
        Ok(cart)
    }

    #[tracing::instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        cart_id: CartId,
        item_id: ItemId,
        quantity: i64,
    ) -> Result<Cart> {
        let mut cart = self.get(cart_id).await?;
        cart.update_quantity(item_id, quantity, &self.policy, Utc::now())?;
        self.save(&cart, "update_quantity").await?;
        Ok(cart)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(&self, cart_id: CartId, item_id: ItemId) -> Result<Cart> {
        let mut cart = self.get(cart_id).await?;
        cart.remove_item(item_id, &self.policy, Utc::now())?;
        self.save(&cart, "remove_item").await?;
        Ok(cart)
    }

    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, cart_id: CartId) -> Result<Cart> {
        let mut cart = self.get(cart_id).await?;
        cart.clear(&self.policy, Utc::now())?;
        self.save(&cart, "clear").await?;
        Ok(cart)
    }

    /// Adds a bundle after resolving each of its products.
    #[tracing::instrument(skip(self, request), fields(bundle_code = %request.code))]
    pub async fn add_bundle(&self, cart_id: CartId, request: BundleRequest) -> Result<Cart> {
        let mut cart = self.get(cart_id).await?;

        let mut lines = Vec::with_capacity(request.lines.len());
        for (product_id, quantity) in &request.lines {
            let product = self
                .products
                .get_product(product_id)
                .await?
                .ok_or_else(|| FulfillmentError::ProductNotFound(product_id.clone()))?;
            if !product.is_purchasable() {
                return Err(domain::CartError::ProductUnavailable {
                    product_id: product.id,
                }
                .into());
            }
            lines.push(BundleLine::from_product(&product, *quantity));
        }

        let bundle = CartBundle::new(
            request.code,
            request.name,
            lines,
            request.quantity,
            request.bundle_price,
        );
        cart.add_bundle(bundle, &self.policy, Utc::now())?;
        self.save(&cart, "add_bundle").await?;
        Ok(cart)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_bundle(&self, cart_id: CartId, bundle_id: ItemId) -> Result<Cart> {
        let mut cart = self.get(cart_id).await?;
        cart.remove_bundle(bundle_id, &self.policy, Utc::now())?;
        self.save(&cart, "remove_bundle").await?;
        Ok(cart)
    }

    /// Folds an (anonymous) cart into the owner's active cart.
    ///
    /// The source cart is marked `merged`. Merging a cart into itself is a
    /// no-op.
    #[tracing::instrument(skip(self), fields(into_owner = %into_owner))]
    pub async fn merge(&self, from_cart_id: CartId, into_owner: &OwnerKey) -> Result<Cart> {
        let mut source = self.get(from_cart_id).await?;
        let mut target = self.get_or_create(into_owner).await?;
        if target.id() == source.id() {
            return Ok(target);
        }

        let now = Utc::now();
        target.absorb(&source, &self.policy, now)?;
        source.mark_merged(now)?;

        // Close the source first so a concurrent checkout of it wins.
        self.write(&source).await?;
        self.save(&target, "merge").await?;
        tracing::info!(from = %source.id(), into = %target.id(), "carts merged");
        Ok(target)
    }

    /// Marks active carts idle since before `idle_since` as abandoned.
    ///
    /// Returns the number of carts swept.
    #[tracing::instrument(skip(self))]
    pub async fn mark_abandoned(&self, idle_since: DateTime<Utc>) -> Result<usize> {
        let idle = self.carts.list_idle_carts(idle_since).await?;
        let now = Utc::now();
        let mut swept = 0;
        for mut cart in idle {
            if cart.mark_abandoned(now).is_err() {
                continue;
            }
            // Refused when the cart was converted or merged after listing.
            if self.carts.save_cart(&cart).await? {
                swept += 1;
            } else {
                tracing::debug!(cart_id = %cart.id(), "cart closed since listing, not abandoned");
            }
        }
        if swept > 0 {
            tracing::info!(swept, "idle carts abandoned");
        }
        Ok(swept)
    }

    async fn save(&self, cart: &Cart, op: &'static str) -> Result<()> {
        self.write(cart).await?;
        metrics::counter!("carts_mutations_total", "op" => op).increment(1);
        tracing::debug!(
            cart_id = %cart.id(),
            grand_total = %cart.totals().grand_total(),
            "cart updated"
        );
        Ok(())
    }

    /// Writes the cart, failing if the stored copy is no longer active.
    async fn write(&self, cart: &Cart) -> Result<()> {
        if !self.carts.save_cart(cart).await? {
            let status = self.get(cart.id()).await?.status();
            return Err(domain::CartError::NotActive { status }.into());
        }
        Ok(())
    }
}
