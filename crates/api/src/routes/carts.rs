//! Cart endpoints.
//!
//! Amounts are in minor currency units.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use chrono::{Duration, Utc};
use common::{CartId, Money, ProductId};
use domain::{Cart, CartBundle, CartItem, OwnerKey, Totals};
use fulfillment::BundleRequest;
use serde::{Deserialize, Serialize};

use super::{parse_cart_id, parse_item_id};
use crate::AppState;
use crate::authz::{Principal, ensure};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct CreateCartRequest {
    /// Only used by anonymous callers without a session header.
    pub owner_key: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest {
    pub product_id: String,
    pub quantity: i64,
    pub variation_id: Option<String>,
}

#[derive(Deserialize)]
pub struct UpdateQuantityRequest {
    pub quantity: i64,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleLineRequest {
    pub product_id: String,
    pub quantity: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddBundleRequest {
    pub code: String,
    pub name: String,
    pub lines: Vec<BundleLineRequest>,
    #[serde(default = "one")]
    pub quantity: u32,
    pub bundle_price_cents: i64,
}

fn one() -> u32 {
    1
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbandonRequest {
    pub idle_minutes: i64,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalsResponse {
    pub subtotal: i64,
    pub discount: i64,
    pub tax: i64,
    pub shipping: i64,
    pub grand_total: i64,
}

impl From<&Totals> for TotalsResponse {
    fn from(totals: &Totals) -> Self {
        Self {
            subtotal: totals.subtotal().cents(),
            discount: totals.discount().cents(),
            tax: totals.tax().cents(),
            shipping: totals.shipping().cents(),
            grand_total: totals.grand_total().cents(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItemResponse {
    pub id: String,
    pub product_id: String,
    pub seller_id: String,
    pub product_name: String,
    pub variation_id: Option<String>,
    pub quantity: u32,
    pub unit_price: i64,
    pub total_price: i64,
}

impl From<&CartItem> for CartItemResponse {
    fn from(item: &CartItem) -> Self {
        Self {
            id: item.id.to_string(),
            product_id: item.product_id.to_string(),
            seller_id: item.seller_id.to_string(),
            product_name: item.product_name.clone(),
            variation_id: item.variation_id.clone(),
            quantity: item.quantity(),
            unit_price: item.unit_price().cents(),
            total_price: item.total_price().cents(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartBundleResponse {
    pub id: String,
    pub code: String,
    pub name: String,
    pub quantity: u32,
    pub bundle_price: i64,
    pub list_total: i64,
    pub total_price: i64,
    pub product_ids: Vec<String>,
}

impl From<&CartBundle> for CartBundleResponse {
    fn from(bundle: &CartBundle) -> Self {
        Self {
            id: bundle.id.to_string(),
            code: bundle.code.clone(),
            name: bundle.name.clone(),
            quantity: bundle.quantity,
            bundle_price: bundle.bundle_price.cents(),
            list_total: bundle.list_total().cents(),
            total_price: bundle.total_price().cents(),
            product_ids: bundle
                .lines
                .iter()
                .map(|l| l.product_id.to_string())
                .collect(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CartResponse {
    pub id: String,
    pub owner_key: String,
    pub status: String,
    pub item_count: u32,
    pub items: Vec<CartItemResponse>,
    pub bundles: Vec<CartBundleResponse>,
    pub totals: TotalsResponse,
}

impl From<&Cart> for CartResponse {
    fn from(cart: &Cart) -> Self {
        Self {
            id: cart.id().to_string(),
            owner_key: cart.owner_key().as_str().to_string(),
            status: cart.status().to_string(),
            item_count: cart.item_quantity(),
            items: cart.items().iter().map(CartItemResponse::from).collect(),
            bundles: cart.bundles().iter().map(CartBundleResponse::from).collect(),
            totals: TotalsResponse::from(cart.totals()),
        }
    }
}

#[derive(Serialize)]
pub struct AbandonResponse {
    pub abandoned: usize,
}

// -- Handlers --

/// Loads a cart and checks the caller may touch it.
async fn owned_cart(
    state: &AppState,
    principal: &Principal,
    cart_id: &str,
) -> Result<CartId, ApiError> {
    let cart_id = parse_cart_id(cart_id)?;
    let cart = state.services.carts.get(cart_id).await?;
    ensure(
        state.policy.can_access_cart(principal, cart.owner_key()),
        principal,
    )?;
    Ok(cart_id)
}

/// POST /carts: Returns the caller's active cart, creating it if needed.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    req: Option<Json<CreateCartRequest>>,
) -> Result<(StatusCode, Json<CartResponse>), ApiError> {
    let Json(req) = req.unwrap_or_default();
    let owner_key = principal
        .owner_key()
        .or_else(|| {
            req.owner_key
                .filter(|k| !k.trim().is_empty())
                .map(|k| OwnerKey::new(format!("session:{}", k.trim())))
        })
        .ok_or_else(|| ApiError::BadRequest("A user, session or ownerKey is required".into()))?;

    let cart = state.services.carts.get_or_create(&owner_key).await?;
    Ok((StatusCode::CREATED, Json(CartResponse::from(&cart))))
}

/// GET /carts/{id}
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart_id = owned_cart(&state, &principal, &id).await?;
    let cart = state.services.carts.get(cart_id).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// POST /carts/{id}/items
#[tracing::instrument(skip(state, req))]
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<AddItemRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart_id = owned_cart(&state, &principal, &id).await?;
    let cart = state
        .services
        .carts
        .add_item(
            cart_id,
            &ProductId::new(req.product_id),
            req.quantity,
            req.variation_id,
        )
        .await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// PATCH /carts/{id}/items/{item_id}
#[tracing::instrument(skip(state, req))]
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path((id, item_id)): Path<(String, String)>,
    Json(req): Json<UpdateQuantityRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart_id = owned_cart(&state, &principal, &id).await?;
    let item_id = parse_item_id(&item_id)?;
    let cart = state
        .services
        .carts
        .update_quantity(cart_id, item_id, req.quantity)
        .await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// DELETE /carts/{id}/items/{item_id}
#[tracing::instrument(skip(state))]
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path((id, item_id)): Path<(String, String)>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart_id = owned_cart(&state, &principal, &id).await?;
    let item_id = parse_item_id(&item_id)?;
    let cart = state.services.carts.remove_item(cart_id, item_id).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// DELETE /carts/{id}/items: Empties the cart.
#[tracing::instrument(skip(state))]
pub async fn clear(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart_id = owned_cart(&state, &principal, &id).await?;
    let cart = state.services.carts.clear(cart_id).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// POST /carts/{id}/bundles
#[tracing::instrument(skip(state, req))]
pub async fn add_bundle(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<AddBundleRequest>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart_id = owned_cart(&state, &principal, &id).await?;
    let request = BundleRequest {
        code: req.code,
        name: req.name,
        lines: req
            .lines
            .into_iter()
            .map(|l| (ProductId::new(l.product_id), l.quantity))
            .collect(),
        quantity: req.quantity,
        bundle_price: Money::from_cents(req.bundle_price_cents),
    };
    let cart = state.services.carts.add_bundle(cart_id, request).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// DELETE /carts/{id}/bundles/{bundle_id}
#[tracing::instrument(skip(state))]
pub async fn remove_bundle(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path((id, bundle_id)): Path<(String, String)>,
) -> Result<Json<CartResponse>, ApiError> {
    let cart_id = owned_cart(&state, &principal, &id).await?;
    let bundle_id = parse_item_id(&bundle_id)?;
    let cart = state.services.carts.remove_bundle(cart_id, bundle_id).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// POST /carts/{id}/merge: Folds the given (anonymous) cart into the
/// signed-in caller's cart.
#[tracing::instrument(skip(state))]
pub async fn merge(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<CartResponse>, ApiError> {
    let into_owner = principal.user_key().ok_or(ApiError::Unauthorized)?;
    let from_cart_id = owned_cart(&state, &principal, &id).await?;
    let cart = state.services.carts.merge(from_cart_id, &into_owner).await?;
    Ok(Json(CartResponse::from(&cart)))
}

/// POST /admin/carts/abandon: Marks carts idle for longer than
/// `idleMinutes` as abandoned.
#[tracing::instrument(skip(state, req))]
pub async fn abandon_idle(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(req): Json<AbandonRequest>,
) -> Result<Json<AbandonResponse>, ApiError> {
    ensure(state.policy.is_admin(&principal), &principal)?;
    if req.idle_minutes <= 0 {
        return Err(ApiError::BadRequest("idleMinutes must be positive".into()));
    }
    let idle_since = Utc::now() - Duration::minutes(req.idle_minutes);
    let abandoned = state.services.carts.mark_abandoned(idle_since).await?;
    Ok(Json(AbandonResponse { abandoned }))
}
