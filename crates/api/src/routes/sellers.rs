//! Seller order endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use common::SellerId;
use domain::{SellerOrderStatus, SellerOrderView};
use serde::{Deserialize, Serialize};

use super::orders::OrderLineResponse;
use super::parse_order_id;
use crate::AppState;
use crate::authz::{Principal, ensure};
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SellerOrderResponse {
    pub order_id: String,
    pub seller_id: String,
    pub order_number: String,
    pub customer_name: String,
    pub shipping_address: String,
    pub status: String,
    pub amount: i64,
    pub lines: Vec<OrderLineResponse>,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&SellerOrderView> for SellerOrderResponse {
    fn from(view: &SellerOrderView) -> Self {
        Self {
            order_id: view.order_id.to_string(),
            seller_id: view.seller_id.to_string(),
            order_number: view.order_number.clone(),
            customer_name: view.customer_name.clone(),
            shipping_address: view.shipping_address.one_line(),
            status: view.status().to_string(),
            amount: view.amount.cents(),
            lines: view.lines.iter().map(OrderLineResponse::from).collect(),
            created_at: view.created_at.to_rfc3339(),
            updated_at: view.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStatusResponse {
    #[serde(flatten)]
    pub view: SellerOrderResponse,
    /// Order status after propagation; absent if propagation failed.
    pub order_status: Option<String>,
}

/// GET /sellers/{seller_id}/orders: Newest first.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(seller_id): Path<String>,
) -> Result<Json<Vec<SellerOrderResponse>>, ApiError> {
    let seller_id = SellerId::new(seller_id);
    ensure(
        state.policy.can_manage_seller(&principal, &seller_id),
        &principal,
    )?;
    let views = state.services.sellers.list_for_seller(&seller_id).await?;
    Ok(Json(views.iter().map(SellerOrderResponse::from).collect()))
}

/// PATCH /sellers/{seller_id}/orders/{order_id}: Seller status change,
/// followed by propagation to the order.
#[tracing::instrument(skip(state, req))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path((seller_id, order_id)): Path<(String, String)>,
    Json(req): Json<UpdateStatusRequest>,
) -> Result<Json<UpdateStatusResponse>, ApiError> {
    let seller_id = SellerId::new(seller_id);
    ensure(
        state.policy.can_manage_seller(&principal, &seller_id),
        &principal,
    )?;
    let order_id = parse_order_id(&order_id)?;
    let status = SellerOrderStatus::parse(req.status.trim())
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown seller status: {}", req.status)))?;

    let view = state
        .services
        .sellers
        .update_status(order_id, &seller_id, status)
        .await?;

    // The seller's change stands even if the order cannot follow yet.
    let order_status = match state.services.sellers.propagate(order_id).await {
        Ok(order) => Some(order.status().to_string()),
        Err(e) => {
            tracing::warn!(%order_id, error = %e, "seller status not propagated to order");
            None
        }
    };

    Ok(Json(UpdateStatusResponse {
        view: SellerOrderResponse::from(&view),
        order_status,
    }))
}
