//! Order read, administration and fulfillment requeue endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{FulfillmentJob, Order, OrderLine, OrderStatus};
use serde::{Deserialize, Serialize};

use super::carts::TotalsResponse;
use super::parse_order_id;
use crate::AppState;
use crate::authz::{Principal, ensure};
use crate::error::ApiError;

// -- Request types --

#[derive(Deserialize)]
pub struct TransitionRequest {
    pub status: String,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderLineResponse {
    pub product_id: String,
    pub seller_id: String,
    pub product_name: String,
    pub variation_id: Option<String>,
    pub bundle_code: Option<String>,
    pub quantity: u32,
    pub unit_price: i64,
    pub total_price: i64,
}

impl From<&OrderLine> for OrderLineResponse {
    fn from(line: &OrderLine) -> Self {
        Self {
            product_id: line.product_id.to_string(),
            seller_id: line.seller_id.to_string(),
            product_name: line.product_name.clone(),
            variation_id: line.variation_id.clone(),
            bundle_code: line.bundle_code.clone(),
            quantity: line.quantity,
            unit_price: line.unit_price.cents(),
            total_price: line.total_price.cents(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub cart_id: String,
    pub status: String,
    pub payment_status: String,
    pub payment_method: String,
    pub customer_name: String,
    pub customer_email: String,
    pub shipping_address: String,
    pub lines: Vec<OrderLineResponse>,
    pub totals: TotalsResponse,
    pub version: u64,
    pub created_at: String,
    pub updated_at: String,
}

impl From<&Order> for OrderResponse {
    fn from(order: &Order) -> Self {
        Self {
            id: order.id().to_string(),
            order_number: order.order_number().to_string(),
            cart_id: order.cart_id().to_string(),
            status: order.status().to_string(),
            payment_status: order.payment_status().to_string(),
            payment_method: order.payment_method().as_str().to_string(),
            customer_name: order.customer().full_name(),
            customer_email: order.customer().email.clone(),
            shipping_address: order.shipping_address().one_line(),
            lines: order.lines().iter().map(OrderLineResponse::from).collect(),
            totals: TotalsResponse::from(order.totals()),
            version: order.version(),
            created_at: order.created_at().to_rfc3339(),
            updated_at: order.updated_at().to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentJobResponse {
    pub order_id: String,
    pub status: String,
    pub attempts: u32,
    pub stock_applied: bool,
    pub fanout_applied: bool,
    pub last_error: Option<String>,
}

impl From<&FulfillmentJob> for FulfillmentJobResponse {
    fn from(job: &FulfillmentJob) -> Self {
        Self {
            order_id: job.order_id.to_string(),
            status: job.status.as_str().to_string(),
            attempts: job.attempts,
            stock_applied: job.stock_applied,
            fanout_applied: job.fanout_applied,
            last_error: job.last_error.clone(),
        }
    }
}

// -- Handlers --

/// GET /orders/{id}: Readable by the buyer or an admin.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_order_id(&id)?;
    let order = state.services.orders.get(order_id).await?;
    ensure(state.policy.can_view_order(&principal, &order), &principal)?;
    Ok(Json(OrderResponse::from(&order)))
}

/// PATCH /orders/{id}/status: Admin status change, checked against the
/// order state machine. Refunds also refund the gateway payment record.
#[tracing::instrument(skip(state, req))]
pub async fn transition(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
    Json(req): Json<TransitionRequest>,
) -> Result<Json<OrderResponse>, ApiError> {
    ensure(state.policy.is_admin(&principal), &principal)?;
    let order_id = parse_order_id(&id)?;
    let to = OrderStatus::parse(req.status.trim())
        .ok_or_else(|| ApiError::BadRequest(format!("Unknown order status: {}", req.status)))?;

    let order = if to == OrderStatus::Refunded {
        state.payments.refund(order_id).await?
    } else {
        state.services.orders.transition(order_id, to).await?
    };
    Ok(Json(OrderResponse::from(&order)))
}

/// POST /orders/{id}/fulfillment: Puts the order's fulfillment job back in
/// the queue for the worker.
#[tracing::instrument(skip(state))]
pub async fn requeue_fulfillment(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<(StatusCode, Json<FulfillmentJobResponse>), ApiError> {
    ensure(state.policy.is_admin(&principal), &principal)?;
    let order_id = parse_order_id(&id)?;
    let job = state.services.runner.requeue(order_id).await?;
    Ok((StatusCode::ACCEPTED, Json(FulfillmentJobResponse::from(&job))))
}

/// GET /orders/{id}/fulfillment
#[tracing::instrument(skip(state))]
pub async fn fulfillment_status(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Path(id): Path<String>,
) -> Result<Json<FulfillmentJobResponse>, ApiError> {
    ensure(state.policy.is_admin(&principal), &principal)?;
    let order_id = parse_order_id(&id)?;
    let job = state
        .services
        .runner
        .job(order_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("No fulfillment job for order {id}")))?;
    Ok(Json(FulfillmentJobResponse::from(&job)))
}
