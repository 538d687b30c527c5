//! Payment creation, browser return and gateway webhook endpoints.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::Json;
use axum::extract::{Form, Query, State};
use axum::response::Redirect;
use payment::ReturnParams;
use serde::{Deserialize, Serialize};

use super::parse_order_id;
use crate::AppState;
use crate::authz::{Principal, ensure};
use crate::error::ApiError;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    pub order_id: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentResponse {
    pub payment_url: String,
    pub payment_form: BTreeMap<String, String>,
    pub transaction_id: String,
    pub status: String,
}

#[derive(Debug, Deserialize)]
pub struct ReturnQuery {
    #[serde(rename = "orderId")]
    pub order_id: Option<String>,
    pub status: Option<String>,
    pub payment_id: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookResponse {
    pub status: &'static str,
    pub outcome: &'static str,
    pub payment_status: String,
}

/// POST /payments: Signed request for the hosted payment page.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    Json(req): Json<CreatePaymentRequest>,
) -> Result<Json<CreatePaymentResponse>, ApiError> {
    let order_id = parse_order_id(&req.order_id)?;
    let order = state.services.orders.get(order_id).await?;
    ensure(state.policy.can_view_order(&principal, &order), &principal)?;

    let request = state.payments.create_payment(order_id).await?;
    Ok(Json(CreatePaymentResponse {
        payment_url: request.redirect_url,
        payment_form: request.form,
        transaction_id: request.payment_id.to_string(),
        status: request.status.to_string(),
    }))
}

/// GET /payments/return: The browser coming back from the gateway.
#[tracing::instrument(skip(state))]
pub async fn handle_return(
    State(state): State<Arc<AppState>>,
    Query(query): Query<ReturnQuery>,
) -> Redirect {
    let target = state
        .payments
        .handle_return(&ReturnParams {
            order_id: query.order_id,
            status: query.status,
            payment_id: query.payment_id,
        })
        .await;
    Redirect::to(&target)
}

/// POST /payments/webhook: Form-encoded, HMAC-signed gateway callback.
#[tracing::instrument(skip(state, payload))]
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    Form(payload): Form<BTreeMap<String, String>>,
) -> Result<Json<WebhookResponse>, ApiError> {
    let outcome = state.payments.verify_payment(&payload).await?;
    Ok(Json(WebhookResponse {
        status: "ok",
        outcome: outcome.label(),
        payment_status: outcome.status().to_string(),
    }))
}
