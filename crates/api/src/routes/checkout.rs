//! Checkout endpoint.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use domain::{Address, CheckoutDetails, Customer, PaymentMethod};
use fulfillment::FulfillmentReport;
use serde::{Deserialize, Serialize};

use super::parse_cart_id;
use crate::AppState;
use crate::authz::{Principal, ensure};
use crate::error::ApiError;

// Fields default to empty so missing values surface as field-level
// validation errors instead of a body rejection.

fn required<'a>(field: &str, value: &'a str) -> Result<&'a str, ApiError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ApiError::BadRequest(format!("{field} is required")));
    }
    Ok(value)
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CustomerRequest {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct AddressRequest {
    pub full_name: String,
    pub line1: String,
    pub line2: Option<String>,
    pub city: String,
    pub district: Option<String>,
    pub postal_code: String,
    pub country: String,
}

impl From<AddressRequest> for Address {
    fn from(req: AddressRequest) -> Self {
        Address {
            full_name: req.full_name,
            line1: req.line1,
            line2: req.line2,
            city: req.city,
            district: req.district,
            postal_code: req.postal_code,
            country: req.country,
        }
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct CheckoutRequest {
    pub cart_id: String,
    pub customer: CustomerRequest,
    pub billing_address: AddressRequest,
    pub shipping_address: AddressRequest,
    pub payment_method: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutResponse {
    pub order_id: String,
    pub order_number: String,
    pub status: String,
    pub grand_total: i64,
    pub fulfillment: FulfillmentReport,
}

/// POST /checkout: Turns the cart into an order.
#[tracing::instrument(skip(state, payload))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    principal: Principal,
    payload: Result<Json<CheckoutRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CheckoutResponse>), ApiError> {
    let Json(req) = payload?;
    let cart_id = parse_cart_id(required("cartId", &req.cart_id)?)?;
    let payment_method = required("paymentMethod", &req.payment_method)?;
    let payment_method = PaymentMethod::parse(payment_method).ok_or_else(|| {
        ApiError::BadRequest(format!("Unknown payment method: {}", req.payment_method))
    })?;

    let cart = state.services.carts.get(cart_id).await?;
    ensure(
        state.policy.can_access_cart(&principal, cart.owner_key()),
        &principal,
    )?;

    let details = CheckoutDetails {
        customer: Customer {
            first_name: req.customer.first_name,
            last_name: req.customer.last_name,
            email: req.customer.email,
            phone: req.customer.phone,
        },
        billing_address: req.billing_address.into(),
        shipping_address: req.shipping_address.into(),
        payment_method,
    };

    let (order, report) = state.services.orders.create_order(cart_id, details).await?;
    if !report.is_clean() {
        tracing::warn!(
            order_id = %order.id(),
            errors = ?report.errors,
            "order created with pending fulfillment steps"
        );
    }

    Ok((
        StatusCode::CREATED,
        Json(CheckoutResponse {
            order_id: order.id().to_string(),
            order_number: order.order_number().to_string(),
            status: order.status().to_string(),
            grand_total: order.totals().grand_total().cents(),
            fulfillment: report,
        }),
    ))
}
