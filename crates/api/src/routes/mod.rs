//! HTTP handlers, one module per resource.

pub mod carts;
pub mod checkout;
pub mod health;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod sellers;

use common::{CartId, ItemId, OrderId};

use crate::error::ApiError;

fn parse_cart_id(id: &str) -> Result<CartId, ApiError> {
    CartId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid cart id: {e}")))
}

fn parse_item_id(id: &str) -> Result<ItemId, ApiError> {
    ItemId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid item id: {e}")))
}

fn parse_order_id(id: &str) -> Result<OrderId, ApiError> {
    OrderId::parse(id).map_err(|e| ApiError::BadRequest(format!("Invalid order id: {e}")))
}
