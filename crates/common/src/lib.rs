//! Shared identifiers and value types used across the fulfillment workspace.

mod money;
mod types;

pub use money::Money;
pub use types::{CartId, ItemId, OrderId, PaymentId, ProductId, SellerId};
