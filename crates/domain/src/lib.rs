//! Domain layer for the marketplace fulfillment system.
//!
//! This crate holds the aggregates and their invariants, free of any I/O:
//! - [`Cart`] with recomputed [`Totals`] under a [`PricingPolicy`]
//! - [`Order`] snapshots and the [`OrderStatus`] state machine
//! - [`SellerOrderView`] projections grouped per seller
//! - [`Product`] stock entries and the clamping decrement rule
//! - [`PaymentRecord`] with the forward-only [`PaymentStatus`] machine
//! - [`FulfillmentJob`] outbox entries

pub mod cart;
pub mod error;
pub mod fulfillment_job;
pub mod order;
pub mod payment;
pub mod pricing;
pub mod product;
pub mod seller_order;

pub use cart::{BundleLine, Cart, CartBundle, CartError, CartItem, CartStatus, OwnerKey};
pub use error::{TransitionError, ValidationError};
pub use fulfillment_job::{FulfillmentJob, JobStatus};
pub use order::{
    Address, CheckoutDetails, Customer, Order, OrderError, OrderLine, OrderStatus, PaymentMethod,
    format_order_number,
};
pub use payment::{PaymentRecord, PaymentStatus};
pub use pricing::{PricingPolicy, Totals};
pub use product::{Product, StockChange};
pub use seller_order::{SellerOrderStatus, SellerOrderView, derived_order_status};
