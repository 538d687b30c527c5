//! Persistence for the fulfillment system.
//!
//! One repository trait per aggregate, each implemented by
//! [`InMemoryStore`] (tests, single-process deployments) and
//! [`PostgresStore`].

pub mod error;
pub mod memory;
pub mod postgres;
pub mod repository;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use repository::{
    CartRepository, FulfillmentJobRepository, OrderRepository, PaymentRepository,
    ProductRepository, SellerOrderRepository,
};
