//! HTTP API server for the marketplace fulfillment system.
//!
//! Exposes carts, checkout, orders, payments and seller order routes over
//! the fulfillment and payment services, with structured logging (tracing)
//! and Prometheus metrics.

pub mod authz;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{delete, get, patch, post};
use fulfillment::FulfillmentServices;
use metrics_exporter_prometheus::PrometheusHandle;
use payment::PaymentGateway;
use store::{
    CartRepository, FulfillmentJobRepository, OrderRepository, PaymentRepository,
    ProductRepository, SellerOrderRepository,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use authz::{AccessPolicy, StaticAccessPolicy};
use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub services: FulfillmentServices,
    pub payments: Arc<PaymentGateway>,
    pub policy: Arc<dyn AccessPolicy>,
    /// `"postgres"` or `"memory"`, reported by `/health`.
    pub store_backend: &'static str,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    use routes::{carts, checkout, health, metrics, orders, payments, sellers};

    let metrics_router = Router::new()
        .route("/metrics", get(metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(health::check))
        .route("/carts", post(carts::create))
        .route("/carts/{id}", get(carts::get))
        .route("/carts/{id}/items", post(carts::add_item).delete(carts::clear))
        .route(
            "/carts/{id}/items/{item_id}",
            patch(carts::update_item).delete(carts::remove_item),
        )
        .route("/carts/{id}/bundles", post(carts::add_bundle))
        .route("/carts/{id}/bundles/{bundle_id}", delete(carts::remove_bundle))
        .route("/carts/{id}/merge", post(carts::merge))
        .route("/admin/carts/abandon", post(carts::abandon_idle))
        .route("/checkout", post(checkout::create))
        .route("/orders/{id}", get(orders::get))
        .route("/orders/{id}/status", patch(orders::transition))
        .route(
            "/orders/{id}/fulfillment",
            post(orders::requeue_fulfillment).get(orders::fulfillment_status),
        )
        .route("/payments", post(payments::create))
        .route("/payments/return", get(payments::handle_return))
        .route("/payments/webhook", post(payments::webhook))
        .route("/sellers/{seller_id}/orders", get(sellers::list))
        .route(
            "/sellers/{seller_id}/orders/{order_id}",
            patch(sellers::update_status),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Wires the services against one store.
pub fn create_default_state<S>(store: S, config: &Config, store_backend: &'static str) -> Arc<AppState>
where
    S: CartRepository
        + ProductRepository
        + OrderRepository
        + SellerOrderRepository
        + PaymentRepository
        + FulfillmentJobRepository
        + Clone
        + 'static,
{
    let services = FulfillmentServices::new(store.clone(), config.fulfillment_settings());
    let payments = Arc::new(PaymentGateway::new(
        config.gateway.clone(),
        Arc::new(store),
        Arc::clone(&services.orders),
    ));
    let policy = Arc::new(StaticAccessPolicy::new(
        config.admin_user_ids.clone(),
        config.approved_seller_ids.clone(),
    ));

    Arc::new(AppState {
        services,
        payments,
        policy,
        store_backend,
    })
}
