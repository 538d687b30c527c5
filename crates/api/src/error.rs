//! API error types with HTTP response mapping.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{CartError, OrderError};
use fulfillment::FulfillmentError;
use payment::PaymentError;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// No principal on a route that needs one.
    Unauthorized,
    /// The principal may not act on this resource.
    Forbidden,
    /// The resource is not in a state that allows the request.
    Conflict(String),
    /// Fulfillment service error.
    Fulfillment(FulfillmentError),
    /// Payment adapter error.
    Payment(PaymentError),
    /// Internal server error. The message is logged, never returned.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "authentication required".into()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "forbidden".into()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Fulfillment(err) => fulfillment_error_to_response(err),
            ApiError::Payment(err) => payment_error_to_response(err),
            ApiError::Internal(msg) => internal(msg),
        };

        let body = serde_json::json!({ "error": message });
        (status, axum::Json(body)).into_response()
    }
}

fn internal(detail: impl std::fmt::Display) -> (StatusCode, String) {
    tracing::error!(error = %detail, "internal server error");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "internal server error".to_string(),
    )
}

fn store_error_to_response(err: StoreError) -> (StatusCode, String) {
    match &err {
        StoreError::ConcurrencyConflict { .. } | StoreError::AlreadyExists { .. } => {
            (StatusCode::CONFLICT, err.to_string())
        }
        StoreError::NotFound { .. } => (StatusCode::NOT_FOUND, err.to_string()),
        _ => internal(err),
    }
}

fn fulfillment_error_to_response(err: FulfillmentError) -> (StatusCode, String) {
    let err = match err {
        FulfillmentError::Store(store_err) => return store_error_to_response(store_err),
        other => other,
    };

    let status = match &err {
        FulfillmentError::CartNotFound(_)
        | FulfillmentError::ProductNotFound(_)
        | FulfillmentError::OrderNotFound(_)
        | FulfillmentError::SellerOrderNotFound { .. } => StatusCode::NOT_FOUND,
        FulfillmentError::Contention(_) | FulfillmentError::Transition(_) => StatusCode::CONFLICT,
        FulfillmentError::Cart(cart_err) => match cart_err {
            CartError::InvalidQuantity { .. } | CartError::InvalidBundle { .. } => {
                StatusCode::BAD_REQUEST
            }
            CartError::ItemNotFound { .. } | CartError::BundleNotFound { .. } => {
                StatusCode::NOT_FOUND
            }
            CartError::NotActive { .. }
            | CartError::ProductUnavailable { .. }
            | CartError::OutOfStock { .. } => StatusCode::CONFLICT,
        },
        FulfillmentError::Order(order_err) => match order_err {
            OrderError::EmptyCart { .. } | OrderError::Validation(_) => StatusCode::BAD_REQUEST,
            OrderError::CartNotActive { .. } | OrderError::InvalidTransition(_) => {
                StatusCode::CONFLICT
            }
        },
        FulfillmentError::Store(_) => return internal(&err),
    };
    (status, err.to_string())
}

fn payment_error_to_response(err: PaymentError) -> (StatusCode, String) {
    match err {
        PaymentError::OrderNotFound(_) | PaymentError::PaymentNotFound(_) => {
            (StatusCode::NOT_FOUND, err.to_string())
        }
        PaymentError::MissingOrderId
        | PaymentError::InvalidOrderId(_)
        | PaymentError::MissingField(_)
        | PaymentError::UnknownStatus(_)
        | PaymentError::SignatureMismatch
        | PaymentError::NonceReused
        | PaymentError::AmountMismatch { .. } => (StatusCode::BAD_REQUEST, err.to_string()),
        PaymentError::NotPayable { .. }
        | PaymentError::Transition(_)
        | PaymentError::Contention(_) => (StatusCode::CONFLICT, err.to_string()),
        PaymentError::GatewayNotConfigured => {
            tracing::error!("payment gateway credentials are not configured");
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
        PaymentError::Fulfillment(inner) => fulfillment_error_to_response(inner),
        PaymentError::Store(inner) => store_error_to_response(inner),
        PaymentError::Serialization(inner) => internal(inner),
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<FulfillmentError> for ApiError {
    fn from(err: FulfillmentError) -> Self {
        ApiError::Fulfillment(err)
    }
}

impl From<PaymentError> for ApiError {
    fn from(err: PaymentError) -> Self {
        ApiError::Payment(err)
    }
}
