//! Order status state machine.

use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

/// The status of an order in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──┬──────────────────────► Confirmed ──► Processing ──► Shipped ──► Delivered
///           └──► PaymentPending ──┬──►    ▲
///                                 │       │
///                                 └──► PaymentFailed
///
/// any non-final state ──► Cancelled ──► Refunded
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order persisted, nothing else happened yet.
    #[default]
    Pending,

    /// A payment request was issued and is awaiting the gateway.
    PaymentPending,

    /// Payment was declined (terminal).
    PaymentFailed,

    /// Payment captured or not required; ready for fulfillment.
    Confirmed,

    /// Sellers are preparing the order.
    Processing,

    /// All seller parcels are on their way.
    Shipped,

    /// Delivered to the customer (terminal).
    Delivered,

    /// Order was cancelled.
    Cancelled,

    /// Cancelled order whose payment was returned (terminal).
    Refunded,
}

impl OrderStatus {
    /// Returns true if no forward transition is possible any more.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::PaymentFailed | OrderStatus::Refunded
        )
    }

    /// Returns true if the order can still be cancelled.
    pub fn can_cancel(&self) -> bool {
        !self.is_terminal() && *self != OrderStatus::Cancelled
    }

    /// Returns true if `next` is a permitted successor of this status.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        if next == Cancelled {
            return self.can_cancel();
        }

        matches!(
            (self, next),
            (Pending, PaymentPending)
                | (Pending, Confirmed)
                | (PaymentPending, Confirmed)
                | (PaymentPending, PaymentFailed)
                | (Confirmed, Processing)
                | (Processing, Shipped)
                | (Shipped, Delivered)
                | (Cancelled, Refunded)
        )
    }

    /// Validates a transition.
    pub fn transition(&self, next: OrderStatus) -> Result<OrderStatus, TransitionError> {
        if self.can_transition_to(next) {
            Ok(next)
        } else {
            Err(TransitionError::new("order", self, next))
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::PaymentPending => "payment_pending",
            OrderStatus::PaymentFailed => "payment_failed",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }

    /// Parses the wire/storage representation.
    pub fn parse(s: &str) -> Option<Self> {
        [
            OrderStatus::Pending,
            OrderStatus::PaymentPending,
            OrderStatus::PaymentFailed,
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
            OrderStatus::Cancelled,
            OrderStatus::Refunded,
        ]
        .into_iter()
        .find(|status| status.as_str() == s)
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
