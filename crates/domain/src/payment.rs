//! Payment records and the payment status machine.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use common::{Money, OrderId, PaymentId};
use serde::{Deserialize, Serialize};

use crate::error::TransitionError;

/// Status of a payment attempt.
///
/// ```text
/// Pending ──► Processing ──┬──► Completed ──► Refunded
///    │                     ├──► Failed
///    └─────────────────────┴──► Cancelled
/// ```
///
/// Forward-only: once terminal, a payment never goes back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
    Cancelled,
    Refunded,
}

impl PaymentStatus {
    /// Returns true once the gateway has settled the payment one way or another.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            PaymentStatus::Completed
                | PaymentStatus::Failed
                | PaymentStatus::Cancelled
                | PaymentStatus::Refunded
        )
    }

    pub fn can_transition_to(&self, next: PaymentStatus) -> bool {
        use PaymentStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Pending, Completed)
                | (Pending, Failed)
                | (Pending, Cancelled)
                | (Processing, Completed)
                | (Processing, Failed)
                | (Processing, Cancelled)
                | (Completed, Refunded)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Processing => "processing",
            PaymentStatus::Completed => "completed",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Cancelled => "cancelled",
            PaymentStatus::Refunded => "refunded",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(PaymentStatus::Pending),
            "processing" => Some(PaymentStatus::Processing),
            "completed" => Some(PaymentStatus::Completed),
            "failed" => Some(PaymentStatus::Failed),
            "cancelled" => Some(PaymentStatus::Cancelled),
            "refunded" => Some(PaymentStatus::Refunded),
            _ => None,
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One payment attempt for an order; at most one per order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRecord {
    pub id: PaymentId,
    pub order_id: OrderId,
    status: PaymentStatus,
    pub amount: Money,
    pub currency: String,
    pub nonce: String,
    pub signature: String,
    /// Gateway endpoint the browser is sent to.
    pub redirect_url: String,
    /// The signed field set posted to the gateway.
    pub form: BTreeMap<String, String>,
    /// Payment id assigned by the provider, once known.
    pub provider_payment_id: Option<String>,
    /// Last verified webhook body.
    pub webhook_payload: Option<BTreeMap<String, String>>,
    /// Optimistic concurrency counter, bumped on every save.
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PaymentRecord {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        order_id: OrderId,
        amount: Money,
        currency: impl Into<String>,
        nonce: impl Into<String>,
        signature: impl Into<String>,
        redirect_url: impl Into<String>,
        form: BTreeMap<String, String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PaymentId::new(),
            order_id,
            status: PaymentStatus::Pending,
            amount,
            currency: currency.into(),
            nonce: nonce.into(),
            signature: signature.into(),
            redirect_url: redirect_url.into(),
            form,
            provider_payment_id: None,
            webhook_payload: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn status(&self) -> PaymentStatus {
        self.status
    }

    /// Strict transition used by administrative operations such as refunds.
    pub fn transition(
        &mut self,
        next: PaymentStatus,
        now: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError::new("payment", self.status, next));
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Applies an outcome reported by the gateway.
    ///
    /// Returns `false` when the outcome is a duplicate or arrives out of
    /// order (the record is terminal already, or the outcome would move it
    /// backwards); the record is left unchanged in that case.
    pub fn apply_gateway_outcome(
        &mut self,
        outcome: PaymentStatus,
        provider_payment_id: Option<String>,
        payload: Option<BTreeMap<String, String>>,
        now: DateTime<Utc>,
    ) -> bool {
        if self.status.is_terminal() || !self.status.can_transition_to(outcome) {
            return false;
        }

        self.status = outcome;
        if provider_payment_id.is_some() {
            self.provider_payment_id = provider_payment_id;
        }
        if payload.is_some() {
            self.webhook_payload = payload;
        }
        self.updated_at = now;
        true
    }
}
