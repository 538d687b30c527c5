//! Outbox entries driving an order's stock and fan-out side effects.

use chrono::{DateTime, Utc};
use common::OrderId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Side effects still outstanding.
    #[default]
    Pending,
    /// Stock and fan-out both applied.
    Done,
    /// Gave up after the maximum number of attempts.
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(JobStatus::Pending),
            "done" => Some(JobStatus::Done),
            "failed" => Some(JobStatus::Failed),
            _ => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Fulfillment job for one order, keyed by order id.
///
/// Written atomically with the order; the stock and fan-out flags let a
/// replay skip what already succeeded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FulfillmentJob {
    pub order_id: OrderId,
    pub status: JobStatus,
    pub stock_applied: bool,
    pub fanout_applied: bool,
    pub attempts: u32,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FulfillmentJob {
    pub fn new(order_id: OrderId, now: DateTime<Utc>) -> Self {
        Self {
            order_id,
            status: JobStatus::Pending,
            stock_applied: false,
            fanout_applied: false,
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.stock_applied && self.fanout_applied
    }

    /// Records the result of one attempt.
    ///
    /// The job becomes `Done` when both side effects are applied and `Failed`
    /// once `max_attempts` is reached with work still outstanding.
    pub fn record_attempt(&mut self, error: Option<String>, max_attempts: u32, now: DateTime<Utc>) {
        self.attempts = self.attempts.saturating_add(1);
        self.last_error = error;
        self.status = if self.is_complete() {
            JobStatus::Done
        } else if self.attempts >= max_attempts {
            JobStatus::Failed
        } else {
            JobStatus::Pending
        };
        self.updated_at = now;
    }

    /// Puts a job back in the queue, e.g. after an operator fixed the cause.
    pub fn requeue(&mut self, now: DateTime<Utc>) {
        if self.status == JobStatus::Failed {
            self.status = JobStatus::Pending;
            self.attempts = 0;
            self.updated_at = now;
        }
    }
}
