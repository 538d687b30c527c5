//! Drives an order's side effects (cart conversion, stock, seller fan-out)
//! to completion and records progress on its fulfillment job.

use std::sync::Arc;

use chrono::Utc;
use common::{OrderId, ProductId};
use domain::{CartStatus, FulfillmentJob, JobStatus, Order, StockChange};
use serde::Serialize;
use store::{CartRepository, FulfillmentJobRepository, OrderRepository};

use crate::error::{FulfillmentError, Result};
use crate::fanout::SellerFanout;
use crate::stock::StockLedger;

/// What happened to an order's side effects during one run.
///
/// Failures are listed in `errors` instead of being returned: the order is
/// already durable and the job will retry whatever did not succeed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentReport {
    pub order_id: OrderId,
    pub cart_converted: bool,
    pub stock_changes: Vec<StockChange>,
    pub seller_views_written: usize,
    pub job_status: JobStatus,
    pub errors: Vec<String>,
}

impl FulfillmentReport {
    fn new(order_id: OrderId) -> Self {
        Self {
            order_id,
            ..Default::default()
        }
    }

    /// Returns true if every side effect succeeded.
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Products this run sold beyond their stock.
    pub fn oversold(&self) -> Vec<&ProductId> {
        self.stock_changes
            .iter()
            .filter(|c| c.oversold)
            .map(|c| &c.product_id)
            .collect()
    }
}

pub struct FulfillmentRunner {
    orders: Arc<dyn OrderRepository>,
    carts: Arc<dyn CartRepository>,
    jobs: Arc<dyn FulfillmentJobRepository>,
    ledger: StockLedger,
    fanout: SellerFanout,
    max_attempts: u32,
}

impl FulfillmentRunner {
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        carts: Arc<dyn CartRepository>,
        jobs: Arc<dyn FulfillmentJobRepository>,
        ledger: StockLedger,
        fanout: SellerFanout,
        max_attempts: u32,
    ) -> Self {
        Self {
            orders,
            carts,
            jobs,
            ledger,
            fanout,
            max_attempts: max_attempts.max(1),
        }
    }

    /// Applies whatever side effects are still outstanding for `order`.
    ///
    /// Every step is idempotent, so running this again after a partial
    /// failure never converts, decrements or projects twice.
    #[tracing::instrument(skip(self, order), fields(order_id = %order.id()))]
    pub async fn apply(&self, order: &Order) -> FulfillmentReport {
        let mut report = FulfillmentReport::new(order.id());
        let now = Utc::now();

        let mut job = match self.jobs.get_job(order.id()).await {
            Ok(Some(job)) => job,
            Ok(None) => FulfillmentJob::new(order.id(), now),
            Err(e) => {
                self.fail(&mut report, "load job", e.into());
                return report;
            }
        };
        if job.status == JobStatus::Done {
            report.cart_converted = true;
            report.job_status = JobStatus::Done;
            return report;
        }

        match self.convert_cart(order).await {
            Ok(converted) => report.cart_converted = converted,
            Err(e) => self.fail(&mut report, "convert cart", e),
        }

        if !job.stock_applied {
            let mut all_applied = true;
            for (product_id, quantity) in order.quantities_by_product() {
                match self
                    .ledger
                    .decrement_for_order(order.id(), &product_id, quantity)
                    .await
                {
                    Ok(Some(change)) => report.stock_changes.push(change),
                    Ok(None) => {}
                    Err(e) => {
                        all_applied = false;
                        self.fail(&mut report, "decrement stock", e);
                    }
                }
            }
            job.stock_applied = all_applied;
        }

        if !job.fanout_applied {
            match self.fanout.project(order).await {
                Ok(written) => {
                    report.seller_views_written = written;
                    job.fanout_applied = true;
                }
                Err(e) => self.fail(&mut report, "seller fan-out", e),
            }
        }

        let last_error = (!report.errors.is_empty()).then(|| report.errors.join("; "));
        job.record_attempt(last_error, self.max_attempts, Utc::now());
        report.job_status = job.status;

        if let Err(e) = self.jobs.save_job(&job).await {
            self.fail(&mut report, "save job", e.into());
        }
        if job.status == JobStatus::Failed {
            tracing::error!(attempts = job.attempts, "fulfillment job gave up");
        }
        report
    }

    /// Loads the order and applies its outstanding side effects.
    pub async fn run_job(&self, order_id: OrderId) -> Result<FulfillmentReport> {
        let order = self
            .orders
            .get_order(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;
        Ok(self.apply(&order).await)
    }

    /// Runs up to `limit` pending jobs, oldest first. Returns how many ran.
    #[tracing::instrument(skip(self))]
    pub async fn run_pending(&self, limit: usize) -> Result<usize> {
        let jobs = self.jobs.list_pending_jobs(limit).await?;
        let mut ran = 0;
        for job in jobs {
            match self.run_job(job.order_id).await {
                Ok(report) if !report.is_clean() => {
                    tracing::warn!(order_id = %job.order_id, errors = ?report.errors, "fulfillment retry incomplete");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::error!(order_id = %job.order_id, error = %e, "fulfillment job could not run");
                }
            }
            ran += 1;
        }
        Ok(ran)
    }

    /// Puts an order's job back in the queue. A finished job stays finished.
    #[tracing::instrument(skip(self))]
    pub async fn requeue(&self, order_id: OrderId) -> Result<FulfillmentJob> {
        if self.orders.get_order(order_id).await?.is_none() {
            return Err(FulfillmentError::OrderNotFound(order_id));
        }

        let now = Utc::now();
        let mut job = self
            .jobs
            .get_job(order_id)
            .await?
            .unwrap_or_else(|| FulfillmentJob::new(order_id, now));
        job.requeue(now);
        self.jobs.save_job(&job).await?;

        tracing::info!(status = %job.status, "fulfillment job requeued");
        Ok(job)
    }

    pub async fn job(&self, order_id: OrderId) -> Result<Option<FulfillmentJob>> {
        Ok(self.jobs.get_job(order_id).await?)
    }

    /// Marks the source cart converted. Returns true once the cart is
    /// converted, whether by this call or an earlier one.
    async fn convert_cart(&self, order: &Order) -> Result<bool> {
        let Some(mut cart) = self.carts.get_cart(order.cart_id()).await? else {
            tracing::warn!(cart_id = %order.cart_id(), "source cart missing");
            return Ok(false);
        };
        match cart.status() {
            CartStatus::Converted => Ok(true),
            CartStatus::Active => {
                cart.mark_converted(Utc::now())?;
                if self.carts.save_cart(&cart).await? {
                    return Ok(true);
                }
                // Closed concurrently; converted only if another run did it.
                let current = self.carts.get_cart(order.cart_id()).await?;
                let converted = current.is_some_and(|c| c.status() == CartStatus::Converted);
                if !converted {
                    tracing::warn!(cart_id = %cart.id(), "source cart closed before conversion");
                }
                Ok(converted)
            }
            other => {
                tracing::warn!(cart_id = %cart.id(), status = %other, "source cart not active");
                Ok(false)
            }
        }
    }

    fn fail(&self, report: &mut FulfillmentReport, step: &'static str, err: FulfillmentError) {
        metrics::counter!("fulfillment_failures_total", "step" => step).increment(1);
        tracing::error!(order_id = %report.order_id, step, error = %err, "fulfillment step failed");
        report.errors.push(format!("{step}: {err}"));
    }
}
