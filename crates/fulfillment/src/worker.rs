//! Background loop that retries pending fulfillment jobs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::runner::FulfillmentRunner;

/// Polls pending jobs at a fixed interval until told to stop.
pub struct FulfillmentWorker {
    runner: Arc<FulfillmentRunner>,
    poll_interval: Duration,
    batch_size: usize,
}

impl FulfillmentWorker {
    pub fn new(runner: Arc<FulfillmentRunner>, poll_interval: Duration) -> Self {
        Self {
            runner,
            poll_interval,
            batch_size: 50,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Runs one polling pass. Returns the number of jobs attempted.
    pub async fn tick(&self) -> usize {
        match self.runner.run_pending(self.batch_size).await {
            Ok(ran) => ran,
            Err(e) => {
                tracing::error!(error = %e, "failed to list pending fulfillment jobs");
                0
            }
        }
    }

    /// Polls until `shutdown` flips to true or its sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            batch_size = self.batch_size,
            "fulfillment worker started"
        );
        let mut interval = tokio::time::interval(self.poll_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let ran = self.tick().await;
                    if ran > 0 {
                        tracing::debug!(ran, "fulfillment jobs processed");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::info!("fulfillment worker stopped");
    }
}
