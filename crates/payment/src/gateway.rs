//! Payment creation, gateway callbacks and the browser return leg.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::OrderId;
use domain::{Order, OrderStatus, PaymentRecord, PaymentStatus};
use fulfillment::OrderManager;
use serde::Serialize;
use store::{PaymentRepository, StoreError};

use crate::config::GatewayConfig;
use crate::error::{PaymentError, Result};
use crate::signing;

const MAX_SAVE_ATTEMPTS: usize = 3;

/// What the client needs to send the browser to the gateway.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub payment_id: common::PaymentId,
    pub redirect_url: String,
    pub form: BTreeMap<String, String>,
    pub status: PaymentStatus,
}

impl From<&PaymentRecord> for PaymentRequest {
    fn from(record: &PaymentRecord) -> Self {
        Self {
            payment_id: record.id,
            redirect_url: record.redirect_url.clone(),
            form: record.form.clone(),
            status: record.status(),
        }
    }
}

/// Result of a verified gateway callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    /// The payment moved to the given status.
    Applied(PaymentStatus),
    /// Nothing changed; the payment stays in the given status.
    Duplicate(PaymentStatus),
}

impl WebhookOutcome {
    pub fn status(&self) -> PaymentStatus {
        match self {
            WebhookOutcome::Applied(s) | WebhookOutcome::Duplicate(s) => *s,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied(_) => "applied",
            WebhookOutcome::Duplicate(_) => "duplicate",
        }
    }
}

/// Parameters the gateway appends to the browser return URL.
#[derive(Debug, Clone, Default)]
pub struct ReturnParams {
    pub order_id: Option<String>,
    pub status: Option<String>,
    pub payment_id: Option<String>,
}

/// Talks to the hosted payment page on behalf of orders.
pub struct PaymentGateway {
    config: GatewayConfig,
    payments: Arc<dyn PaymentRepository>,
    orders: Arc<OrderManager>,
}

impl PaymentGateway {
    pub fn new(
        config: GatewayConfig,
        payments: Arc<dyn PaymentRepository>,
        orders: Arc<OrderManager>,
    ) -> Self {
        Self {
            config,
            payments,
            orders,
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub async fn payment_for_order(&self, order_id: OrderId) -> Result<Option<PaymentRecord>> {
        Ok(self.payments.find_payment_by_order(order_id).await?)
    }

    /// Issues a signed payment request for an order.
    ///
    /// At most one payment record exists per order. If one is already
    /// stored, whatever its status, it is returned unchanged. Otherwise the
    /// order must be a card order that is still `pending` or
    /// `payment_failed`.
    #[tracing::instrument(skip(self))]
    pub async fn create_payment(&self, order_id: OrderId) -> Result<PaymentRequest> {
        let order = self.orders.get(order_id).await?;

        if let Some(existing) = self.payments.find_payment_by_order(order_id).await? {
            tracing::debug!(payment_id = %existing.id, status = %existing.status(), "payment already exists");
            return Ok(PaymentRequest::from(&existing));
        }

        ensure_payable(&order)?;
        let credentials = self
            .config
            .credentials()
            .ok_or(PaymentError::GatewayNotConfigured)?;

        let now = Utc::now();
        let amount = order.totals().grand_total();
        let amount_str = amount.to_decimal_string();
        let order_ref = order_id.to_string();
        let nonce = signing::generate_nonce();
        let signature = signing::sign(
            credentials.secret_key,
            &nonce,
            &order_ref,
            &amount_str,
            &self.config.currency,
        );

        let mut form = self.form_fields(&order)?;
        form.insert("merchant_id".into(), credentials.merchant_id.to_string());
        form.insert("platform_order_id".into(), order_ref);
        form.insert("amount".into(), amount_str);
        form.insert("currency".into(), self.config.currency.clone());
        form.insert("nonce".into(), nonce.clone());
        form.insert("signature".into(), signature.clone());

        let record = PaymentRecord::new(
            order_id,
            amount,
            self.config.currency.clone(),
            nonce,
            signature,
            credentials.gateway_url,
            form,
            now,
        );

        let record = match self.payments.insert_payment(&record).await {
            Ok(()) => record,
            Err(StoreError::AlreadyExists { .. }) => {
                // Lost a race with a concurrent request for the same order.
                self.payments
                    .find_payment_by_order(order_id)
                    .await?
                    .ok_or(PaymentError::PaymentNotFound(order_id))?
            }
            Err(e) => return Err(e.into()),
        };

        self.orders
            .update(order_id, |order| {
                if order.status() != OrderStatus::Pending {
                    return Ok(false);
                }
                order.transition(OrderStatus::PaymentPending, Utc::now())?;
                Ok(true)
            })
            .await?;

        metrics::counter!("payments_created_total").increment(1);
        tracing::info!(payment_id = %record.id, amount = %record.amount, "payment request created");
        Ok(PaymentRequest::from(&record))
    }

    fn form_fields(&self, order: &Order) -> Result<BTreeMap<String, String>> {
        let customer = order.customer();
        let items: Vec<serde_json::Value> = order
            .lines()
            .iter()
            .map(|line| {
                serde_json::json!({
                    "id": line.product_id,
                    "name": line.product_name,
                    "quantity": line.quantity,
                    "unit_price": line.unit_price.to_decimal_string(),
                })
            })
            .collect();

        let mut form = BTreeMap::new();
        form.insert("order_number".into(), order.order_number().to_string());
        form.insert("customer_name".into(), customer.full_name());
        form.insert("customer_email".into(), customer.email.trim().to_string());
        form.insert("customer_phone".into(), customer.phone.trim().to_string());
        form.insert("billing_address".into(), order.billing_address().one_line());
        form.insert("shipping_address".into(), order.shipping_address().one_line());
        form.insert("items".into(), serde_json::to_string(&items)?);
        for (key, url) in [
            ("success_url", &self.config.success_url),
            ("failure_url", &self.config.failure_url),
            ("callback_url", &self.config.callback_url),
        ] {
            if let Some(url) = url {
                form.insert(key.into(), url.clone());
            }
        }
        Ok(form)
    }

    /// Verifies and applies a server-to-server gateway callback.
    ///
    /// The callback signature covers `nonce`, `platform_order_id`,
    /// `status`, `payment_id`, `amount` and `currency`. Nothing is written
    /// unless it verifies, its nonce differs from the request's, and the
    /// signed amount matches the stored request.
    #[tracing::instrument(skip(self, payload))]
    pub async fn verify_payment(
        &self,
        payload: &BTreeMap<String, String>,
    ) -> Result<WebhookOutcome> {
        let result = self.verify_payment_inner(payload).await;
        let label = match &result {
            Ok(outcome) => outcome.label(),
            Err(_) => "rejected",
        };
        metrics::counter!("payment_webhooks_total", "outcome" => label).increment(1);
        result
    }

    async fn verify_payment_inner(
        &self,
        payload: &BTreeMap<String, String>,
    ) -> Result<WebhookOutcome> {
        let raw_order_id = field(payload, "platform_order_id").ok_or(PaymentError::MissingOrderId)?;
        let order_id = OrderId::parse(raw_order_id)
            .map_err(|_| PaymentError::InvalidOrderId(raw_order_id.to_string()))?;

        let nonce = field(payload, "nonce").ok_or(PaymentError::MissingField("nonce"))?;
        let amount = field(payload, "amount").ok_or(PaymentError::MissingField("amount"))?;
        let currency = field(payload, "currency").ok_or(PaymentError::MissingField("currency"))?;
        let signature =
            field(payload, "signature").ok_or(PaymentError::MissingField("signature"))?;

        let raw_status = field(payload, "status").ok_or(PaymentError::MissingField("status"))?;
        let provider_payment_id = field(payload, "payment_id");

        let credentials = self
            .config
            .credentials()
            .ok_or(PaymentError::GatewayNotConfigured)?;
        let signed = signing::CallbackFields {
            nonce,
            order_id: raw_order_id,
            status: raw_status,
            payment_id: provider_payment_id.unwrap_or_default(),
            amount,
            currency,
        };
        if !signing::verify_callback(credentials.secret_key, &signed, signature) {
            tracing::warn!(%order_id, "payment callback signature mismatch");
            return Err(PaymentError::SignatureMismatch);
        }

        let outcome = parse_gateway_status(raw_status)
            .ok_or_else(|| PaymentError::UnknownStatus(raw_status.to_string()))?;
        let provider_payment_id = provider_payment_id.map(str::to_string);

        let (record, applied) = self
            .apply_outcome(order_id, outcome, provider_payment_id, Some(payload.clone()), |record| {
                if record.nonce == nonce {
                    tracing::warn!(%order_id, "payment callback replays the request nonce");
                    return Err(PaymentError::NonceReused);
                }
                if record.amount.to_decimal_string() != amount || record.currency != currency {
                    return Err(PaymentError::AmountMismatch {
                        amount: amount.to_string(),
                        currency: currency.to_string(),
                    });
                }
                Ok(())
            })
            .await?;

        // Runs for duplicates too, so an order left behind by an earlier
        // partial callback catches up with its payment.
        self.sync_order(order_id, record.status()).await?;

        if applied {
            tracing::info!(%order_id, status = %record.status(), "payment callback applied");
            Ok(WebhookOutcome::Applied(record.status()))
        } else {
            tracing::info!(%order_id, status = %record.status(), "duplicate payment callback ignored");
            Ok(WebhookOutcome::Duplicate(record.status()))
        }
    }

    /// Handles the browser coming back from the gateway and returns where to
    /// send it next.
    ///
    /// The return leg is unsigned, so a success only moves the payment to
    /// `processing`; the signed callback settles it.
    #[tracing::instrument(skip(self))]
    pub async fn handle_return(&self, params: &ReturnParams) -> String {
        let success = params
            .status
            .as_deref()
            .and_then(parse_gateway_status)
            .is_some_and(|s| matches!(s, PaymentStatus::Completed | PaymentStatus::Processing));
        let order_id = params.order_id.as_deref().and_then(|id| OrderId::parse(id).ok());

        if success && let Some(order_id) = order_id {
            if let Err(e) = self.mark_processing(order_id, params.payment_id.clone()).await {
                tracing::warn!(%order_id, error = %e, "could not record payment return");
            }
        }

        let base = if success {
            self.config.success_url()
        } else {
            self.config.failure_url()
        };
        match order_id {
            Some(order_id) => with_query(base, "orderId", &order_id.to_string()),
            None => base.to_string(),
        }
    }

    async fn mark_processing(&self, order_id: OrderId, provider_payment_id: Option<String>) -> Result<()> {
        let (record, applied) = self
            .apply_outcome(order_id, PaymentStatus::Processing, provider_payment_id, None, |_| Ok(()))
            .await?;
        if applied {
            self.sync_order(order_id, record.status()).await?;
        }
        Ok(())
    }

    /// Applies a gateway outcome to the order's payment record with
    /// optimistic retries. Returns the stored record and whether it changed.
    async fn apply_outcome<C>(
        &self,
        order_id: OrderId,
        outcome: PaymentStatus,
        provider_payment_id: Option<String>,
        payload: Option<BTreeMap<String, String>>,
        check: C,
    ) -> Result<(PaymentRecord, bool)>
    where
        C: Fn(&PaymentRecord) -> Result<()>,
    {
        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            let mut record = self
                .payments
                .find_payment_by_order(order_id)
                .await?
                .ok_or(PaymentError::PaymentNotFound(order_id))?;
            check(&record)?;

            let expected = record.version;
            if !record.apply_gateway_outcome(
                outcome,
                provider_payment_id.clone(),
                payload.clone(),
                Utc::now(),
            ) {
                return Ok((record, false));
            }

            match self.payments.save_payment(&record, expected).await {
                Ok(version) => {
                    record.version = version;
                    return Ok((record, true));
                }
                Err(e) if e.is_conflict() => {
                    tracing::debug!(%order_id, attempt, "payment version conflict, reloading");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(PaymentError::Contention(order_id))
    }

    /// Refunds a cancelled order. A completed payment record follows it to
    /// `refunded`; any other payment record is left as it is.
    #[tracing::instrument(skip(self))]
    pub async fn refund(&self, order_id: OrderId) -> Result<Order> {
        let order = self.orders.transition(order_id, OrderStatus::Refunded).await?;

        for attempt in 1..=MAX_SAVE_ATTEMPTS {
            let Some(mut record) = self.payments.find_payment_by_order(order_id).await? else {
                return Ok(order);
            };
            if record.status() != PaymentStatus::Completed {
                return Ok(order);
            }

            let expected = record.version;
            record.transition(PaymentStatus::Refunded, Utc::now())?;
            match self.payments.save_payment(&record, expected).await {
                Ok(_) => {
                    tracing::info!(%order_id, payment_id = %record.id, "payment refunded");
                    return Ok(order);
                }
                Err(e) if e.is_conflict() => {
                    tracing::debug!(%order_id, attempt, "payment version conflict, reloading");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(PaymentError::Contention(order_id))
    }

    async fn sync_order(&self, order_id: OrderId, status: PaymentStatus) -> Result<Order> {
        let order = self
            .orders
            .update(order_id, |order| Ok(follow_payment(order, status, Utc::now())?))
            .await?;
        Ok(order)
    }
}

fn ensure_payable(order: &Order) -> Result<()> {
    let reason = if !order.payment_method().uses_gateway() {
        format!("payment method is {}", order.payment_method().as_str())
    } else if !matches!(
        order.status(),
        OrderStatus::Pending | OrderStatus::PaymentFailed
    ) {
        format!("order is {}", order.status())
    } else {
        return Ok(());
    };
    Err(PaymentError::NotPayable {
        order_id: order.id(),
        reason,
    })
}

/// Moves the order along with its payment. Returns whether anything changed.
fn follow_payment(
    order: &mut Order,
    status: PaymentStatus,
    now: DateTime<Utc>,
) -> std::result::Result<bool, domain::OrderError> {
    let mut changed = order.record_payment_status(status, now);

    let target = match status {
        PaymentStatus::Completed => OrderStatus::Confirmed,
        PaymentStatus::Failed | PaymentStatus::Cancelled => OrderStatus::PaymentFailed,
        _ => return Ok(changed),
    };
    if order.status() == OrderStatus::Pending && target == OrderStatus::PaymentFailed {
        order.transition(OrderStatus::PaymentPending, now)?;
        changed = true;
    }
    if order.status() == target {
        return Ok(changed);
    }
    if order.status().can_transition_to(target) {
        order.transition(target, now)?;
        changed = true;
    } else {
        tracing::warn!(
            order_id = %order.id(),
            order_status = %order.status(),
            payment_status = %status,
            "order cannot follow payment outcome"
        );
    }
    Ok(changed)
}

fn field<'a>(payload: &'a BTreeMap<String, String>, key: &str) -> Option<&'a str> {
    payload.get(key).map(|v| v.trim()).filter(|v| !v.is_empty())
}

/// Maps the gateway's status vocabulary onto [`PaymentStatus`].
fn parse_gateway_status(raw: &str) -> Option<PaymentStatus> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "success" | "succeeded" | "completed" | "paid" => Some(PaymentStatus::Completed),
        "failed" | "failure" | "declined" | "error" => Some(PaymentStatus::Failed),
        "cancelled" | "canceled" => Some(PaymentStatus::Cancelled),
        "processing" | "pending" => Some(PaymentStatus::Processing),
        _ => None,
    }
}

fn with_query(base: &str, key: &str, value: &str) -> String {
    let sep = if base.contains('?') { '&' } else { '?' };
    format!("{base}{sep}{key}={value}")
}
