//! Application configuration loaded from environment variables.

use std::collections::HashSet;
use std::str::FromStr;
use std::time::Duration;

use chrono::{FixedOffset, Offset, Utc};
use common::Money;
use domain::PricingPolicy;
use fulfillment::FulfillmentSettings;
use payment::GatewayConfig;

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`, `PORT`: bind address (default `0.0.0.0:3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json`
/// - `DATABASE_URL`: PostgreSQL connection string; unset selects the in-memory store
/// - `FREE_SHIPPING_THRESHOLD_CENTS`, `FLAT_SHIPPING_FEE_CENTS`, `TAX_RATE_BPS`
/// - `ORDER_NUMBER_UTC_OFFSET_MINUTES`: local day used for order numbers
/// - `PAYMENT_GATEWAY_URL`, `PAYMENT_MERCHANT_ID`, `PAYMENT_SECRET_KEY`,
///   `PAYMENT_CURRENCY`, `PAYMENT_SUCCESS_URL`, `PAYMENT_FAILURE_URL`,
///   `PAYMENT_CALLBACK_URL`
/// - `FULFILLMENT_POLL_INTERVAL_MS`, `FULFILLMENT_MAX_ATTEMPTS`
/// - `ADMIN_USER_IDS`, `APPROVED_SELLER_IDS`: comma-separated
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub pricing: PricingPolicy,
    pub order_number_utc_offset_minutes: i32,
    pub gateway: GatewayConfig,
    pub fulfillment_poll_interval: Duration,
    pub fulfillment_max_attempts: u32,
    pub admin_user_ids: HashSet<String>,
    pub approved_seller_ids: HashSet<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from an arbitrary key lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parsed(&get, "PORT").unwrap_or(defaults.port),
            log_level: get("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match get("LOG_FORMAT").as_deref() {
                Some("json") => LogFormat::Json,
                _ => LogFormat::Text,
            },
            database_url: get("DATABASE_URL"),
            pricing: PricingPolicy {
                free_shipping_threshold: parsed(&get, "FREE_SHIPPING_THRESHOLD_CENTS")
                    .map(Money::from_cents)
                    .unwrap_or(defaults.pricing.free_shipping_threshold),
                flat_shipping_fee: parsed(&get, "FLAT_SHIPPING_FEE_CENTS")
                    .map(Money::from_cents)
                    .unwrap_or(defaults.pricing.flat_shipping_fee),
                tax_rate_bps: parsed(&get, "TAX_RATE_BPS").unwrap_or(defaults.pricing.tax_rate_bps),
            },
            order_number_utc_offset_minutes: parsed(&get, "ORDER_NUMBER_UTC_OFFSET_MINUTES")
                .unwrap_or(defaults.order_number_utc_offset_minutes),
            gateway: GatewayConfig {
                gateway_url: get("PAYMENT_GATEWAY_URL"),
                merchant_id: get("PAYMENT_MERCHANT_ID"),
                secret_key: get("PAYMENT_SECRET_KEY"),
                currency: get("PAYMENT_CURRENCY").unwrap_or(defaults.gateway.currency),
                success_url: get("PAYMENT_SUCCESS_URL"),
                failure_url: get("PAYMENT_FAILURE_URL"),
                callback_url: get("PAYMENT_CALLBACK_URL"),
            },
            fulfillment_poll_interval: parsed(&get, "FULFILLMENT_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.fulfillment_poll_interval),
            fulfillment_max_attempts: parsed(&get, "FULFILLMENT_MAX_ATTEMPTS")
                .unwrap_or(defaults.fulfillment_max_attempts),
            admin_user_ids: get("ADMIN_USER_IDS").map(|v| id_list(&v)).unwrap_or_default(),
            approved_seller_ids: get("APPROVED_SELLER_IDS")
                .map(|v| id_list(&v))
                .unwrap_or_default(),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn fulfillment_settings(&self) -> FulfillmentSettings {
        let order_day_offset = self
            .order_number_utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .unwrap_or_else(|| {
                tracing::warn!(
                    minutes = self.order_number_utc_offset_minutes,
                    "order number offset out of range, using UTC"
                );
                Utc.fix()
            });
        FulfillmentSettings {
            pricing: self.pricing,
            order_day_offset,
            max_attempts: self.fulfillment_max_attempts,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            pricing: PricingPolicy::default(),
            order_number_utc_offset_minutes: 0,
            gateway: GatewayConfig {
                currency: "TRY".to_string(),
                ..GatewayConfig::default()
            },
            fulfillment_poll_interval: Duration::from_millis(5_000),
            fulfillment_max_attempts: 5,
            admin_user_ids: HashSet::new(),
            approved_seller_ids: HashSet::new(),
        }
    }
}

fn parsed<T: FromStr>(get: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    get(key).and_then(|value| parse_or_warn(key, &value))
}

fn parse_or_warn<T: FromStr>(key: &str, value: &str) -> Option<T> {
    let parsed = value.trim().parse().ok();
    if parsed.is_none() {
        tracing::warn!(key, value, "ignoring unparsable configuration value");
    }
    parsed
}

fn id_list(value: &str) -> HashSet<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .collect()
}
