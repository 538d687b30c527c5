//! Gateway credentials and callback URLs.

/// Payment gateway configuration.
///
/// Credentials are optional so the service can start without them; payment
/// creation then fails with
/// [`PaymentError::GatewayNotConfigured`](crate::PaymentError).
#[derive(Debug, Clone, Default)]
pub struct GatewayConfig {
    pub gateway_url: Option<String>,
    pub merchant_id: Option<String>,
    pub secret_key: Option<String>,
    pub currency: String,
    pub success_url: Option<String>,
    pub failure_url: Option<String>,
    pub callback_url: Option<String>,
}

/// The subset of [`GatewayConfig`] required to sign requests.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Credentials<'a> {
    pub gateway_url: &'a str,
    pub merchant_id: &'a str,
    pub secret_key: &'a str,
}

impl GatewayConfig {
    pub fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }

    pub(crate) fn credentials(&self) -> Option<Credentials<'_>> {
        Some(Credentials {
            gateway_url: non_empty(&self.gateway_url)?,
            merchant_id: non_empty(&self.merchant_id)?,
            secret_key: non_empty(&self.secret_key)?,
        })
    }

    pub(crate) fn success_url(&self) -> &str {
        self.success_url.as_deref().unwrap_or("/checkout/success")
    }

    pub(crate) fn failure_url(&self) -> &str {
        self.failure_url.as_deref().unwrap_or("/checkout/failure")
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}
