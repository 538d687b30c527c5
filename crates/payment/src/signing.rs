//! HMAC-SHA256 signing for gateway requests and callbacks.
//!
//! Outbound requests sign `nonce ‖ order_id ‖ amount ‖ currency`, where
//! `amount` is the decimal major-unit string (e.g. `279.90`).
//!
//! Callbacks carry their own signature under a separate `callback` label,
//! covering the nonce, order id, status, gateway payment id, amount and
//! currency, each terminated by a newline. A signed request form therefore
//! never verifies as a callback.

use hmac::{Hmac, Mac};
use rand::RngCore;
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

const CALLBACK_LABEL: &[u8] = b"callback\n";

/// Signed fields of a gateway callback.
#[derive(Debug, Clone, Copy)]
pub struct CallbackFields<'a> {
    pub nonce: &'a str,
    pub order_id: &'a str,
    pub status: &'a str,
    /// Empty when the gateway sent no payment id.
    pub payment_id: &'a str,
    pub amount: &'a str,
    pub currency: &'a str,
}

fn keyed(secret: &str) -> HmacSha256 {
    match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => unreachable!("HMAC-SHA256 accepts any key length"),
    }
}

fn request_mac(secret: &str, nonce: &str, order_id: &str, amount: &str, currency: &str) -> HmacSha256 {
    let mut mac = keyed(secret);
    mac.update(nonce.as_bytes());
    mac.update(order_id.as_bytes());
    mac.update(amount.as_bytes());
    mac.update(currency.as_bytes());
    mac
}

fn callback_mac(secret: &str, fields: &CallbackFields<'_>) -> HmacSha256 {
    let mut mac = keyed(secret);
    mac.update(CALLBACK_LABEL);
    for value in [
        fields.nonce,
        fields.order_id,
        fields.status,
        fields.payment_id,
        fields.amount,
        fields.currency,
    ] {
        mac.update(value.as_bytes());
        mac.update(b"\n");
    }
    mac
}

/// Returns the hex-encoded signature of an outbound payment request.
pub fn sign(secret: &str, nonce: &str, order_id: &str, amount: &str, currency: &str) -> String {
    hex::encode(request_mac(secret, nonce, order_id, amount, currency).finalize().into_bytes())
}

/// Returns the hex-encoded signature the gateway puts on a callback.
pub fn sign_callback(secret: &str, fields: &CallbackFields<'_>) -> String {
    hex::encode(callback_mac(secret, fields).finalize().into_bytes())
}

/// Verifies a callback signature in constant time.
pub fn verify_callback(secret: &str, fields: &CallbackFields<'_>, signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature.trim()) else {
        return false;
    };
    callback_mac(secret, fields).verify_slice(&expected).is_ok()
}

/// 128-bit random nonce, hex encoded.
pub fn generate_nonce() -> String {
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
