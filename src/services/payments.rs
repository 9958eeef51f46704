//! Payment gateway abstraction and signature checks.
//!
//! The gateway is injected as `Arc<dyn PaymentGateway>` so handlers and tests
//! can swap the HTTP client for a double. Signature verification is pure and
//! compares digests in constant time through [`Mac::verify_slice`].

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use utoipa::ToSchema;

use crate::errors::ServiceError;

type HmacSha256 = Hmac<Sha256>;

/// Request to open a payment intent at the gateway
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateGatewayOrder {
    /// Amount in major units; the client converts to minor units on the wire
    pub amount: Decimal,
    pub currency: String,
    pub receipt: String,
    /// Stable across retries of one logical call
    pub idempotency_key: String,
}

/// Payment intent as returned by the gateway
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct GatewayOrder {
    pub id: String,
    /// Minor units (paise)
    pub amount: i64,
    pub currency: String,
    #[serde(default)]
    pub receipt: Option<String>,
    pub status: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_order(&self, request: CreateGatewayOrder) -> Result<GatewayOrder, ServiceError>;

    /// Publishable key handed to the checkout widget. Never the secret.
    fn key_id(&self) -> &str;
}

/// Checks the checkout callback signature: hex HMAC-SHA256 of
/// `order_id|payment_id` keyed with the gateway key secret.
pub fn verify_payment_signature(
    key_secret: &str,
    gateway_order_id: &str,
    gateway_payment_id: &str,
    signature_hex: &str,
) -> bool {
    let payload = format!("{}|{}", gateway_order_id, gateway_payment_id);
    verify_hex_hmac(key_secret.as_bytes(), payload.as_bytes(), signature_hex)
}

/// Checks `X-Razorpay-Signature`: hex HMAC-SHA256 of the raw webhook body.
pub fn verify_webhook_signature(webhook_secret: &str, body: &[u8], signature_hex: &str) -> bool {
    verify_hex_hmac(webhook_secret.as_bytes(), body, signature_hex)
}

fn verify_hex_hmac(key: &[u8], payload: &[u8], signature_hex: &str) -> bool {
    let Ok(expected) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(key) else {
        return false;
    };
    mac.update(payload);
    mac.verify_slice(&expected).is_ok()
}

/// Produces the hex signature the gateway would send. Used by test doubles
/// and the webhook tests.
pub fn sign_hex(key: &str, payload: &[u8]) -> String {
    match HmacSha256::new_from_slice(key.as_bytes()) {
        Ok(mut mac) => {
            mac.update(payload);
            hex::encode(mac.finalize().into_bytes())
        }
        Err(_) => String::new(),
    }
}

/// Converts major units to the gateway's integer minor units (x100).
pub fn to_minor_units(amount: Decimal) -> Result<i64, ServiceError> {
    use rust_decimal::prelude::ToPrimitive;

    let minor = (amount * Decimal::ONE_HUNDRED).round_dp(0);
    minor
        .to_i64()
        .filter(|v| *v > 0)
        .ok_or_else(|| ServiceError::ValidationError(format!("Invalid payment amount {}", amount)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SECRET: &str = "key_secret_test";

    #[test]
    fn accepts_signature_over_order_and_payment_ids() {
        let sig = sign_hex(SECRET, b"order_abc|pay_xyz");
        assert!(verify_payment_signature(SECRET, "order_abc", "pay_xyz", &sig));
    }

    #[test]
    fn rejects_tampered_or_malformed_signatures() {
        let sig = sign_hex(SECRET, b"order_abc|pay_xyz");
        assert!(!verify_payment_signature(SECRET, "order_abc", "pay_other", &sig));
        assert!(!verify_payment_signature("wrong", "order_abc", "pay_xyz", &sig));
        assert!(!verify_payment_signature(SECRET, "order_abc", "pay_xyz", "not-hex"));
        assert!(!verify_payment_signature(SECRET, "order_abc", "pay_xyz", ""));
        assert!(!verify_payment_signature(SECRET, "order_abc", "pay_xyz", &sig[..10]));
    }

    #[test]
    fn webhook_signature_covers_raw_body() {
        let body = br#"{"event":"payment.captured"}"#;
        let sig = sign_hex("whsec", body);
        assert!(verify_webhook_signature("whsec", body, &sig));
        assert!(!verify_webhook_signature("whsec", br#"{"event":"payment.failed"}"#, &sig));
    }

    #[test]
    fn minor_units_are_paise() {
        assert_eq!(to_minor_units(dec!(1300)).unwrap(), 130_000);
        assert_eq!(to_minor_units(dec!(499.99)).unwrap(), 49_999);
        assert!(to_minor_units(Decimal::ZERO).is_err());
    }
}
