//! Payment gateway adapter.
//!
//! The gateway is consumed through [`PaymentGateway`] so services never talk
//! HTTP directly. [`RazorpayGateway`] speaks the Razorpay orders API; the
//! signing helpers cover both the client checkout signature and webhooks.

use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

use crate::config::{GatewayConfig, Secret};

type HmacSha256 = Hmac<Sha256>;

/// Event type that carries a captured payment.
pub const PAYMENT_CAPTURED: &str = "payment.captured";

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("gateway returned status {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateRemoteOrder {
    /// Minor currency units.
    pub amount: i64,
    pub currency: String,
    pub receipt: String,
    pub notes: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RemoteOrder {
    pub id: String,
    pub amount: i64,
    pub currency: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Public key handed to the checkout widget.
    fn key_id(&self) -> &str;

    async fn create_order(&self, request: CreateRemoteOrder) -> Result<RemoteOrder, GatewayError>;
}

pub struct RazorpayGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: Secret,
}

impl RazorpayGateway {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder().timeout(Duration::from_secs(15)).build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            key_id: config.key_id.clone(),
            key_secret: config.key_secret.clone(),
        })
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn key_id(&self) -> &str { &self.key_id }

    async fn create_order(&self, request: CreateRemoteOrder) -> Result<RemoteOrder, GatewayError> {
        let response = self
            .client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(self.key_secret.expose()))
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(GatewayError::Status { status: status.as_u16(), body });
        }
        Ok(response.json().await?)
    }
}

// -----------------------------------------------------------------------------
// Signatures
// -----------------------------------------------------------------------------

/// Lowercase hex HMAC-SHA256 of `payload` under `secret`.
pub fn sign(secret: &[u8], payload: &[u8]) -> String {
    // HMAC accepts keys of any length, so this never takes the else branch.
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else { return String::new() };
    mac.update(payload);
    format!("{:x}", mac.finalize().into_bytes())
}

/// Constant-time comparison of `signature` against the expected HMAC.
pub fn verify_signature(secret: &[u8], payload: &[u8], signature: &str) -> bool {
    let expected = sign(secret, payload);
    !expected.is_empty() && bool::from(expected.as_bytes().ct_eq(signature.trim().as_bytes()))
}

/// Payload the checkout widget signs once the shopper pays.
pub fn client_payment_payload(remote_order_id: &str, remote_payment_id: &str) -> String {
    format!("{remote_order_id}|{remote_payment_id}")
}

// -----------------------------------------------------------------------------
// Webhook payload
// -----------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookEvent {
    pub event: String,
    #[serde(default)]
    pub payload: WebhookPayload,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WebhookPayload {
    pub payment: Option<PaymentEnvelope>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEnvelope {
    pub entity: PaymentEntity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaymentEntity {
    pub id: String,
    pub order_id: Option<String>,
    #[serde(default)]
    pub status: String,
    pub amount: Option<i64>,
    pub email: Option<String>,
    pub method: Option<String>,
}

impl WebhookEvent {
    pub fn payment(&self) -> Option<&PaymentEntity> { self.payload.payment.as_ref().map(|p| &p.entity) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_matches_reference_vector() {
        assert_eq!(
            sign(b"key", b"The quick brown fox jumps over the lazy dog"),
            "f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
        );
    }

    #[test]
    fn test_verify_signature() {
        let payload = client_payment_payload("order_9A33XWu170gUtm", "pay_29QQoUBi66xm2f");
        let signature = sign(b"secret", payload.as_bytes());
        assert!(verify_signature(b"secret", payload.as_bytes(), &signature));
        assert!(!verify_signature(b"other", payload.as_bytes(), &signature));
        assert!(!verify_signature(b"secret", b"order_9A33XWu170gUtm|pay_x", &signature));
        assert!(!verify_signature(b"secret", payload.as_bytes(), &signature[..10]));
        assert!(!verify_signature(b"secret", payload.as_bytes(), ""));
    }

    #[test]
    fn test_parse_captured_webhook() {
        let body = r#"{
            "event": "payment.captured",
            "payload": {"payment": {"entity": {
                "id": "pay_1", "order_id": "order_1", "status": "captured",
                "amount": 180000, "email": "asha@example.com", "method": "upi"
            }}}
        }"#;
        let event: WebhookEvent = serde_json::from_str(body).unwrap();
        assert_eq!(event.event, PAYMENT_CAPTURED);
        let payment = event.payment().unwrap();
        assert_eq!(payment.order_id.as_deref(), Some("order_1"));
        assert_eq!(payment.amount, Some(180000));

        let other: WebhookEvent = serde_json::from_str(r#"{"event": "order.paid"}"#).unwrap();
        assert!(other.payment().is_none());
    }
}
