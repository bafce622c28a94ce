//! Payment gateway adapter — order creation, signature verification,
//! capture, and refunds.
//!
//! Two interchangeable implementations sit behind [`PaymentGateway`]: the
//! Razorpay-backed client and a deterministic stand-in selected in mock
//! mode. Callers cannot tell which is active. Amounts cross this boundary
//! in major currency units; conversion to paise happens here and nowhere
//! else.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::errors::{AppError, Result};

const RAZORPAY_API_BASE: &str = "https://api.razorpay.com/v1";

type HmacSha256 = Hmac<Sha256>;

/// A provider-side order created per donation. `id` is the correlation key
/// webhooks are matched on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentOrder {
    pub id: String,
    /// Minor units (paise).
    pub amount: i64,
    pub currency: String,
    pub status: String,
    /// Key id the frontend needs to open the checkout; `mock_key` in mock mode.
    pub key_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaptureRecord {
    pub id: String,
    pub status: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefundRecord {
    pub id: String,
    pub status: String,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create a provider order sized to the donation amount, tagged with the
    /// donation id for later correlation.
    async fn create_order(
        &self,
        amount: f64,
        currency: &str,
        donation_id: &str,
        payer_email: &str,
    ) -> Result<PaymentOrder>;

    /// Check the payment proof returned by the checkout flow.
    async fn verify_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool>;

    /// Capture an authorized payment.
    async fn capture(&self, payment_id: &str, amount: f64, currency: &str)
        -> Result<CaptureRecord>;

    /// Refund a captured payment; `None` refunds the full amount.
    async fn refund(&self, payment_id: &str, amount: Option<f64>) -> Result<RefundRecord>;
}

/// Build the configured gateway. Mock mode also kicks in when no key pair is
/// configured, so a bare environment never hits the live API by accident.
pub fn from_config(config: &Config) -> Result<Arc<dyn PaymentGateway>> {
    if config.use_mock_payment
        || config.razorpay_key_id.is_empty()
        || config.razorpay_key_secret.is_empty()
    {
        info!("Payment gateway running in MOCK mode");
        return Ok(Arc::new(MockGateway));
    }

    let client = Client::builder()
        .timeout(Duration::from_secs(config.gateway_timeout_secs))
        .build()?;
    Ok(Arc::new(RazorpayGateway {
        client,
        key_id: config.razorpay_key_id.clone(),
        key_secret: config.razorpay_key_secret.clone(),
    }))
}

fn to_minor_units(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

// ─────────────────────────────────────────────────────────
// Razorpay
// ─────────────────────────────────────────────────────────

pub struct RazorpayGateway {
    client: Client,
    key_id: String,
    key_secret: String,
}

/// Shape of Razorpay order/refund/capture responses we care about.
#[derive(Debug, Deserialize)]
struct ProviderEntity {
    id: String,
    status: String,
}

impl RazorpayGateway {
    async fn post_json(&self, url: &str, body: serde_json::Value) -> Result<ProviderEntity> {
        // The client carries the bounded timeout; a timed-out call surfaces
        // as a gateway error and is not retried here.
        let resp = self
            .client
            .post(url)
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(AppError::PaymentGateway(format!(
                "provider returned {status}: {detail}"
            )));
        }
        Ok(resp.json::<ProviderEntity>().await?)
    }

    /// The signature the provider would attach to a legitimate checkout
    /// callback for this order/payment pair.
    #[cfg(test)]
    fn expected_signature(&self, order_id: &str, payment_id: &str) -> Result<String> {
        let mut mac = HmacSha256::new_from_slice(self.key_secret.as_bytes())
            .map_err(|e| AppError::PaymentGateway(format!("signature key error: {e}")))?;
        mac.update(format!("{order_id}|{payment_id}").as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    async fn create_order(
        &self,
        amount: f64,
        currency: &str,
        donation_id: &str,
        payer_email: &str,
    ) -> Result<PaymentOrder> {
        let body = json!({
            "amount": to_minor_units(amount),
            "currency": currency,
            "receipt": donation_id,
            "notes": {
                "donation_id": donation_id,
                "user_email": payer_email,
            },
        });
        let entity = self
            .post_json(&format!("{RAZORPAY_API_BASE}/orders"), body)
            .await?;
        Ok(PaymentOrder {
            id: entity.id,
            amount: to_minor_units(amount),
            currency: currency.to_string(),
            status: entity.status,
            key_id: self.key_id.clone(),
        })
    }

    async fn verify_signature(
        &self,
        order_id: &str,
        payment_id: &str,
        signature: &str,
    ) -> Result<bool> {
        let Ok(provided) = hex::decode(signature) else {
            return Ok(false);
        };
        let mut mac = HmacSha256::new_from_slice(self.key_secret.as_bytes())
            .map_err(|e| AppError::PaymentGateway(format!("signature key error: {e}")))?;
        mac.update(format!("{order_id}|{payment_id}").as_bytes());
        // verify_slice is the constant-time comparison.
        Ok(mac.verify_slice(&provided).is_ok())
    }

    async fn capture(
        &self,
        payment_id: &str,
        amount: f64,
        currency: &str,
    ) -> Result<CaptureRecord> {
        let body = json!({ "amount": to_minor_units(amount), "currency": currency });
        let entity = self
            .post_json(
                &format!("{RAZORPAY_API_BASE}/payments/{payment_id}/capture"),
                body,
            )
            .await?;
        Ok(CaptureRecord {
            id: entity.id,
            status: entity.status,
        })
    }

    async fn refund(&self, payment_id: &str, amount: Option<f64>) -> Result<RefundRecord> {
        let body = match amount {
            Some(amount) => json!({ "amount": to_minor_units(amount) }),
            None => json!({}),
        };
        let entity = self
            .post_json(
                &format!("{RAZORPAY_API_BASE}/payments/{payment_id}/refund"),
                body,
            )
            .await?;
        Ok(RefundRecord {
            id: entity.id,
            status: entity.status,
        })
    }
}

// ─────────────────────────────────────────────────────────
// Deterministic stand-in
// ─────────────────────────────────────────────────────────

/// Always-succeeding gateway used in mock mode. No I/O, no secrets.
pub struct MockGateway;

fn mock_ref(prefix: &str) -> String {
    let hex_id = Uuid::new_v4().simple().to_string();
    format!("{prefix}{}", &hex_id[..12])
}

#[async_trait]
impl PaymentGateway for MockGateway {
    async fn create_order(
        &self,
        amount: f64,
        currency: &str,
        _donation_id: &str,
        _payer_email: &str,
    ) -> Result<PaymentOrder> {
        Ok(PaymentOrder {
            id: mock_ref("order_mock_"),
            amount: to_minor_units(amount),
            currency: currency.to_string(),
            status: "created".to_string(),
            key_id: "mock_key".to_string(),
        })
    }

    async fn verify_signature(
        &self,
        _order_id: &str,
        _payment_id: &str,
        _signature: &str,
    ) -> Result<bool> {
        Ok(true)
    }

    async fn capture(
        &self,
        payment_id: &str,
        _amount: f64,
        _currency: &str,
    ) -> Result<CaptureRecord> {
        Ok(CaptureRecord {
            id: payment_id.to_string(),
            status: "captured".to_string(),
        })
    }

    async fn refund(&self, _payment_id: &str, _amount: Option<f64>) -> Result<RefundRecord> {
        Ok(RefundRecord {
            id: mock_ref("rfnd_mock_"),
            status: "processed".to_string(),
        })
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
