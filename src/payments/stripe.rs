use std::time::Duration;

use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Deserialize;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{msg, AppError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Bound on gateway API calls; a hung call is a transient failure, not a
/// stuck request slot.
const GATEWAY_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct CreateCheckoutSessionResponse {
    id: String,
    url: String,
}

#[derive(Debug, Clone)]
pub struct StripeClient {
    client: Client,
    secret_key: String,
    webhook_secret: String,
}

impl StripeClient {
    pub fn new(secret_key: &str, webhook_secret: &str) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(GATEWAY_TIMEOUT_SECS))
            .build()
            .expect("Failed to build HTTP client");
        Self {
            client,
            secret_key: secret_key.to_string(),
            webhook_secret: webhook_secret.to_string(),
        }
    }

    /// Create a Stripe checkout session for a points package.
    ///
    /// Pricing is ad-hoc (`price_data`) since the amount is computed from
    /// the requested quantity. The user id and quantity ride along as
    /// session metadata and come back on the settlement webhook; nothing
    /// is persisted locally for the pending checkout.
    pub async fn create_checkout_session(
        &self,
        user_id: &str,
        points: i64,
        amount_cents: i64,
        currency: &str,
        success_url: &str,
        cancel_url: &str,
    ) -> Result<(String, String)> {
        let points_str = points.to_string();
        let amount_str = amount_cents.to_string();
        let product_name = format!("{} points", points);

        let response = self
            .client
            .post("https://api.stripe.com/v1/checkout/sessions")
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&[
                ("mode", "payment"),
                ("success_url", success_url),
                ("cancel_url", cancel_url),
                ("line_items[0][price_data][currency]", currency),
                ("line_items[0][price_data][product_data][name]", product_name.as_str()),
                ("line_items[0][price_data][unit_amount]", amount_str.as_str()),
                ("line_items[0][quantity]", "1"),
                ("metadata[user_id]", user_id),
                ("metadata[points]", points_str.as_str()),
            ])
            .send()
            .await
            .map_err(|e| AppError::Gateway(format!("Stripe API error: {}", e)))?;

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Gateway(format!(
                "Stripe API error: {}",
                error_text
            )));
        }

        let session: CreateCheckoutSessionResponse = response
            .json()
            .await
            .map_err(|e| AppError::Gateway(format!("Failed to parse Stripe response: {}", e)))?;

        Ok((session.id, session.url))
    }

    /// Maximum age of a webhook timestamp before it's rejected (in seconds).
    /// Stripe recommends 300 seconds (5 minutes).
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

    /// Verify a webhook signature over the exact raw payload bytes.
    ///
    /// The payload must be passed unparsed: re-serializing JSON before
    /// verifying would invalidate the signature.
    pub fn verify_webhook_signature(&self, payload: &[u8], signature: &str) -> Result<bool> {
        // Stripe signature format: t=timestamp,v1=signature
        let parts: Vec<&str> = signature.split(',').collect();

        let mut timestamp = None;
        let mut sig_v1 = None;

        for part in parts {
            if let Some(t) = part.strip_prefix("t=") {
                timestamp = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                sig_v1 = Some(s);
            }
        }

        let timestamp_str =
            timestamp.ok_or(AppError::Authentication(msg::INVALID_SIGNATURE_FORMAT))?;
        let sig_v1 = sig_v1.ok_or(AppError::Authentication(msg::INVALID_SIGNATURE_FORMAT))?;

        // Reject replayed webhooks: the timestamp is covered by the
        // signature, so an old timestamp means an old capture.
        let timestamp: i64 = timestamp_str
            .parse()
            .map_err(|_| AppError::Authentication(msg::INVALID_TIMESTAMP_IN_SIGNATURE))?;

        let now = chrono::Utc::now().timestamp();
        let age = now - timestamp;

        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS {
            tracing::warn!(
                "Stripe webhook rejected: timestamp too old (age={}s, max={}s)",
                age,
                Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS
            );
            return Ok(false);
        }

        // Clock skew tolerance for timestamps from the future: 60 seconds
        if age < -60 {
            tracing::warn!(
                "Stripe webhook rejected: timestamp in the future (age={}s)",
                age
            );
            return Ok(false);
        }

        // Signed payload is "{timestamp}.{raw body}"; feed the MAC the raw
        // bytes directly rather than round-tripping through a string.
        let mut mac = HmacSha256::new_from_slice(self.webhook_secret.as_bytes())
            .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
        mac.update(timestamp_str.as_bytes());
        mac.update(b".");
        mac.update(payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        // Constant-time comparison. The length check is not constant-time,
        // but the signature length is not secret (64 hex chars for SHA-256).
        let expected_bytes = expected.as_bytes();
        let provided_bytes = sig_v1.as_bytes();

        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }
}

/// Generic Stripe webhook event - object is parsed based on event_type
#[derive(Debug, Deserialize)]
pub struct StripeWebhookEvent {
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: StripeEventData,
}

#[derive(Debug, Deserialize)]
pub struct StripeEventData {
    pub object: serde_json::Value,
}

// ============ checkout.session.completed ============

#[derive(Debug, Deserialize)]
pub struct StripeCheckoutSession {
    pub id: String,
    pub payment_status: String,
    /// Payment intent (pi_xxx); the durable transaction id for a settled
    /// one-time payment. Used as the idempotency key.
    pub payment_intent: Option<String>,
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub metadata: StripeMetadata,
}

/// Metadata round-tripped from checkout creation. Stripe metadata values
/// are always strings; `points` is parsed back to an integer on receipt.
#[derive(Debug, Default, Deserialize)]
pub struct StripeMetadata {
    pub user_id: Option<String>,
    pub points: Option<String>,
}
