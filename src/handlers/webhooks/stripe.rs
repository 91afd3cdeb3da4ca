use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::db::AppState;
use crate::extractors::Json;
use crate::models::{CreditOutcome, CreditPurchase};
use crate::payments::{StripeCheckoutSession, StripeWebhookEvent};

use super::settlement;

/// Internal result: status plus a short reason for the response body/logs.
type WebhookResult = (StatusCode, &'static str);

/// Axum handler for Stripe settlement webhooks.
///
/// Takes the raw body bytes: signature verification must see the payload
/// exactly as the gateway sent it.
pub async fn handle_stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let (status, detail) = process_notification(&state, &headers, &body).await;
    if status.is_success() {
        (status, Json(json!({ "received": true }))).into_response()
    } else {
        (status, Json(json!({ "error": detail }))).into_response()
    }
}

async fn process_notification(
    state: &AppState,
    headers: &HeaderMap,
    body: &Bytes,
) -> WebhookResult {
    let signature = match headers.get("stripe-signature").and_then(|v| v.to_str().ok()) {
        Some(s) => s,
        None => return (StatusCode::BAD_REQUEST, "Missing stripe-signature header"),
    };

    // Verification comes first, over the unparsed bytes. Nothing from an
    // unverified payload is looked at, including its metadata.
    match state.stripe.verify_webhook_signature(body, signature) {
        Ok(true) => {}
        Ok(false) => return (StatusCode::BAD_REQUEST, "Invalid signature"),
        Err(e) => {
            tracing::debug!("Webhook signature rejected: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid signature");
        }
    }

    let event: StripeWebhookEvent = match serde_json::from_slice(body) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!("Failed to parse verified webhook payload: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid JSON");
        }
    };

    // Only settled checkouts mutate balances. Everything else the gateway
    // sends is acknowledged so it stops redelivering.
    if event.event_type != "checkout.session.completed" {
        return (StatusCode::OK, "Event ignored");
    }

    let session: StripeCheckoutSession = match serde_json::from_value(event.data.object) {
        Ok(s) => s,
        Err(e) => {
            tracing::warn!("Failed to parse checkout session object: {}", e);
            return (StatusCode::BAD_REQUEST, "Invalid checkout session");
        }
    };

    if session.payment_status != "paid" {
        return (StatusCode::OK, "Event ignored");
    }

    let purchase = match extract_settlement(&session) {
        Ok(p) => p,
        Err(reason) => {
            tracing::warn!(
                "Settlement event with unusable metadata: session={}, reason={}",
                session.id,
                reason
            );
            settlement::record_metadata_failure(
                state,
                &transaction_id(&session),
                session.metadata.user_id.clone(),
                session.metadata.points.as_deref().and_then(|p| p.parse().ok()),
                session.amount_total.unwrap_or_default(),
                reason,
            );
            // Acked: redelivery would carry the same gateway-authored
            // metadata, so retrying cannot succeed.
            return (StatusCode::OK, "Invalid event metadata");
        }
    };

    match settlement::credit_with_retry(state, &purchase).await {
        Ok(CreditOutcome::Applied { new_balance }) => {
            tracing::info!(
                "Checkout settled: transaction={}, user={}, points={}, balance={}",
                purchase.transaction_id,
                purchase.user_id,
                purchase.points,
                new_balance
            );
            (StatusCode::OK, "OK")
        }
        Ok(CreditOutcome::AlreadyApplied) => (StatusCode::OK, "Already processed"),
        // Failure is reported so the gateway redelivers; the recorded
        // failed payment plus the idempotent credit make that safe.
        Err(_) => (StatusCode::INTERNAL_SERVER_ERROR, "Credit failed"),
    }
}

/// The idempotency key for a session: the payment intent when present
/// (durable id of the settled payment), otherwise the session id.
fn transaction_id(session: &StripeCheckoutSession) -> String {
    session
        .payment_intent
        .clone()
        .unwrap_or_else(|| session.id.clone())
}

fn extract_settlement(
    session: &StripeCheckoutSession,
) -> std::result::Result<CreditPurchase, &'static str> {
    let user_id = session
        .metadata
        .user_id
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or("missing user_id in metadata")?;

    let points = session
        .metadata
        .points
        .as_deref()
        .ok_or("missing points in metadata")?
        .parse::<i64>()
        .map_err(|_| "points metadata is not an integer")?;

    if points <= 0 {
        return Err("points metadata must be positive");
    }

    Ok(CreditPurchase {
        transaction_id: transaction_id(session),
        user_id: user_id.to_string(),
        points,
        amount_cents: session.amount_total.unwrap_or_default(),
    })
}
