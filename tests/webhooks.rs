//! Webhook signature verification and settlement crediting tests

mod common;

use common::*;

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use tower::ServiceExt;

// ============ Signature Helpers ============

/// Get current Unix timestamp as a string (for webhook signature tests)
fn current_timestamp() -> String {
    chrono::Utc::now().timestamp().to_string()
}

/// Get an old timestamp (for testing timestamp rejection)
fn old_timestamp() -> String {
    // 10 minutes ago - beyond the 5-minute tolerance
    (chrono::Utc::now().timestamp() - 600).to_string()
}

fn compute_stripe_signature(payload: &[u8], secret: &str, timestamp: &str) -> String {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    type HmacSha256 = Hmac<Sha256>;

    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    hex::encode(mac.finalize().into_bytes())
}

/// Signature header for a payload, signed with the test webhook secret.
fn signature_header(payload: &[u8]) -> String {
    let timestamp = current_timestamp();
    let signature = compute_stripe_signature(payload, TEST_WEBHOOK_SECRET, &timestamp);
    format!("t={},v1={}", timestamp, signature)
}

fn test_client() -> StripeClient {
    StripeClient::new("sk_test_xxx", TEST_WEBHOOK_SECRET)
}

// ============ Event Payload Helpers ============

/// A checkout.session.completed payload with the given metadata fields.
fn settlement_event(payment_intent: &str, metadata: Value) -> Vec<u8> {
    json!({
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_abc123",
                "payment_status": "paid",
                "payment_intent": payment_intent,
                "amount_total": 1000,
                "metadata": metadata
            }
        }
    })
    .to_string()
    .into_bytes()
}

async fn post_webhook(
    app: &axum::Router,
    payload: &[u8],
    header: &str,
) -> (StatusCode, Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("stripe-signature", header)
                .header("content-type", "application/json")
                .body(Body::from(payload.to_vec()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&body).expect("Response should be valid JSON");
    (status, json)
}

// ============ Signature Verification Tests ============

#[test]
fn test_valid_signature() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    let timestamp = current_timestamp();
    let signature = compute_stripe_signature(payload, TEST_WEBHOOK_SECRET, &timestamp);
    let signature_header = format!("t={},v1={}", timestamp, signature);

    let result = client
        .verify_webhook_signature(payload, &signature_header)
        .expect("Verification should not error");

    assert!(result, "Valid signature should be accepted");
}

#[test]
fn test_invalid_signature() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    let timestamp = current_timestamp();
    // Use wrong secret to generate invalid signature
    let signature = compute_stripe_signature(payload, "wrong_secret", &timestamp);
    let signature_header = format!("t={},v1={}", timestamp, signature);

    let result = client
        .verify_webhook_signature(payload, &signature_header)
        .expect("Verification should not error");

    assert!(!result, "Invalid signature should be rejected");
}

#[test]
fn test_modified_payload() {
    let client = test_client();
    let original_payload = b"{\"type\":\"checkout.session.completed\"}";
    let modified_payload = b"{\"type\":\"checkout.session.completed\",\"hacked\":true}";
    let timestamp = current_timestamp();
    // Sign the original payload
    let signature = compute_stripe_signature(original_payload, TEST_WEBHOOK_SECRET, &timestamp);
    let signature_header = format!("t={},v1={}", timestamp, signature);

    // Verify with modified payload
    let result = client
        .verify_webhook_signature(modified_payload, &signature_header)
        .expect("Verification should not error");

    assert!(!result, "Modified payload should be rejected");
}

#[test]
fn test_old_timestamp_fails_verification() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    let timestamp = old_timestamp();
    // Valid signature but timestamp too old
    let signature = compute_stripe_signature(payload, TEST_WEBHOOK_SECRET, &timestamp);
    let signature_header = format!("t={},v1={}", timestamp, signature);

    let result = client
        .verify_webhook_signature(payload, &signature_header)
        .expect("Verification should not error");

    assert!(
        !result,
        "Old timestamp should be rejected (replay attack prevention)"
    );
}

#[test]
fn test_future_timestamp_fails_verification() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    // 5 minutes in the future - beyond the 60s clock skew tolerance
    let timestamp = (chrono::Utc::now().timestamp() + 300).to_string();
    let signature = compute_stripe_signature(payload, TEST_WEBHOOK_SECRET, &timestamp);
    let signature_header = format!("t={},v1={}", timestamp, signature);

    let result = client
        .verify_webhook_signature(payload, &signature_header)
        .expect("Verification should not error");

    assert!(!result, "Future timestamp should be rejected");
}

#[test]
fn test_missing_timestamp() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    // Signature without timestamp
    let result = client.verify_webhook_signature(payload, "v1=somesignature");

    assert!(result.is_err(), "Missing timestamp should error");
}

#[test]
fn test_missing_signature_part() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";
    // Header without v1 signature
    let result = client.verify_webhook_signature(payload, "t=1234567890");

    assert!(result.is_err(), "Missing signature should error");
}

#[test]
fn test_malformed_header() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";

    let result = client.verify_webhook_signature(payload, "garbage");

    assert!(result.is_err(), "Malformed header should error");
}

#[test]
fn test_empty_signature_header() {
    let client = test_client();
    let payload = b"{\"type\":\"checkout.session.completed\"}";

    let result = client.verify_webhook_signature(payload, "");

    assert!(result.is_err(), "Empty header should error");
}

// ============ Settlement Crediting Tests ============

#[tokio::test]
async fn test_settlement_credits_balance() {
    let state = create_test_app_state();
    let app = app(state.clone());

    let payload = settlement_event("pi_tx_1", json!({ "user_id": "u1", "points": "100" }));
    let (status, body) = post_webhook(&app, &payload, &signature_header(&payload)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);

    let conn = state.db.get().unwrap();
    assert_eq!(
        queries::get_balance(&conn, "u1").unwrap(),
        Some(TEST_STARTING_BALANCE + 100),
        "first credit should land on the starting balance"
    );

    let purchase = queries::get_purchase(&conn, "pi_tx_1")
        .unwrap()
        .expect("purchase record should exist");
    assert_eq!(purchase.user_id, "u1");
    assert_eq!(purchase.points, 100);
    assert_eq!(purchase.amount_cents, 1000);
    assert_eq!(purchase.status, PurchaseStatus::Completed);
}

#[tokio::test]
async fn test_settlement_redelivery_is_idempotent() {
    let state = create_test_app_state();
    let app = app(state.clone());

    let payload = settlement_event("pi_tx_1", json!({ "user_id": "u1", "points": "100" }));
    let header = signature_header(&payload);

    // Simulated redelivery: the gateway sends the same event twice
    let (first_status, first_body) = post_webhook(&app, &payload, &header).await;
    let (second_status, second_body) = post_webhook(&app, &payload, &header).await;

    assert_eq!(first_status, StatusCode::OK);
    assert_eq!(first_body["received"], true);
    // Redelivery is still acknowledged as received
    assert_eq!(second_status, StatusCode::OK);
    assert_eq!(second_body["received"], true);

    let conn = state.db.get().unwrap();
    assert_eq!(
        queries::get_balance(&conn, "u1").unwrap(),
        Some(TEST_STARTING_BALANCE + 100),
        "redelivery must not double-credit"
    );
    assert_eq!(
        queries::list_purchases_for_user(&conn, "u1").unwrap().len(),
        1,
        "exactly one purchase record for the transaction id"
    );
}

#[tokio::test]
async fn test_distinct_transactions_accumulate() {
    let state = create_test_app_state();
    let app = app(state.clone());

    let first = settlement_event("pi_tx_1", json!({ "user_id": "u1", "points": "100" }));
    let second = settlement_event("pi_tx_2", json!({ "user_id": "u1", "points": "50" }));

    let (status, _) = post_webhook(&app, &first, &signature_header(&first)).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = post_webhook(&app, &second, &signature_header(&second)).await;
    assert_eq!(status, StatusCode::OK);

    let conn = state.db.get().unwrap();
    assert_eq!(
        queries::get_balance(&conn, "u1").unwrap(),
        Some(TEST_STARTING_BALANCE + 150)
    );
    assert_eq!(queries::list_purchases_for_user(&conn, "u1").unwrap().len(), 2);
}

#[tokio::test]
async fn test_tampered_payload_never_credits() {
    let state = create_test_app_state();
    let app = app(state.clone());

    let original = settlement_event("pi_tx_1", json!({ "user_id": "u1", "points": "100" }));
    // Sign the original, then deliver a payload claiming more points
    let header = signature_header(&original);
    let tampered = settlement_event("pi_tx_1", json!({ "user_id": "u1", "points": "9999" }));

    let (status, body) = post_webhook(&app, &tampered, &header).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].is_string());

    let conn = state.db.get().unwrap();
    assert_eq!(
        queries::get_balance(&conn, "u1").unwrap(),
        None,
        "no balance change from a tampered payload, however plausible"
    );
    assert!(queries::get_purchase(&conn, "pi_tx_1").unwrap().is_none());
}

#[tokio::test]
async fn test_wrong_secret_rejected() {
    let state = create_test_app_state();
    let app = app(state.clone());

    let payload = settlement_event("pi_tx_1", json!({ "user_id": "u1", "points": "100" }));
    let timestamp = current_timestamp();
    let signature = compute_stripe_signature(&payload, "whsec_wrong", &timestamp);
    let header = format!("t={},v1={}", timestamp, signature);

    let (status, _) = post_webhook(&app, &payload, &header).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);

    let conn = state.db.get().unwrap();
    assert_eq!(queries::get_balance(&conn, "u1").unwrap(), None);
}

#[tokio::test]
async fn test_missing_signature_header_rejected() {
    let state = create_test_app_state();
    let app = app(state);

    let payload = settlement_event("pi_tx_1", json!({ "user_id": "u1", "points": "100" }));

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook")
                .header("content-type", "application/json")
                .body(Body::from(payload))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unrelated_event_acknowledged_and_ignored() {
    let state = create_test_app_state();
    let app = app(state.clone());

    let payload = json!({
        "type": "invoice.paid",
        "data": { "object": { "id": "in_123" } }
    })
    .to_string()
    .into_bytes();

    let (status, body) = post_webhook(&app, &payload, &signature_header(&payload)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);

    let conn = state.db.get().unwrap();
    assert!(queries::list_failed_payments(&conn).unwrap().is_empty());
}

#[tokio::test]
async fn test_unpaid_session_ignored() {
    let state = create_test_app_state();
    let app = app(state.clone());

    let payload = json!({
        "type": "checkout.session.completed",
        "data": {
            "object": {
                "id": "cs_test_abc123",
                "payment_status": "unpaid",
                "payment_intent": "pi_tx_1",
                "amount_total": 1000,
                "metadata": { "user_id": "u1", "points": "100" }
            }
        }
    })
    .to_string()
    .into_bytes();

    let (status, body) = post_webhook(&app, &payload, &signature_header(&payload)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);

    let conn = state.db.get().unwrap();
    assert_eq!(queries::get_balance(&conn, "u1").unwrap(), None);
}

// ============ Metadata Failure Tests ============

#[tokio::test]
async fn test_missing_points_metadata_records_failure() {
    let state = create_test_app_state();
    let app = app(state.clone());

    let payload = settlement_event("pi_tx_2", json!({ "user_id": "u1" }));
    let (status, body) = post_webhook(&app, &payload, &signature_header(&payload)).await;

    // Acknowledged so the gateway doesn't redeliver an unfixable event
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["received"], true);

    let conn = state.db.get().unwrap();
    assert_eq!(
        queries::get_balance(&conn, "u1").unwrap(),
        None,
        "balance unchanged when metadata is unusable"
    );
    assert!(queries::get_purchase(&conn, "pi_tx_2").unwrap().is_none());

    let failures = queries::list_failed_payments(&conn).unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].transaction_id, "pi_tx_2");
    assert_eq!(failures[0].user_id.as_deref(), Some("u1"));
    assert!(failures[0].points.is_none());
    assert_eq!(failures[0].attempts, 0);
}

#[tokio::test]
async fn test_missing_user_metadata_records_failure() {
    let state = create_test_app_state();
    let app = app(state.clone());

    let payload = settlement_event("pi_tx_3", json!({ "points": "100" }));
    let (status, _) = post_webhook(&app, &payload, &signature_header(&payload)).await;

    assert_eq!(status, StatusCode::OK);

    let conn = state.db.get().unwrap();
    let failures = queries::list_failed_payments(&conn).unwrap();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].transaction_id, "pi_tx_3");
    assert!(failures[0].user_id.is_none());
}

#[tokio::test]
async fn test_non_numeric_points_metadata_records_failure() {
    let state = create_test_app_state();
    let app = app(state.clone());

    let payload = settlement_event("pi_tx_4", json!({ "user_id": "u1", "points": "lots" }));
    let (status, _) = post_webhook(&app, &payload, &signature_header(&payload)).await;

    assert_eq!(status, StatusCode::OK);

    let conn = state.db.get().unwrap();
    assert_eq!(queries::get_balance(&conn, "u1").unwrap(), None);
    assert_eq!(queries::list_failed_payments(&conn).unwrap().len(), 1);
}

#[tokio::test]
async fn test_negative_points_metadata_records_failure() {
    let state = create_test_app_state();
    let app = app(state.clone());

    let payload = settlement_event("pi_tx_5", json!({ "user_id": "u1", "points": "-50" }));
    let (status, _) = post_webhook(&app, &payload, &signature_header(&payload)).await;

    assert_eq!(status, StatusCode::OK);

    let conn = state.db.get().unwrap();
    assert_eq!(
        queries::get_balance(&conn, "u1").unwrap(),
        None,
        "negative quantities must never decrease or create a balance"
    );
    assert_eq!(queries::list_failed_payments(&conn).unwrap().len(), 1);
}

#[tokio::test]
async fn test_metadata_failure_not_redelivered_forever() {
    // Redelivering a metadata-broken event records each occurrence but
    // still acks, so the gateway's retry loop terminates.
    let state = create_test_app_state();
    let app = app(state.clone());

    let payload = settlement_event("pi_tx_6", json!({ "user_id": "u1" }));
    let header = signature_header(&payload);

    let (first, _) = post_webhook(&app, &payload, &header).await;
    let (second, _) = post_webhook(&app, &payload, &header).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);

    let conn = state.db.get().unwrap();
    assert_eq!(queries::get_balance(&conn, "u1").unwrap(), None);
}
