//! Test utilities and fixtures for Tokenbooth integration tests

#![allow(dead_code)]

use axum::routing::{get, post};
use axum::Router;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;
use std::time::Duration;

pub use tokenbooth::config::{PointsConfig, RateLimitConfig};
pub use tokenbooth::db::{init_db, queries, AppState, DbPool};
pub use tokenbooth::handlers::public::{get_balance, initiate_checkout, list_purchases};
pub use tokenbooth::handlers::webhooks::handle_stripe_webhook;
pub use tokenbooth::models::*;
pub use tokenbooth::payments::StripeClient;
pub use tokenbooth::retry::RetryPolicy;

/// Webhook signing secret shared by test clients and signature helpers.
pub const TEST_WEBHOOK_SECRET: &str = "whsec_test123secret456";

/// Starting balance used by the test fixtures.
pub const TEST_STARTING_BALANCE: i64 = 5;

/// Create an in-memory test database with schema initialized
pub fn setup_test_db() -> Connection {
    let conn = Connection::open_in_memory().expect("Failed to create in-memory database");
    init_db(&conn).expect("Failed to initialize schema");
    conn
}

pub fn test_points_config() -> PointsConfig {
    PointsConfig {
        min_points: 10,
        max_points: 5000,
        unit_price_cents: 10,
        default_balance: TEST_STARTING_BALANCE,
        currency: "usd".to_string(),
    }
}

/// Create an AppState for testing with an in-memory pooled database.
/// Retry delays are near-zero so failure paths don't slow the suite down.
pub fn create_test_app_state() -> AppState {
    let manager = SqliteConnectionManager::memory();
    let pool = Pool::builder().max_size(4).build(manager).unwrap();
    {
        let conn = pool.get().unwrap();
        init_db(&conn).unwrap();
    }

    AppState {
        db: pool,
        stripe: StripeClient::new("sk_test_xxx", TEST_WEBHOOK_SECRET),
        points: test_points_config(),
        retry: RetryPolicy {
            max_retries: 2,
            base_delay: Duration::from_millis(1),
        },
        success_url: "http://localhost:3000/success".to_string(),
        cancel_url: "http://localhost:3000/cancel".to_string(),
    }
}

/// Create a Router with all endpoints (without rate limiting for tests)
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/checkout", post(initiate_checkout))
        .route("/webhook", post(handle_stripe_webhook))
        .route("/balance", get(get_balance))
        .route("/purchases", get(list_purchases))
        .with_state(state)
}

/// Shorthand for a well-formed credit input.
pub fn credit_input(transaction_id: &str, user_id: &str, points: i64) -> CreditPurchase {
    CreditPurchase {
        transaction_id: transaction_id.to_string(),
        user_id: user_id.to_string(),
        points,
        amount_cents: points * 10,
    }
}

/// Get the current timestamp
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
