mod balance;
mod checkout;
mod purchases;

pub use balance::*;
pub use checkout::*;
pub use purchases::*;

use axum::{
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::config::RateLimitConfig;
use crate::db::AppState;
use crate::rate_limit;

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

pub fn router(limits: RateLimitConfig) -> Router<AppState> {
    Router::new()
        .route(
            "/health",
            get(health).layer(rate_limit::relaxed_layer(limits.relaxed_rpm)),
        )
        // /checkout calls out to the payment gateway, so it gets the strict tier
        .route(
            "/checkout",
            post(initiate_checkout).layer(rate_limit::strict_layer(limits.strict_rpm)),
        )
        .route(
            "/balance",
            get(get_balance).layer(rate_limit::standard_layer(limits.standard_rpm)),
        )
        .route(
            "/purchases",
            get(list_purchases).layer(rate_limit::standard_layer(limits.standard_rpm)),
        )
}
