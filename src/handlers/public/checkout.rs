use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::error::{AppError, Result};
use crate::extractors::Json;

#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    /// Opaque user id from the identity provider.
    pub user_id: String,
    /// Points to purchase; must fall within the configured bounds.
    pub points: i64,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    /// Gateway-hosted payment page the caller should redirect to.
    pub url: String,
}

/// Create a checkout session for a points package.
///
/// Validation happens before the gateway is contacted: a rejected request
/// makes no Stripe call and writes no local state. The user id and point
/// quantity travel as session metadata and come back on the settlement
/// webhook; the pending checkout itself lives only gateway-side.
pub async fn initiate_checkout(
    State(state): State<AppState>,
    Json(request): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::Validation("user_id is required".into()));
    }

    state.points.validate_points(request.points)?;

    let amount_cents = state.points.price_cents(request.points);

    let (session_id, url) = state
        .stripe
        .create_checkout_session(
            user_id,
            request.points,
            amount_cents,
            &state.points.currency,
            &state.success_url,
            &state.cancel_url,
        )
        .await?;

    tracing::info!(
        "Checkout session created: session={}, user={}, points={}, amount={}{}",
        session_id,
        user_id,
        request.points,
        amount_cents,
        state.points.currency
    );

    Ok(Json(CheckoutResponse { url }))
}
