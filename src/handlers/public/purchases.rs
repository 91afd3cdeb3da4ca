use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Query};
use crate::models::Purchase;

#[derive(Debug, Deserialize)]
pub struct PurchasesQuery {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct PurchasesResponse {
    pub purchases: Vec<Purchase>,
}

/// Purchase ledger for a user, newest first. Read-only.
pub async fn list_purchases(
    State(state): State<AppState>,
    Query(query): Query<PurchasesQuery>,
) -> Result<Json<PurchasesResponse>> {
    let user_id = query.user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::Validation("user_id is required".into()));
    }

    let conn = state.db.get()?;
    let purchases = queries::list_purchases_for_user(&conn, user_id)?;

    Ok(Json(PurchasesResponse { purchases }))
}
