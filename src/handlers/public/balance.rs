use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::extractors::{Json, Query};

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub user_id: String,
}

#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    pub balance: i64,
}

/// Current balance for a user.
///
/// Users with no account yet get the configured starting balance; the
/// lookup never creates a row.
pub async fn get_balance(
    State(state): State<AppState>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<BalanceResponse>> {
    let user_id = query.user_id.trim();
    if user_id.is_empty() {
        return Err(AppError::Validation("user_id is required".into()));
    }

    let conn = state.db.get()?;
    let balance =
        queries::get_balance(&conn, user_id)?.unwrap_or(state.points.default_balance);

    Ok(Json(BalanceResponse { balance }))
}
