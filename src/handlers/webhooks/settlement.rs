//! Provider-agnostic settlement crediting.
//!
//! This is the only code path that mutates balances. The credit itself is a
//! single atomic store operation (`queries::credit_purchase`); this module
//! wraps it in the retry policy and guarantees that a settlement which
//! cannot be credited leaves a failed-payment record behind instead of
//! vanishing.

use crate::db::{queries, AppState};
use crate::error::{AppError, Result};
use crate::models::{CreditOutcome, CreditPurchase, RecordFailedPayment};
use crate::retry::RetryFailure;

/// Credit a verified settlement to its account, retrying transient store
/// failures per the configured policy.
///
/// On terminal failure (retries exhausted, or a non-transient error) the
/// event is recorded in `failed_payments` and the error is surfaced so the
/// caller can report failure to the gateway; the gateway's redelivery is
/// safe because the credit is idempotent on the transaction id.
pub async fn credit_with_retry(
    state: &AppState,
    purchase: &CreditPurchase,
) -> Result<CreditOutcome> {
    let result = state
        .retry
        .run_blocking(|| {
            let mut conn = state.db.get()?;
            queries::credit_purchase(&mut conn, purchase, state.points.default_balance)
        })
        .await;

    match result {
        Ok(outcome) => Ok(outcome),
        Err(failure) => {
            tracing::error!(
                "Credit failed after {} attempt(s): transaction={}, user={}, points={}: {}",
                failure.attempts,
                purchase.transaction_id,
                purchase.user_id,
                purchase.points,
                failure.error
            );
            record_terminal_failure(state, purchase, &failure);
            Err(failure.error)
        }
    }
}

/// Best-effort write of the failed-payment audit record. A failure here is
/// logged rather than propagated: the gateway will redeliver either way,
/// and the original error is the one worth reporting.
fn record_terminal_failure(state: &AppState, purchase: &CreditPurchase, failure: &RetryFailure) {
    let input = RecordFailedPayment {
        transaction_id: purchase.transaction_id.clone(),
        user_id: Some(purchase.user_id.clone()),
        points: Some(purchase.points),
        amount_cents: purchase.amount_cents,
        error: failure.error.to_string(),
        attempts: failure.attempts,
    };

    match state.db.get() {
        Ok(mut conn) => {
            if let Err(e) = queries::record_failed_payment(&mut conn, &input) {
                tracing::error!(
                    "Failed to record failed payment {}: {}",
                    input.transaction_id,
                    e
                );
            }
        }
        Err(e) => {
            tracing::error!(
                "DB connection error while recording failed payment {}: {}",
                input.transaction_id,
                e
            );
        }
    }
}

/// Record a settlement whose metadata is unusable. The gateway authored the
/// metadata, so redelivery cannot change it; the event is audited once and
/// acknowledged.
pub fn record_metadata_failure(
    state: &AppState,
    transaction_id: &str,
    user_id: Option<String>,
    points: Option<i64>,
    amount_cents: i64,
    reason: &str,
) {
    let input = RecordFailedPayment {
        transaction_id: transaction_id.to_string(),
        user_id,
        points,
        amount_cents,
        error: AppError::Metadata(reason.to_string()).to_string(),
        attempts: 0,
    };

    match state.db.get() {
        Ok(mut conn) => {
            if let Err(e) = queries::record_failed_payment(&mut conn, &input) {
                tracing::error!(
                    "Failed to record invalid settlement event {}: {}",
                    input.transaction_id,
                    e
                );
            }
        }
        Err(e) => {
            tracing::error!(
                "DB connection error while recording invalid event {}: {}",
                input.transaction_id,
                e
            );
        }
    }
}
