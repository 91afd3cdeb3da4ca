use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use uuid::Uuid;

use crate::error::Result;
use crate::models::*;

use super::from_row::{
    query_all, query_one, ACCOUNT_COLS, FAILED_PAYMENT_COLS, PURCHASE_COLS,
};

fn now() -> i64 {
    Utc::now().timestamp()
}

fn gen_id() -> String {
    Uuid::new_v4().to_string()
}

// ============ Accounts ============

pub fn get_account(conn: &Connection, user_id: &str) -> Result<Option<Account>> {
    query_one(
        conn,
        &format!("SELECT {} FROM accounts WHERE user_id = ?1", ACCOUNT_COLS),
        &[&user_id],
    )
}

/// Current balance for a user, `None` if no account exists yet.
/// Read-only: never creates the account as a side effect.
pub fn get_balance(conn: &Connection, user_id: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT balance FROM accounts WHERE user_id = ?1",
        params![user_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(Into::into)
}

// ============ Idempotent Credit ============

/// Atomically credit a settled checkout to the target account.
///
/// Runs as a single immediate transaction so that the idempotency check,
/// the balance update, and the ledger write are one indivisible unit:
/// - If a completed purchase already exists for this transaction id, the
///   delivery is a redelivery and nothing changes (`AlreadyApplied`).
/// - Otherwise the account is read (created with `default_balance` if
///   absent), `points` are added, and the completed purchase is written.
///
/// `BEGIN IMMEDIATE` takes the write lock up front, so two concurrent
/// deliveries of the same transaction id serialize: exactly one applies,
/// the other observes the completed record.
pub fn credit_purchase(
    conn: &mut Connection,
    input: &CreditPurchase,
    default_balance: i64,
) -> Result<CreditOutcome> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let existing: Option<PurchaseStatus> = tx
        .query_row(
            "SELECT status FROM purchases WHERE transaction_id = ?1",
            params![&input.transaction_id],
            |row| row.get::<_, String>(0),
        )
        .optional()?
        .and_then(|s| s.parse().ok());

    if existing == Some(PurchaseStatus::Completed) {
        return Ok(CreditOutcome::AlreadyApplied);
    }

    let now = now();
    let current: Option<i64> = tx
        .query_row(
            "SELECT balance FROM accounts WHERE user_id = ?1",
            params![&input.user_id],
            |row| row.get(0),
        )
        .optional()?;

    let new_balance = match current {
        Some(balance) => {
            let new_balance = balance + input.points;
            tx.execute(
                "UPDATE accounts SET balance = ?1, updated_at = ?2 WHERE user_id = ?3",
                params![new_balance, now, &input.user_id],
            )?;
            new_balance
        }
        None => {
            let new_balance = default_balance + input.points;
            tx.execute(
                "INSERT INTO accounts (user_id, balance, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?3)",
                params![&input.user_id, new_balance, now],
            )?;
            new_balance
        }
    };

    // A previous terminal failure may have left a 'failed' row for this
    // transaction id; the gateway's redelivery succeeding now upgrades it.
    tx.execute(
        "INSERT INTO purchases (transaction_id, user_id, points, amount_cents, status, created_at)
         VALUES (?1, ?2, ?3, ?4, 'completed', ?5)
         ON CONFLICT(transaction_id) DO UPDATE SET
             user_id = excluded.user_id,
             points = excluded.points,
             amount_cents = excluded.amount_cents,
             status = 'completed',
             created_at = excluded.created_at",
        params![
            &input.transaction_id,
            &input.user_id,
            input.points,
            input.amount_cents,
            now
        ],
    )?;

    tx.commit()?;
    Ok(CreditOutcome::Applied { new_balance })
}

// ============ Purchase Ledger ============

pub fn get_purchase(conn: &Connection, transaction_id: &str) -> Result<Option<Purchase>> {
    query_one(
        conn,
        &format!(
            "SELECT {} FROM purchases WHERE transaction_id = ?1",
            PURCHASE_COLS
        ),
        &[&transaction_id],
    )
}

/// All purchases for a user, newest first.
pub fn list_purchases_for_user(conn: &Connection, user_id: &str) -> Result<Vec<Purchase>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM purchases WHERE user_id = ?1 ORDER BY created_at DESC, transaction_id",
            PURCHASE_COLS
        ),
        &[&user_id],
    )
}

// ============ Failed Payments ============

/// Record a settlement event that could not be credited.
///
/// Always appends a `failed_payments` audit row. When the event carried
/// well-formed metadata (a user and a positive points count), a `failed`
/// ledger row is also written unless a purchase for that transaction id
/// already exists; metadata-broken events can only be audited, since the
/// ledger's constraints require real values.
pub fn record_failed_payment(
    conn: &mut Connection,
    input: &RecordFailedPayment,
) -> Result<FailedPayment> {
    let id = gen_id();
    let now = now();

    let tx = conn.transaction()?;

    tx.execute(
        "INSERT INTO failed_payments (id, transaction_id, user_id, points, error, attempts, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            &id,
            &input.transaction_id,
            &input.user_id,
            input.points,
            &input.error,
            input.attempts as i64,
            now
        ],
    )?;

    if let (Some(user_id), Some(points)) = (&input.user_id, input.points) {
        if points > 0 {
            tx.execute(
                "INSERT INTO purchases (transaction_id, user_id, points, amount_cents, status, created_at)
                 VALUES (?1, ?2, ?3, ?4, 'failed', ?5)
                 ON CONFLICT(transaction_id) DO NOTHING",
                params![&input.transaction_id, user_id, points, input.amount_cents, now],
            )?;
        }
    }

    tx.commit()?;

    Ok(FailedPayment {
        id,
        transaction_id: input.transaction_id.clone(),
        user_id: input.user_id.clone(),
        points: input.points,
        error: input.error.clone(),
        attempts: input.attempts as i64,
        created_at: now,
    })
}

/// All recorded failures, newest first. Reconciliation surface.
pub fn list_failed_payments(conn: &Connection) -> Result<Vec<FailedPayment>> {
    query_all(
        conn,
        &format!(
            "SELECT {} FROM failed_payments ORDER BY created_at DESC, id",
            FAILED_PAYMENT_COLS
        ),
        &[],
    )
}
