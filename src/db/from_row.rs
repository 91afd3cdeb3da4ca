//! Row mapping trait and helpers for reducing boilerplate in queries.

use rusqlite::{Connection, OptionalExtension, Row, ToSql};

use crate::models::*;

/// Parse a string column into an enum type, converting parse errors to
/// rusqlite errors instead of panicking on unexpected stored values.
fn parse_enum<T: std::str::FromStr>(row: &Row, col: usize, col_name: &str) -> rusqlite::Result<T> {
    row.get::<_, String>(col)?.parse::<T>().map_err(|_| {
        rusqlite::Error::InvalidColumnType(col, col_name.to_string(), rusqlite::types::Type::Text)
    })
}

/// Trait for constructing a type from a database row.
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> rusqlite::Result<Self>;
}

/// Query for a single optional result.
pub fn query_one<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Option<T>> {
    conn.query_row(sql, params, T::from_row)
        .optional()
        .map_err(Into::into)
}

/// Query for multiple results.
pub fn query_all<T: FromRow>(
    conn: &Connection,
    sql: &str,
    params: &[&dyn ToSql],
) -> crate::error::Result<Vec<T>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt
        .query_map(params, T::from_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

// ============ SQL SELECT Constants ============

pub const ACCOUNT_COLS: &str = "user_id, balance, created_at, updated_at";

pub const PURCHASE_COLS: &str =
    "transaction_id, user_id, points, amount_cents, status, created_at";

pub const FAILED_PAYMENT_COLS: &str =
    "id, transaction_id, user_id, points, error, attempts, created_at";

// ============ FromRow Implementations ============

impl FromRow for Account {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Account {
            user_id: row.get(0)?,
            balance: row.get(1)?,
            created_at: row.get(2)?,
            updated_at: row.get(3)?,
        })
    }
}

impl FromRow for Purchase {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(Purchase {
            transaction_id: row.get(0)?,
            user_id: row.get(1)?,
            points: row.get(2)?,
            amount_cents: row.get(3)?,
            status: parse_enum(row, 4, "status")?,
            created_at: row.get(5)?,
        })
    }
}

impl FromRow for FailedPayment {
    fn from_row(row: &Row) -> rusqlite::Result<Self> {
        Ok(FailedPayment {
            id: row.get(0)?,
            transaction_id: row.get(1)?,
            user_id: row.get(2)?,
            points: row.get(3)?,
            error: row.get(4)?,
            attempts: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}
