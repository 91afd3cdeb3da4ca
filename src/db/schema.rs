use rusqlite::Connection;

/// Initialize the database schema.
pub fn init_db(conn: &Connection) -> rusqlite::Result<()> {
    // WAL mode: the webhook path is write-heavy and short-lived transactions
    // append cheaply; synchronous=NORMAL is safe with WAL.
    conn.execute_batch(
        r#"
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA journal_size_limit = 67108864;

        -- Accounts (one row per user, created lazily on first credit)
        CREATE TABLE IF NOT EXISTS accounts (
            user_id TEXT PRIMARY KEY,
            balance INTEGER NOT NULL DEFAULT 0 CHECK (balance >= 0),
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );

        -- Purchase ledger, keyed by the gateway transaction id.
        -- The primary key is the idempotency guarantee: one completed
        -- purchase per transaction id, ever.
        CREATE TABLE IF NOT EXISTS purchases (
            transaction_id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            points INTEGER NOT NULL CHECK (points > 0),
            amount_cents INTEGER NOT NULL,
            status TEXT NOT NULL CHECK (status IN ('completed', 'failed')),
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_purchases_user ON purchases(user_id, created_at DESC);

        -- Settlement events that could not be credited (exhausted retries or
        -- unusable metadata). Append-only; kept for reconciliation.
        CREATE TABLE IF NOT EXISTS failed_payments (
            id TEXT PRIMARY KEY,
            transaction_id TEXT NOT NULL,
            user_id TEXT,
            points INTEGER,
            error TEXT NOT NULL,
            attempts INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_failed_payments_txn ON failed_payments(transaction_id);
        "#,
    )?;
    Ok(())
}
