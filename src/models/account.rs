use serde::{Deserialize, Serialize};

/// A user's point balance.
///
/// Accounts are created lazily by the first verified settlement credit;
/// balance queries for unknown users answer with the configured default
/// without writing a row. The balance is only ever mutated through the
/// atomic credit path in `db::queries::credit_purchase`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Opaque user id issued by the external identity provider.
    pub user_id: String,
    pub balance: i64,
    pub created_at: i64,
    pub updated_at: i64,
}
