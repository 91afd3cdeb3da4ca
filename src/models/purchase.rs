use serde::{Deserialize, Serialize};

/// A ledger entry for one gateway transaction.
///
/// The transaction id doubles as the idempotency key: at most one
/// `completed` purchase can exist per transaction id, which is what makes
/// redelivered settlement notifications safe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    pub transaction_id: String,
    pub user_id: String,
    pub points: i64,
    /// Amount actually paid, in minor currency units.
    pub amount_cents: i64,
    pub status: PurchaseStatus,
    pub created_at: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Completed,
    Failed,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl std::str::FromStr for PurchaseStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for PurchaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Data required to credit a settled checkout to an account.
/// Built from verified webhook metadata only.
#[derive(Debug, Clone)]
pub struct CreditPurchase {
    pub transaction_id: String,
    pub user_id: String,
    pub points: i64,
    pub amount_cents: i64,
}

/// Result of an idempotent credit attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreditOutcome {
    /// The balance was credited and the purchase recorded.
    Applied { new_balance: i64 },
    /// A completed purchase already existed for this transaction id
    /// (webhook redelivery); nothing was changed.
    AlreadyApplied,
}

/// A settlement event that could not be credited, kept for reconciliation.
#[derive(Debug, Clone, Serialize)]
pub struct FailedPayment {
    pub id: String,
    pub transaction_id: String,
    pub user_id: Option<String>,
    pub points: Option<i64>,
    pub error: String,
    pub attempts: i64,
    pub created_at: i64,
}

/// Data required to record a failed settlement.
///
/// `user_id`/`points` are optional because broken metadata is one of the
/// ways an event ends up here.
#[derive(Debug, Clone)]
pub struct RecordFailedPayment {
    pub transaction_id: String,
    pub user_id: Option<String>,
    pub points: Option<i64>,
    pub amount_cents: i64,
    pub error: String,
    pub attempts: u32,
}
