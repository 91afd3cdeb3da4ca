mod from_row;
mod schema;
pub mod queries;

pub use schema::init_db;

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::config::PointsConfig;
use crate::payments::StripeClient;
use crate::retry::RetryPolicy;

pub type DbPool = Pool<SqliteConnectionManager>;

/// Application state: the store handle plus the pieces of configuration the
/// handlers need. Constructed once at startup and passed by reference
/// through the router; nothing here is a process-wide global.
#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub stripe: StripeClient,
    pub points: PointsConfig,
    pub retry: RetryPolicy,
    /// Where the gateway sends the buyer after a successful payment.
    pub success_url: String,
    pub cancel_url: String,
}

pub fn create_pool(database_path: &str) -> Result<DbPool, r2d2::Error> {
    // Per-connection busy timeout so writers contending on the same account
    // wait instead of failing immediately with SQLITE_BUSY.
    let manager = SqliteConnectionManager::file(database_path)
        .with_init(|conn| conn.busy_timeout(Duration::from_secs(5)));
    Pool::builder().max_size(10).build(manager)
}
