use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::retry::RetryPolicy;

/// Points pricing and crediting rules.
///
/// Bounds and unit price apply to checkout requests; `default_balance` is
/// the starting balance applied when an account is first credited (and the
/// value reported for accounts that do not exist yet).
#[derive(Debug, Clone)]
pub struct PointsConfig {
    pub min_points: i64,
    pub max_points: i64,
    pub unit_price_cents: i64,
    pub default_balance: i64,
    pub currency: String,
}

impl PointsConfig {
    /// Reject point quantities outside the purchasable range.
    pub fn validate_points(&self, points: i64) -> Result<()> {
        if points < self.min_points || points > self.max_points {
            return Err(AppError::Validation(format!(
                "points must be between {} and {}",
                self.min_points, self.max_points
            )));
        }
        Ok(())
    }

    /// Price of a points package in minor currency units.
    pub fn price_cents(&self, points: i64) -> i64 {
        points * self.unit_price_cents
    }
}

/// Requests-per-minute limits for the public endpoint tiers.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub strict_rpm: u32,
    pub standard_rpm: u32,
    pub relaxed_rpm: u32,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: String,
    pub base_url: String,
    pub dev_mode: bool,
    pub stripe_secret_key: String,
    pub stripe_webhook_secret: String,
    pub points: PointsConfig,
    pub retry: RetryPolicy,
    pub rate_limit: RateLimitConfig,
    pub success_url: String,
    pub cancel_url: String,
}

/// Parse an env var, falling back to `default` when unset or unparseable.
fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let dev_mode = env::var("TOKENBOOTH_ENV")
            .map(|v| v == "dev" || v == "development")
            .unwrap_or(false);

        let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port: u16 = env_or("PORT", 3000);

        let base_url =
            env::var("BASE_URL").unwrap_or_else(|_| format!("http://{}:{}", host, port));

        let success_url = env::var("CHECKOUT_SUCCESS_URL")
            .unwrap_or_else(|_| format!("{}/success", base_url));
        let cancel_url = env::var("CHECKOUT_CANCEL_URL")
            .unwrap_or_else(|_| format!("{}/cancel", base_url));

        Self {
            host,
            port,
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "tokenbooth.db".to_string()),
            base_url,
            dev_mode,
            stripe_secret_key: env::var("STRIPE_SECRET_KEY").unwrap_or_default(),
            stripe_webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").unwrap_or_default(),
            points: PointsConfig {
                min_points: env_or("POINTS_MIN", 10),
                max_points: env_or("POINTS_MAX", 5000),
                unit_price_cents: env_or("POINT_PRICE_CENTS", 10),
                default_balance: env_or("STARTING_BALANCE", 5),
                currency: env::var("CURRENCY").unwrap_or_else(|_| "usd".to_string()),
            },
            retry: RetryPolicy {
                max_retries: env_or("CREDIT_MAX_RETRIES", 3),
                base_delay: Duration::from_millis(env_or("CREDIT_RETRY_BASE_MS", 1000)),
            },
            rate_limit: RateLimitConfig {
                strict_rpm: env_or("RATE_LIMIT_STRICT_RPM", 10),
                standard_rpm: env_or("RATE_LIMIT_STANDARD_RPM", 30),
                relaxed_rpm: env_or("RATE_LIMIT_RELAXED_RPM", 60),
            },
            success_url,
            cancel_url,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
