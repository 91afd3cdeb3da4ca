use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

/// Shared error message constants.
pub mod msg {
    pub const INVALID_SIGNATURE_FORMAT: &str = "Invalid signature header format";
    pub const INVALID_TIMESTAMP_IN_SIGNATURE: &str = "Invalid timestamp in signature header";
    pub const INVALID_WEBHOOK_SECRET: &str = "Webhook secret rejected by HMAC";
}

#[derive(Error, Debug)]
pub enum AppError {
    /// Bad input shape or bounds on a caller-facing endpoint. Not retried.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Webhook signature mismatch. The request is rejected outright.
    #[error("Authentication failed: {0}")]
    Authentication(&'static str),

    /// A verified event is missing required metadata. The gateway authored
    /// the metadata, so redelivery cannot fix it; recorded, never retried.
    #[error("Invalid event metadata: {0}")]
    Metadata(String),

    /// The payment gateway call failed. No local state was written.
    #[error("Payment gateway error: {0}")]
    Gateway(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Whether the error is a transient store condition worth retrying.
    ///
    /// Covers SQLite write contention and pool exhaustion/timeouts. Anything
    /// else (constraint violations, corrupt data, logic errors) will not get
    /// better on a retry.
    pub fn is_transient(&self) -> bool {
        match self {
            AppError::Pool(_) => true,
            AppError::Database(rusqlite::Error::SqliteFailure(err, _)) => matches!(
                err.code,
                rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
            ),
            _ => false,
        }
    }
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

impl From<axum::extract::rejection::QueryRejection> for AppError {
    fn from(rejection: axum::extract::rejection::QueryRejection) -> Self {
        AppError::Validation(rejection.body_text())
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Validation(msg) => {
                (StatusCode::BAD_REQUEST, "Bad request", Some(msg.clone()))
            }
            AppError::Authentication(msg) => {
                (StatusCode::BAD_REQUEST, "Authentication failed", Some(msg.to_string()))
            }
            AppError::Metadata(msg) => {
                tracing::warn!("Unprocessable event metadata: {}", msg);
                (StatusCode::UNPROCESSABLE_ENTITY, "Invalid event metadata", Some(msg.clone()))
            }
            AppError::Gateway(msg) => {
                tracing::error!("Gateway error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Payment gateway error", None)
            }
            AppError::Database(e) => {
                tracing::error!("Database error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Pool(e) => {
                tracing::error!("Pool error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
            AppError::Json(e) => {
                tracing::error!("JSON error: {}", e);
                (StatusCode::BAD_REQUEST, "Invalid JSON", Some(e.to_string()))
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
