//! The JSON error envelope:
//! `{"error":{"code":"<CODE>","message":"<human>","details":{...}}}`.
//!
//! Internal error text never crosses this boundary; storage and other
//! internal failures are logged and surfaced as a generic
//! `INTERNAL_ERROR`.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use wanimirror_client::ApiError;
use wanimirror_storage::StorageError;
use wanimirror_sync::SyncError;

#[derive(Debug)]
pub struct ApiFailure {
    status: StatusCode,
    code: &'static str,
    message: String,
    details: BTreeMap<String, String>,
}

impl ApiFailure {
    fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            details: BTreeMap::new(),
        }
    }

    /// 400 with per-field messages pinpointing each bad parameter.
    pub fn validation(details: BTreeMap<String, String>) -> Self {
        let mut failure = Self::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_ERROR",
            "request validation failed",
        );
        failure.details = details;
        failure
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn sync_in_progress() -> Self {
        Self::new(
            StatusCode::CONFLICT,
            "SYNC_IN_PROGRESS",
            "a sync is already in progress",
        )
    }

    pub fn internal() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_ERROR",
            "internal error",
        )
    }

    /// Map an orchestrator failure onto the envelope. Upstream causes
    /// keep their class (auth / network / rate limit); everything else
    /// collapses to the generic internal error.
    pub fn from_sync_error(error: &SyncError) -> Self {
        match error {
            SyncError::InProgress => Self::sync_in_progress(),
            SyncError::Upstream { data_type, source } => match source {
                ApiError::Authentication => Self::new(
                    StatusCode::UNAUTHORIZED,
                    "AUTH_ERROR",
                    format!("upstream rejected credentials during {data_type} sync"),
                ),
                ApiError::Network(_) => Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "NETWORK_ERROR",
                    format!("upstream unreachable during {data_type} sync"),
                ),
                ApiError::RateLimited { .. } => Self::new(
                    StatusCode::TOO_MANY_REQUESTS,
                    "RATE_LIMIT_ERROR",
                    format!("upstream rate limit hit during {data_type} sync"),
                ),
                _ => {
                    tracing::error!(data_type = %data_type, error = %source, "sync failed");
                    Self::internal()
                }
            },
            SyncError::Storage { data_type, source } => {
                tracing::error!(data_type = %data_type, error = %source, "sync persistence failed");
                Self::internal()
            }
            SyncError::Snapshot { source } => {
                tracing::error!(error = %source, "snapshot derivation failed");
                Self::internal()
            }
        }
    }
}

impl From<StorageError> for ApiFailure {
    fn from(error: StorageError) -> Self {
        tracing::error!(error = %error, "storage failure in read path");
        Self::internal()
    }
}

impl IntoResponse for ApiFailure {
    fn into_response(self) -> Response {
        let mut error = serde_json::json!({
            "code": self.code,
            "message": self.message,
        });
        if !self.details.is_empty() {
            error["details"] = serde_json::json!(self.details);
        }
        (self.status, Json(serde_json::json!({ "error": error }))).into_response()
    }
}
