use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    /// Required input missing or unusable; rejected before touching the
    /// platform.
    #[error("{0}")]
    Validation(String),

    /// Nothing matched the caller.  An expected outcome for cancellation,
    /// surfaced with enough detail for the agent to say so.
    #[error("{0}")]
    NotFound(String),

    /// The platform answered a decisive call with a non-2xx status.
    #[error("platform rejected request ({status}): {message}")]
    UpstreamRejection { status: u16, message: String },

    /// Transport or decoding failure talking to the platform.
    #[error("platform request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) | AppError::NotFound(_) | AppError::UpstreamRejection { .. } => {
                StatusCode::BAD_REQUEST
            }
            AppError::Upstream(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Routes that report every platform problem as a plain 500 (the
    /// read-mostly ones, where a rejection is indistinguishable from any
    /// other sync failure) demote upstream errors to a stable message.
    pub fn sync_failure(self, message: &'static str) -> Self {
        match self {
            AppError::UpstreamRejection { .. } | AppError::Upstream(_) => {
                AppError::Internal(message.to_string())
            }
            other => other,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
