//! Error-to-HTTP response conversion.
//!
//! Implements `IntoResponse` for [`smv_core::Error`] so that route handlers
//! can return `Result<T, AppError>` directly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Wrapper so we can implement `IntoResponse` for an external type.
#[derive(Debug)]
pub struct AppError {
    inner: smv_core::Error,
}

impl AppError {
    pub fn new(inner: smv_core::Error) -> Self {
        Self { inner }
    }

    pub fn code(&self) -> &'static str {
        match &self.inner {
            smv_core::Error::Fetch { .. } => "fetch_error",
            smv_core::Error::Probe(_) => "probe_error",
            smv_core::Error::Encode { .. } => "encode_error",
            smv_core::Error::Verification { .. } => "verification_error",
            smv_core::Error::Conflict(_) => "conflict",
            smv_core::Error::Validation(_) => "validation_error",
            smv_core::Error::NotFound { .. } => "not_found",
            smv_core::Error::Cancelled => "cancelled",
            smv_core::Error::Io { .. } => "io_error",
            smv_core::Error::Tool { .. } => "tool_error",
            smv_core::Error::Internal(_) => "internal_error",
        }
    }
}

impl From<smv_core::Error> for AppError {
    fn from(e: smv_core::Error) -> Self {
        Self::new(e)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.inner.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(status = %status, error = %self.inner, "server error in API handler");
        }

        let body = json!({
            "error": self.inner.to_string(),
            "code": self.code(),
        });

        (status, axum::Json(body)).into_response()
    }
}
