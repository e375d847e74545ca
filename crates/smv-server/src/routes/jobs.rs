//! Job submission, status and cancellation.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;
use smv_core::{JobId, JobRequest, JobStatus};

use crate::context::AppContext;
use crate::error::AppError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JobAccepted {
    pub job_id: JobId,
    pub message: String,
}

/// POST /api/process
pub async fn process(
    State(ctx): State<AppContext>,
    payload: Result<Json<JobRequest>, JsonRejection>,
) -> Result<impl IntoResponse, AppError> {
    let Json(request) =
        payload.map_err(|e| smv_core::Error::Validation(format!("invalid job request: {}", e.body_text())))?;

    let job_id = ctx.executor.submit(request)?;
    tracing::info!(job_id = %job_id, "job accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            job_id,
            message: "Processing started".into(),
        }),
    ))
}

/// GET /api/status
pub async fn status(State(ctx): State<AppContext>) -> Json<JobStatus> {
    Json(ctx.executor.status())
}

/// POST /api/cancel
pub async fn cancel(State(ctx): State<AppContext>) -> Result<impl IntoResponse, AppError> {
    let job_id = ctx
        .executor
        .registry()
        .cancel()
        .ok_or_else(|| smv_core::Error::not_found("job", "running"))?;

    Ok((
        StatusCode::ACCEPTED,
        Json(JobAccepted {
            job_id,
            message: "Cancellation requested".into(),
        }),
    ))
}
